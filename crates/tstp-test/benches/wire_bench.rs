//! Benchmarks for TSTP wire encoding and geometry

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tstp_core::{Region, Scale, Space, Spacetime, Time, Unit};
use tstp_wire::{Body, Interest, Packet, PacketBuilder, Response};

fn interest() -> Packet {
    PacketBuilder::new(Scale::Cm16, Spacetime::new(Space::SINK, Time::from_secs(10)))
        .unit(Unit::TEMPERATURE)
        .build(Body::Interest(Interest {
            region: Region::new(Space::new(150, -20, 5), 50, Time::ZERO, Time::INFINITE),
            expiry: 5_000_000,
            period: 1_000_000,
            value: vec![0; 4],
        }))
}

fn bench_packet_encode(c: &mut Criterion) {
    let packet = interest();
    c.bench_function("interest_encode", |b| {
        b.iter(|| black_box(&packet).encode().unwrap())
    });
}

fn bench_packet_decode(c: &mut Criterion) {
    let bytes = interest().encode().unwrap();
    c.bench_function("interest_decode", |b| {
        b.iter(|| Packet::decode(black_box(&bytes)).unwrap())
    });
}

fn bench_packet_id(c: &mut Criterion) {
    let packet = PacketBuilder::new(
        Scale::Cm32,
        Spacetime::new(Space::new(-70_000, 12, 9), Time::from_secs(99)),
    )
    .build(Body::Response(Response {
        confidence: 90,
        expiry: 1_000_000,
        value: vec![7; 8],
    }));
    c.bench_function("packet_id", |b| b.iter(|| black_box(&packet).id().unwrap()));
}

fn bench_region_contains(c: &mut Criterion) {
    let region = Region::new(Space::new(1_000, 1_000, 0), 250, Time(0), Time(1_000_000));
    let points: Vec<Space> = (0..64).map(|i| Space::new(800 + i * 8, 1_000, 0)).collect();
    c.bench_function("region_contains_64", |b| {
        b.iter(|| {
            points
                .iter()
                .filter(|p| region.contains(black_box(*p), Time(500_000)))
                .count()
        })
    });
}

criterion_group!(
    benches,
    bench_packet_encode,
    bench_packet_decode,
    bench_packet_id,
    bench_region_contains
);
criterion_main!(benches);
