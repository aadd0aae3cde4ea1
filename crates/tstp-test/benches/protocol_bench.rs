//! Benchmarks for the trust handshake and the receive path

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tstp_core::{DeviceId, Region, Space, Spacetime, Time, Unit};
use tstp_crypto::{pack, unpack, KeyPair};
use tstp_runtime::{Protocol, ProtocolConfig, StaticLocator};
use tstp_test::{Medium, MediumConfig};
use tstp_time::ManualTimer;
use tstp_wire::{Body, Buffer, Interest, PacketBuilder};

fn bench_key_agreement(c: &mut Criterion) {
    let sink = KeyPair::generate();
    let node = KeyPair::generate();
    let public = node.public_key();
    c.bench_function("dh_master_secret", |b| {
        b.iter(|| sink.master_secret(black_box(&public)).unwrap())
    });
}

fn bench_response_seal(c: &mut Criterion) {
    let ms = KeyPair::generate()
        .master_secret(&KeyPair::generate().public_key())
        .unwrap();
    let aad = [0x11u8; 20];
    let origin = Time::from_secs(42);
    let value = 21.5f32.to_le_bytes();
    let sealed = pack(&ms, &aad, origin, DeviceId(1), &value).unwrap();

    c.bench_function("response_pack", |b| {
        b.iter(|| pack(&ms, &aad, origin, DeviceId(1), black_box(&value)).unwrap())
    });
    c.bench_function("response_unpack", |b| {
        b.iter(|| unpack(&ms, &aad, origin, DeviceId(1), black_box(&sealed), 4).unwrap())
    });
}

fn bench_receive_interest(c: &mut Criterion) {
    let here = Space::new(150, 0, 0);
    let medium = Medium::new(MediumConfig::perfect(200));
    let station = medium.join(here);
    let timer = ManualTimer::new(1_000_000);
    let protocol = Protocol::new(
        ProtocolConfig::node(here),
        Arc::new(medium.radio(station)),
        Arc::new(StaticLocator::fixed(here)),
        Arc::new(timer.clone()),
    )
    .unwrap();

    // Distinct origin times defeat the duplicate cache
    let frames: Vec<Vec<u8>> = (1..=1_024u64)
        .map(|t| {
            PacketBuilder::new(Default::default(), Spacetime::new(Space::SINK, Time(t)))
                .unit(Unit::TEMPERATURE)
                .build(Body::Interest(Interest {
                    region: Region::new(here, 50, Time::ZERO, Time::INFINITE),
                    expiry: 1_000_000,
                    period: 0,
                    value: vec![0; 4],
                }))
                .encode()
                .unwrap()
        })
        .collect();

    let mut next = 0;
    c.bench_function("protocol_update_interest", |b| {
        b.iter(|| {
            let frame = frames[next % frames.len()].clone();
            next += 1;
            protocol.update(black_box(Buffer::received(frame, 1_000_000)));
            while medium.next_deliveries().is_some() {}
        })
    });
}

criterion_group!(benches, bench_key_agreement, bench_response_seal, bench_receive_interest);
criterion_main!(benches);
