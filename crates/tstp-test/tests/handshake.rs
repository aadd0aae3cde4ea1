//! Trust establishment and Response protection over the simulated medium

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tstp_core::{AuthToken, EncryptedAuth, Otp, Space, Time, TstpError, TstpResult, Unit};
use tstp_crypto::BlockCipher;
use tstp_runtime::Locator;
use tstp_test::{deployment, MediumConfig, ScenarioBuilder, Simulation};
use tstp_wire::{Body, BufferMeta, Control, Packet, Response};

/// XOR "cipher" with the key appended as tag
struct XorCipher;

impl BlockCipher for XorCipher {
    fn encrypt(&self, key: &Otp, token: &AuthToken) -> TstpResult<EncryptedAuth> {
        let mut out = [0u8; 32];
        for i in 0..16 {
            out[i] = token.0[i] ^ key.0[i];
            out[i + 16] = key.0[i];
        }
        Ok(EncryptedAuth(out))
    }

    fn decrypt(&self, key: &Otp, sealed: &EncryptedAuth) -> TstpResult<AuthToken> {
        if sealed.0[16..] != key.0[..] {
            return Err(TstpError::DecryptionFailed);
        }
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = sealed.0[i] ^ key.0[i];
        }
        Ok(AuthToken(out))
    }
}

const STEP_US: u64 = 100_000;

fn synchronized(builder: ScenarioBuilder) -> Simulation {
    let sim = builder.build().unwrap();
    sim.node(0).protocol.epoch(Time::from_secs(3_600));
    assert!(sim.synchronize(STEP_US, 20));
    sim
}

fn send_temperature(sim: &Simulation, node: usize, celsius: f32) {
    sim.advance(1_000);
    let protocol = &sim.node(node).protocol;
    let packet = protocol
        .packet()
        .unit(Unit::TEMPERATURE)
        .build(Body::Response(Response {
            confidence: 95,
            expiry: 10_000_000,
            value: celsius.to_le_bytes().to_vec(),
        }));
    protocol.send_packet(packet).unwrap();
    sim.run_until_idle();
}

type Received = Arc<Mutex<Vec<(Vec<u8>, bool)>>>;

fn record_temperatures(sim: &Simulation, node: usize) -> Received {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    sim.node(node).protocol.attach(
        Unit::TEMPERATURE,
        Arc::new(move |_: Unit, packet: &Packet, meta: &BufferMeta| {
            if let Some(value) = packet.body.value() {
                sink.lock().push((value.to_vec(), meta.trusted));
            }
        }),
    );
    received
}

#[test]
fn test_handshake_with_real_cipher() {
    let sim = synchronized(ScenarioBuilder::new().sink().node(Space::new(100, 0, 0)));
    assert!(sim.establish_trust(0, 1));

    let sink = sim.node(0).protocol.security();
    let node = sim.node(1).protocol.security();
    assert_eq!(sink.stats().handshakes_completed, 1);
    assert_eq!(node.stats().handshakes_completed, 1);
    assert_eq!(
        sink.master_secret(&sim.node(1).id()),
        node.master_secret(&sim.node(0).id())
    );
    assert_eq!(sink.pending_keys(), 0);
    assert_eq!(node.pending_keys(), 0);
}

#[test]
fn test_handshake_with_mock_cipher() {
    let sim = synchronized(
        ScenarioBuilder::new()
            .with_cipher(Arc::new(XorCipher))
            .sink()
            .node(Space::new(-120, 40, 0)),
    );
    assert!(sim.establish_trust(0, 1));
}

#[test]
fn test_one_trust_round_covers_every_peer() {
    let sim = synchronized(
        ScenarioBuilder::new()
            .sink()
            .node(Space::new(100, 0, 0))
            .node(Space::new(-100, 0, 0)),
    );
    let sink = &sim.node(0).protocol;
    for i in 1..3 {
        let node = sim.node(i);
        sink.add_peer(node.id(), deployment(node.here()));
        node.protocol.add_peer(sim.node(0).id(), deployment(Space::SINK));
    }

    // Both DH requests leave the sink in the same microsecond
    assert_eq!(sink.request_trust(), 2);
    sim.run_until_idle();

    for i in 1..3 {
        let node = sim.node(i);
        assert!(sink.security().is_trusted(&node.id()), "node {}", i);
        assert!(node.protocol.security().is_trusted(&sim.node(0).id()), "node {}", i);
    }
    assert_eq!(sink.security().stats().handshakes_completed, 2);
    assert_eq!(sink.security().pending_keys(), 0);
}

#[test]
fn test_bogus_auth_request_leaves_trust_intact() {
    let sim = synchronized(ScenarioBuilder::new().sink().node(Space::new(100, 0, 0)));
    assert!(sim.establish_trust(0, 1));

    sim.advance(1_000);
    let node = &sim.node(1).protocol;
    let forged = node.packet().build(Body::Control(Control::AuthRequest {
        auth: node.security().auth(),
        otp: Otp([0xA5; 16]),
    }));
    node.send_packet(forged).unwrap();
    sim.run_until_idle();

    let sink = sim.node(0).protocol.security();
    assert_eq!(sink.stats().auth_failures, 1);
    assert!(sink.is_trusted(&sim.node(1).id()));
}

#[test]
fn test_handshake_fails_without_time_sync() {
    let sim = ScenarioBuilder::new()
        .sink()
        .node(Space::new(100, 0, 0))
        .build()
        .unwrap();
    sim.node(0).protocol.epoch(Time::from_secs(3_600));
    // The node's replies carry origin times from an unsynchronized clock,
    // outside the sink's notion of now
    assert!(!sim.establish_trust(0, 1));
}

#[test]
fn test_sealed_response_opened_at_sink() {
    let sim = synchronized(ScenarioBuilder::new().sink().node(Space::new(100, 0, 0)));
    let received = record_temperatures(&sim, 0);
    assert!(sim.establish_trust(0, 1));

    send_temperature(&sim, 1, 21.5);

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], (21.5f32.to_le_bytes().to_vec(), true));
    assert_eq!(sim.node(0).protocol.security().stats().responses_unpacked, 1);
}

#[test]
fn test_plain_response_delivered_untrusted() {
    let sim = synchronized(ScenarioBuilder::new().sink().node(Space::new(100, 0, 0)));
    let received = record_temperatures(&sim, 0);

    send_temperature(&sim, 1, 18.0);

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], (18.0f32.to_le_bytes().to_vec(), false));
}

#[test]
fn test_response_relayed_to_sink_over_two_hops() {
    let sim = synchronized(
        ScenarioBuilder::new()
            .with_medium(MediumConfig::perfect(200))
            .sink()
            .node(Space::new(150, 0, 0))
            .node(Space::new(300, 0, 0)),
    );
    let received = record_temperatures(&sim, 0);
    assert!(sim.establish_trust(0, 2));

    let relayed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&relayed);
    sim.node(1).protocol.attach(
        Unit::TEMPERATURE,
        Arc::new(move |_: Unit, _: &Packet, _: &BufferMeta| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let forwarded_before = sim.node(1).protocol.stats().forwarded;
    send_temperature(&sim, 2, 30.25);

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], (30.25f32.to_le_bytes().to_vec(), true));
    // The relay forwards but is not a recipient
    assert_eq!(relayed.load(Ordering::SeqCst), 0);
    assert_eq!(sim.node(1).protocol.stats().forwarded, forwarded_before + 1);
}

#[test]
fn test_gateway_record_uses_absolute_coordinates() {
    let sim = synchronized(ScenarioBuilder::new().sink().node(Space::new(100, -30, 0)));
    sim.node(0).locator.set_reference(Space::new(10_000, 20_000, 500));
    assert!(sim.establish_trust(0, 1));

    let captured: Arc<Mutex<Vec<Packet>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    sim.node(0).protocol.attach(
        Unit::TEMPERATURE,
        Arc::new(move |_: Unit, packet: &Packet, _: &BufferMeta| {
            sink.lock().push(packet.clone());
        }),
    );
    send_temperature(&sim, 1, -4.5);

    let captured = captured.lock();
    assert_eq!(captured.len(), 1);
    let record = sim.node(0).protocol.db_record(&captured[0]).unwrap();
    assert_eq!(record.value, -4.5);
    assert_eq!(record.confidence, 95);
    assert_eq!(record.position, Space::new(10_100, 19_970, 500));
    assert_eq!(record.t, captured[0].header.origin.time);
}
