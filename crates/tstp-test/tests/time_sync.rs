//! Network time distribution from the sink

use tstp_core::{Space, Time};
use tstp_runtime::Locator;
use tstp_test::{MediumConfig, ScenarioBuilder, Simulation};

const STEP_US: u64 = 100_000;

fn chain(hops: i32) -> Simulation {
    let mut builder = ScenarioBuilder::new()
        .with_medium(MediumConfig::perfect(200))
        .sink();
    for hop in 1..=hops {
        builder = builder.node(Space::new(150 * hop, 0, 0));
    }
    builder.build().unwrap()
}

#[test]
fn test_epoch_reaches_every_hop() {
    let sim = chain(4);
    sim.node(0).protocol.epoch(Time::from_secs(86_400));
    for node in &sim.nodes()[1..] {
        assert!(!node.protocol.timekeeper().synchronized());
    }

    assert!(sim.synchronize(STEP_US, 10));

    let reference = sim.node(0).protocol.now();
    let epoch = sim.node(0).protocol.timekeeper().offset();
    for node in &sim.nodes()[1..] {
        let skew = node.protocol.now().signed_diff(reference).abs();
        assert!(skew <= 1, "node at {} is {} us off", node.here(), skew);
        assert_eq!(node.protocol.timekeeper().sink_epoch(), epoch);
    }
}

#[test]
fn test_sink_coordinates_adopted() {
    let sim = chain(2);
    let absolute = Space::new(5_000, 6_000, 10);
    sim.node(0).locator.set_reference(absolute);
    assert!(sim.synchronize(STEP_US, 10));

    for node in &sim.nodes()[1..] {
        assert_eq!(node.locator.reference(), absolute);
        assert_eq!(
            node.locator.absolute(node.here()),
            Space::new(5_000 + node.here().x, 6_000, 10)
        );
    }
}

#[test]
fn test_resync_after_drift_window() {
    let sim = chain(1);
    assert!(sim.synchronize(STEP_US, 10));
    let period = sim.node(1).protocol.timekeeper().sync_period();

    // Past the midpoint of the sync period the node asks for time again
    sim.advance(period / 2 + 1);
    assert!(!sim.node(1).protocol.timekeeper().synchronized());

    sim.tick_all();
    sim.run_until_idle();
    assert!(sim.node(1).protocol.timekeeper().synchronized());
}

#[test]
fn test_keep_alive_asks_sink_for_time() {
    let sim = chain(1);
    // Only the node ticks: its keep-alive must trigger the Epoch
    sim.advance(STEP_US);
    sim.node(1).protocol.tick();
    sim.run_until_idle();

    assert!(sim.node(1).protocol.timekeeper().synchronized());
    assert_eq!(sim.node(1).protocol.stats().keep_alives, 1);
    assert_eq!(sim.node(0).protocol.stats().epochs, 1);
}

#[test]
fn test_unreachable_node_stays_unsynchronized() {
    let sim = ScenarioBuilder::new()
        .with_medium(MediumConfig::perfect(100))
        .sink()
        .node(Space::new(500, 0, 0))
        .build()
        .unwrap();
    assert!(!sim.synchronize(STEP_US, 5));
    assert_eq!(sim.node(1).protocol.stats().frames_in, 0);
}
