//! Multi-node scenarios over the simulated medium
//!
//! Every node gets its own manual hardware clock, started at a distinct
//! tick so that clocks disagree until the sink's Epoch reaches them.
//! Frame delivery is breadth-first: a frame sent while another is being
//! processed is queued behind it.

use std::sync::Arc;

use tstp_core::{NodeId, Region, Space, Time, TstpResult};
use tstp_crypto::{BlockCipher, ChaChaCipher};
use tstp_runtime::{Protocol, ProtocolConfig, StaticLocator};
use tstp_time::{HardwareTimer, ManualTimer};
use tstp_wire::Buffer;

use crate::{Medium, MediumConfig};

/// Upper bound on deliveries per `run_until_idle`
const MAX_DELIVERIES: usize = 100_000;

/// Clock start of the first node, in ticks
const CLOCK_BASE: u64 = 1_000_000;

/// Clock start difference between consecutive nodes, in ticks
const CLOCK_STAGGER: u64 = 123_457;

/// One simulated node
pub struct SimNode {
    pub protocol: Arc<Protocol>,
    pub locator: Arc<StaticLocator>,
    pub timer: ManualTimer,
    pub station: usize,
}

impl SimNode {
    pub fn id(&self) -> NodeId {
        self.protocol.id()
    }

    pub fn here(&self) -> Space {
        self.protocol.here()
    }
}

/// A set of nodes sharing one medium
pub struct Simulation {
    medium: Arc<Medium>,
    nodes: Vec<SimNode>,
}

impl Simulation {
    pub fn medium(&self) -> &Arc<Medium> {
        &self.medium
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Move a node; the medium and its locator follow
    pub fn move_node(&self, index: usize, position: Space) {
        let node = &self.nodes[index];
        node.locator.move_to(position);
        self.medium.move_station(node.station, position);
    }

    /// Deliver queued frames until the medium is quiet. Returns the
    /// number of deliveries.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while let Some(deliveries) = self.medium.next_deliveries() {
            for delivery in deliveries {
                let node = &self.nodes[delivery.to];
                node.protocol
                    .update(Buffer::received(delivery.frame, node.timer.read()));
                delivered += 1;
            }
            if delivered > MAX_DELIVERIES {
                tracing::warn!(delivered, "Simulation did not settle");
                break;
            }
        }
        delivered
    }

    /// Advance every hardware clock
    pub fn advance(&self, micros: u64) {
        for node in &self.nodes {
            node.timer.advance(node.timer.us2count(micros));
        }
    }

    pub fn tick_all(&self) {
        for node in &self.nodes {
            node.protocol.tick();
        }
    }

    /// Advance clocks, tick every node and deliver the result
    pub fn step(&self, micros: u64) -> usize {
        self.advance(micros);
        self.tick_all();
        self.run_until_idle()
    }

    /// Step until every node is synchronized or `max_steps` ran out
    pub fn synchronize(&self, step_us: u64, max_steps: usize) -> bool {
        for _ in 0..max_steps {
            self.step(step_us);
            if self.all_synchronized() {
                return true;
            }
        }
        self.all_synchronized()
    }

    pub fn all_synchronized(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.protocol.timekeeper().synchronized())
    }

    /// Provision the sink and `node` with each other and run the
    /// handshake to completion
    pub fn establish_trust(&self, sink: usize, node: usize) -> bool {
        let s = &self.nodes[sink];
        let n = &self.nodes[node];
        s.protocol.add_peer(n.id(), deployment(n.here()));
        n.protocol.add_peer(s.id(), deployment(s.here()));

        s.protocol.request_trust();
        self.run_until_idle();
        s.protocol.security().is_trusted(&n.id()) && n.protocol.security().is_trusted(&s.id())
    }
}

/// Deployment region of a fixed node: a small sphere, valid forever
pub fn deployment(center: Space) -> Region {
    Region::new(center, 10, Time::ZERO, Time::INFINITE)
}

/// Builds a simulation
pub struct ScenarioBuilder {
    medium: MediumConfig,
    configs: Vec<ProtocolConfig>,
    cipher: Arc<dyn BlockCipher>,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        ScenarioBuilder {
            medium: MediumConfig::default(),
            configs: Vec::new(),
            cipher: Arc::new(ChaChaCipher),
        }
    }

    pub fn with_medium(mut self, medium: MediumConfig) -> Self {
        self.medium = medium;
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn BlockCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Add the sink at the origin
    pub fn sink(self) -> Self {
        self.with_config(ProtocolConfig::sink())
    }

    /// Add an ordinary node
    pub fn node(self, position: Space) -> Self {
        self.with_config(ProtocolConfig::node(position))
    }

    /// Add a node with its own configuration. The serial is assigned
    /// from the node's index.
    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn build(self) -> TstpResult<Simulation> {
        let medium = Medium::new(self.medium);
        let mut nodes = Vec::with_capacity(self.configs.len());

        for (index, config) in self.configs.into_iter().enumerate() {
            let config = config.with_serial(index as u64 + 1);
            let station = medium.join(config.position);
            let locator = Arc::new(StaticLocator::fixed(config.position));
            let timer = ManualTimer::new(CLOCK_BASE + CLOCK_STAGGER * index as u64);
            let protocol = Protocol::with_cipher(
                config,
                Arc::new(medium.radio(station)),
                locator.clone(),
                Arc::new(timer.clone()),
                Arc::clone(&self.cipher),
            )?;
            nodes.push(SimNode {
                protocol: Arc::new(protocol),
                locator,
                timer,
                station,
            });
        }

        Ok(Simulation { medium, nodes })
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_assigns_serials_and_clocks() {
        let sim = ScenarioBuilder::new()
            .sink()
            .node(Space::new(100, 0, 0))
            .build()
            .unwrap();
        assert_eq!(sim.len(), 2);
        assert_eq!(sim.node(0).id(), NodeId::from_serial(1));
        assert_eq!(sim.node(1).id(), NodeId::from_serial(2));
        assert!(sim.node(0).protocol.is_sink());
        assert_ne!(sim.node(0).timer.read(), sim.node(1).timer.read());
    }

    #[test]
    fn test_move_node_follows_medium() {
        let sim = ScenarioBuilder::new()
            .with_medium(MediumConfig::perfect(100))
            .sink()
            .node(Space::new(500, 0, 0))
            .build()
            .unwrap();
        sim.node(1).protocol.tick();
        assert_eq!(sim.run_until_idle(), 0);

        sim.move_node(1, Space::new(50, 0, 0));
        assert_eq!(sim.node(1).here(), Space::new(50, 0, 0));
        sim.advance(10_000_000);
        sim.node(1).protocol.tick();
        assert!(sim.run_until_idle() > 0);
        assert!(sim.node(1).protocol.timekeeper().synchronized());
    }
}
