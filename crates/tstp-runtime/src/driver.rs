//! Async node driver
//!
//! Runs one protocol instance on a UDP radio: received frames are fed to
//! `Protocol::update` and `Protocol::tick` runs on a fixed interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use tstp_core::TstpResult;
use tstp_time::{HardwareTimer, SystemTimer};
use tstp_transport::{start_receive_loop, UdpRadio};

use crate::{Protocol, ProtocolConfig, StaticLocator};

/// Frames buffered between the socket and the protocol
const RECEIVE_QUEUE: usize = 64;

/// Build a protocol on a fresh UDP radio, located at `config.position`
pub async fn bind_node(
    config: ProtocolConfig,
    addr: SocketAddr,
) -> TstpResult<(Arc<Protocol>, Arc<UdpRadio>)> {
    let timer: Arc<dyn HardwareTimer> = Arc::new(SystemTimer::new());
    let radio = Arc::new(UdpRadio::bind(addr, Arc::clone(&timer)).await?);
    let locator = Arc::new(StaticLocator::fixed(config.position));
    let protocol = Protocol::new(config, radio.clone(), locator, timer)?;
    tracing::info!(addr = %radio.local_addr(), id = %protocol.id(), "Node bound");
    Ok((Arc::new(protocol), radio))
}

/// Running node
pub struct NodeHandle {
    protocol: Arc<Protocol>,
    radio: Arc<UdpRadio>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn radio(&self) -> &Arc<UdpRadio> {
        &self.radio
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Node task ended abnormally");
        }
    }
}

/// Spawn the receive/tick loop of one node
pub fn spawn_node(
    protocol: Arc<Protocol>,
    radio: Arc<UdpRadio>,
    tick_interval: Duration,
) -> NodeHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let mut frames = start_receive_loop(Arc::clone(&radio), RECEIVE_QUEUE);
    let node = Arc::clone(&protocol);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(buf) => node.update(buf),
                    None => break,
                },
                _ = ticker.tick() => node.tick(),
                _ = &mut shutdown_rx => break,
            }
        }
        tracing::debug!(unit = node.unit(), "Node loop stopped");
    });

    NodeHandle {
        protocol,
        radio,
        shutdown: Some(shutdown_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tstp_core::{Space, Time};

    use crate::StartupConfig;

    #[tokio::test]
    async fn test_node_synchronizes_over_udp() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (sink, sink_radio) = bind_node(ProtocolConfig::sink().with_serial(1), loopback)
            .await
            .unwrap();
        let (node, node_radio) = bind_node(
            ProtocolConfig::node(Space::new(100, 0, 0)).with_serial(2),
            loopback,
        )
        .await
        .unwrap();
        sink_radio.add_neighbour(node_radio.local_addr());
        node_radio.add_neighbour(sink_radio.local_addr());
        sink.epoch(Time::from_secs(1_000));

        let tick = Duration::from_millis(10);
        let sink_handle = spawn_node(sink, sink_radio, tick);
        let node_handle = spawn_node(Arc::clone(&node), node_radio, tick);

        let startup = StartupConfig {
            min_confidence: 80,
            max_attempts: 200,
            backoff_ms: 10,
        };
        node.wait_until_ready(&startup).await.unwrap();
        assert!(node.timekeeper().synchronized());
        assert!(node.now() >= Time::from_secs(1_000));

        node_handle.shutdown().await;
        sink_handle.shutdown().await;
    }
}
