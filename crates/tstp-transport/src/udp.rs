//! UDP radio implementation
//!
//! A node owns one socket. A broadcast is one datagram per configured
//! neighbour, so the neighbour list plays the part of radio range.
//! Received frames are stamped with the node's hardware timer before
//! they reach the protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use tstp_core::{TstpError, TstpResult};
use tstp_time::HardwareTimer;
use tstp_wire::{Buffer, Radio, LINK_FRAME_SIZE, MTU};

/// Radio counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RadioStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    /// Datagrams discarded by the emulated loss
    pub frames_lost: u64,
    pub send_errors: u64,
}

/// Broadcast radio over UDP
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    neighbours: RwLock<Vec<SocketAddr>>,
    timer: Arc<dyn HardwareTimer>,
    /// Probability of dropping each outgoing datagram
    loss: f64,
    stats: Mutex<RadioStats>,
}

impl UdpRadio {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr, timer: Arc<dyn HardwareTimer>) -> TstpResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TstpError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| TstpError::TransportError(e.to_string()))?;

        Ok(UdpRadio {
            socket: Arc::new(socket),
            local_addr,
            neighbours: RwLock::new(Vec::new()),
            timer,
            loss: 0.0,
            stats: Mutex::new(RadioStats::default()),
        })
    }

    /// Drop each outgoing datagram with probability `loss`
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss.clamp(0.0, 1.0);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn add_neighbour(&self, addr: SocketAddr) {
        let mut neighbours = self.neighbours.write();
        if !neighbours.contains(&addr) {
            neighbours.push(addr);
        }
    }

    pub fn remove_neighbour(&self, addr: SocketAddr) {
        self.neighbours.write().retain(|a| *a != addr);
    }

    pub fn neighbours(&self) -> Vec<SocketAddr> {
        self.neighbours.read().clone()
    }

    pub fn stats(&self) -> RadioStats {
        self.stats.lock().clone()
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Receive one frame, stamped with the reception tick
    pub async fn recv(&self) -> TstpResult<(Buffer, SocketAddr)> {
        let mut buf = vec![0u8; LINK_FRAME_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| TstpError::TransportError(e.to_string()))?;
        let ticks = self.timer.read();
        buf.truncate(len);
        self.stats.lock().frames_received += 1;
        Ok((Buffer::received(buf, ticks), addr))
    }
}

impl Radio for UdpRadio {
    fn alloc(&self, size: usize) -> Option<Buffer> {
        if size > MTU {
            tracing::warn!(size, mtu = MTU, "Buffer request exceeds MTU");
            return None;
        }
        Some(Buffer::with_capacity(size))
    }

    fn send(&self, buf: Buffer) -> TstpResult<usize> {
        let size = buf.frame.len();
        if size > MTU {
            return Err(TstpError::PacketTooLarge { size, mtu: MTU });
        }

        let neighbours = self.neighbours.read().clone();
        let mut rng = rand::thread_rng();
        let mut stats = self.stats.lock();
        for addr in neighbours {
            if self.loss > 0.0 && rng.gen_bool(self.loss) {
                stats.frames_lost += 1;
                continue;
            }
            // The protocol path is synchronous; a full socket buffer loses
            // the frame like a collision would
            match self.socket.try_send_to(&buf.frame, addr) {
                Ok(_) => {
                    stats.frames_sent += 1;
                    stats.bytes_sent += size as u64;
                }
                Err(e) => {
                    stats.send_errors += 1;
                    tracing::debug!(%addr, error = %e, "UDP send failed");
                }
            }
        }
        Ok(size)
    }
}

/// Frame receiver channel
pub type FrameReceiver = mpsc::Receiver<Buffer>;

/// Start a background receive loop
pub fn start_receive_loop(radio: Arc<UdpRadio>, buffer_size: usize) -> FrameReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        loop {
            match radio.recv().await {
                Ok((buf, _)) => {
                    if tx.send(buf).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tstp_time::ManualTimer;

    async fn radio(timer: &ManualTimer) -> UdpRadio {
        UdpRadio::bind("127.0.0.1:0".parse().unwrap(), Arc::new(timer.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_udp_radio_bind() {
        let radio = radio(&ManualTimer::new(0)).await;
        assert_ne!(radio.local_addr().port(), 0);
        assert!(radio.alloc(MTU).is_some());
        assert!(radio.alloc(MTU + 1).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_neighbours() {
        let timer = ManualTimer::new(0);
        let a = radio(&timer).await;
        let b = radio(&timer).await;
        a.add_neighbour(b.local_addr());
        a.add_neighbour(b.local_addr());
        assert_eq!(a.neighbours().len(), 1);

        let mut buf = a.alloc(4).unwrap();
        buf.frame.extend_from_slice(&[1, 2, 3, 4]);
        timer.set(777);
        assert_eq!(a.send(buf).unwrap(), 4);

        let (received, from) = b.recv().await.unwrap();
        assert_eq!(from, a.local_addr());
        assert_eq!(received.frame, vec![1, 2, 3, 4]);
        assert_eq!(received.meta.reception_ticks, 777);
        assert_eq!(a.stats().frames_sent, 1);
        assert_eq!(b.stats().frames_received, 1);
    }

    #[tokio::test]
    async fn test_total_loss_sends_nothing() {
        let timer = ManualTimer::new(0);
        let a = radio(&timer).await.with_loss(1.0);
        let b = radio(&timer).await;
        a.add_neighbour(b.local_addr());
        let mut buf = a.alloc(1).unwrap();
        buf.frame.push(9);
        a.send(buf).unwrap();
        assert_eq!(a.stats().frames_lost, 1);
        assert_eq!(a.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let a = radio(&ManualTimer::new(0)).await;
        let buf = Buffer {
            frame: vec![0; MTU + 1],
            ..Buffer::default()
        };
        assert!(matches!(a.send(buf), Err(TstpError::PacketTooLarge { .. })));
    }
}
