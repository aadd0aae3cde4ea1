//! Simulated broadcast medium
//!
//! Frames sent by a station are queued and later delivered to every
//! other station within radio range. Loss is drawn from a seeded RNG so
//! lossy scenarios are reproducible.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tstp_core::{Space, TstpError, TstpResult};
use tstp_wire::{Buffer, Radio, MTU};

/// Medium parameters
#[derive(Clone, Debug, PartialEq)]
pub struct MediumConfig {
    /// Stations farther apart than this never hear each other
    pub range: u32,
    /// Probability of losing a frame on each link
    pub loss_rate: f64,
    pub seed: u64,
}

impl Default for MediumConfig {
    fn default() -> Self {
        MediumConfig {
            range: 200,
            loss_rate: 0.0,
            seed: 42,
        }
    }
}

impl MediumConfig {
    /// Loss-free medium with the given range
    pub fn perfect(range: u32) -> Self {
        MediumConfig {
            range,
            ..Self::default()
        }
    }

    pub fn lossy(range: u32, loss_rate: f64) -> Self {
        MediumConfig {
            range,
            loss_rate: loss_rate.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

/// Medium counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediumStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_lost: u64,
}

/// A frame handed to one station
#[derive(Clone, Debug)]
pub struct Delivery {
    pub from: usize,
    pub to: usize,
    pub frame: Vec<u8>,
}

struct MediumState {
    stations: Vec<Space>,
    queue: VecDeque<(usize, Vec<u8>)>,
    rng: StdRng,
    stats: MediumStats,
}

/// Shared broadcast channel
pub struct Medium {
    config: MediumConfig,
    state: Mutex<MediumState>,
}

impl Medium {
    pub fn new(config: MediumConfig) -> Arc<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Arc::new(Medium {
            config,
            state: Mutex::new(MediumState {
                stations: Vec::new(),
                queue: VecDeque::new(),
                rng,
                stats: MediumStats::default(),
            }),
        })
    }

    pub fn config(&self) -> &MediumConfig {
        &self.config
    }

    /// Add a station; returns its index
    pub fn join(&self, position: Space) -> usize {
        let mut state = self.state.lock();
        state.stations.push(position);
        state.stations.len() - 1
    }

    pub fn move_station(&self, station: usize, position: Space) {
        if let Some(p) = self.state.lock().stations.get_mut(station) {
            *p = position;
        }
    }

    /// Radio handle for a station
    pub fn radio(self: &Arc<Self>, station: usize) -> SimRadio {
        SimRadio {
            medium: Arc::clone(self),
            station,
        }
    }

    fn transmit(&self, from: usize, frame: Vec<u8>) {
        let mut state = self.state.lock();
        state.stats.frames_sent += 1;
        state.queue.push_back((from, frame));
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Pop the oldest queued frame and fan it out to the stations in range
    pub fn next_deliveries(&self) -> Option<Vec<Delivery>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (from, frame) = state.queue.pop_front()?;
        let origin = state.stations[from];

        let mut deliveries = Vec::new();
        for (to, position) in state.stations.iter().enumerate() {
            if to == from || origin.distance(position) > self.config.range {
                continue;
            }
            if self.config.loss_rate > 0.0 && state.rng.gen_bool(self.config.loss_rate) {
                state.stats.frames_lost += 1;
                continue;
            }
            state.stats.frames_delivered += 1;
            deliveries.push(Delivery {
                from,
                to,
                frame: frame.clone(),
            });
        }
        Some(deliveries)
    }

    pub fn stats(&self) -> MediumStats {
        self.state.lock().stats.clone()
    }
}

/// One station's view of the medium
pub struct SimRadio {
    medium: Arc<Medium>,
    station: usize,
}

impl SimRadio {
    pub fn station(&self) -> usize {
        self.station
    }
}

impl Radio for SimRadio {
    fn alloc(&self, size: usize) -> Option<Buffer> {
        (size <= MTU).then(|| Buffer::with_capacity(size))
    }

    fn send(&self, buf: Buffer) -> TstpResult<usize> {
        let size = buf.frame.len();
        if size > MTU {
            return Err(TstpError::PacketTooLarge { size, mtu: MTU });
        }
        self.medium.transmit(self.station, buf.frame);
        Ok(size)
    }
}
