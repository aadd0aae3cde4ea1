//! Hardware timer interface and host implementations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Free-running hardware timer exposed by the radio mediator
pub trait HardwareTimer: Send + Sync {
    /// Raw tick count
    fn read(&self) -> u64;

    /// Tick frequency in Hz
    fn frequency(&self) -> u64;

    /// Worst-case frequency error in parts per billion
    fn accuracy(&self) -> u64;

    /// Ticks to microseconds
    fn count2us(&self, ticks: u64) -> u64 {
        let hz = self.frequency().max(1) as u128;
        (ticks as u128 * 1_000_000 / hz).min(u64::MAX as u128) as u64
    }

    /// Microseconds to ticks
    fn us2count(&self, us: u64) -> u64 {
        let hz = self.frequency().max(1) as u128;
        (us as u128 * hz / 1_000_000).min(u64::MAX as u128) as u64
    }
}

/// Default crystal accuracy: 20 ppm
pub const DEFAULT_ACCURACY_PPB: u64 = 20_000;

/// Microsecond timer backed by the host's monotonic clock
#[derive(Debug, Clone)]
pub struct SystemTimer {
    start: Instant,
    accuracy: u64,
}

impl SystemTimer {
    pub fn new() -> Self {
        Self::with_accuracy(DEFAULT_ACCURACY_PPB)
    }

    pub fn with_accuracy(accuracy_ppb: u64) -> Self {
        SystemTimer {
            start: Instant::now(),
            accuracy: accuracy_ppb,
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareTimer for SystemTimer {
    fn read(&self) -> u64 {
        self.start.elapsed().as_micros().min(u64::MAX as u128) as u64
    }

    fn frequency(&self) -> u64 {
        1_000_000
    }

    fn accuracy(&self) -> u64 {
        self.accuracy
    }
}

/// Timer advanced by hand; clones share the same counter.
#[derive(Debug, Clone)]
pub struct ManualTimer {
    ticks: Arc<AtomicU64>,
    frequency: u64,
    accuracy: u64,
}

impl ManualTimer {
    /// 1 MHz timer starting at `ticks`
    pub fn new(ticks: u64) -> Self {
        Self::with_params(ticks, 1_000_000, DEFAULT_ACCURACY_PPB)
    }

    pub fn with_params(ticks: u64, frequency: u64, accuracy_ppb: u64) -> Self {
        ManualTimer {
            ticks: Arc::new(AtomicU64::new(ticks)),
            frequency,
            accuracy: accuracy_ppb,
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl HardwareTimer for ManualTimer {
    fn read(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }

    fn accuracy(&self) -> u64 {
        self.accuracy
    }
}
