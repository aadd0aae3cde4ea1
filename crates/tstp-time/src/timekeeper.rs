//! Timekeeper - drift-bounded network time
//!
//! `now() = count2us(read()) + offset`. The sink never resynchronizes
//! (its clock defines network time). Other nodes must refresh the offset
//! before the timer's worst-case drift exceeds `max_drift_us`; they start
//! asking for time half a period early.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use tstp_core::{Space, Time};
use tstp_wire::{BufferMeta, Control, Packet};

use crate::HardwareTimer;

/// Timekeeper configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimekeeperConfig {
    /// Largest tolerated deviation from network time
    pub max_drift_us: u64,
    /// Keep-alive cadence while the node still lacks a time fix
    pub keep_alive_retry_us: u64,
    /// Minimum gap between Epochs the sink sends in answer to time requests
    pub epoch_min_interval_us: u64,
    /// Transmission plus interrupt latency added to received timestamps
    pub reception_delay_us: u64,
}

impl Default for TimekeeperConfig {
    fn default() -> Self {
        TimekeeperConfig {
            max_drift_us: 500_000,
            keep_alive_retry_us: 1_000_000,
            epoch_min_interval_us: 100_000,
            reception_delay_us: 0,
        }
    }
}

impl TimekeeperConfig {
    /// Tight drift budget for deployments that time-stamp events finely
    pub fn precise() -> Self {
        TimekeeperConfig {
            max_drift_us: 50_000,
            keep_alive_retry_us: 500_000,
            ..Self::default()
        }
    }

    /// Loose budget for battery-bound nodes
    pub fn low_power() -> Self {
        TimekeeperConfig {
            max_drift_us: 2_000_000,
            keep_alive_retry_us: 5_000_000,
            epoch_min_interval_us: 1_000_000,
            reception_delay_us: 0,
        }
    }
}

/// Resynchronization period in microseconds.
///
/// `max_drift * 1e15 / (frequency * accuracy_ppb)`, never below 1 us.
/// For a 1 MHz timer this is the time the timer needs to drift by
/// `max_drift_us`.
pub fn sync_period_for(max_drift_us: u64, frequency: u64, accuracy_ppb: u64) -> u64 {
    let denom = frequency.max(1) as u128 * accuracy_ppb.max(1) as u128;
    let period = max_drift_us as u128 * 1_000_000_000_000_000 / denom;
    period.clamp(1, u64::MAX as u128) as u64
}

#[derive(Debug, Default)]
struct ClockState {
    /// Network time minus local time, microseconds
    offset: i64,
    /// Tick of the next mandatory resync; 0 = never synchronized
    next_sync: u64,
    next_keep_alive: u64,
    last_epoch: Option<u64>,
    /// Epoch value last advertised by the sink
    sink_epoch: i64,
}

/// Network time for one node
pub struct Timekeeper {
    timer: Arc<dyn HardwareTimer>,
    config: TimekeeperConfig,
    sink: bool,
    state: Mutex<ClockState>,
}

impl Timekeeper {
    pub fn new(timer: Arc<dyn HardwareTimer>, config: TimekeeperConfig, sink: bool) -> Self {
        let state = ClockState {
            next_sync: if sink { u64::MAX } else { 0 },
            ..ClockState::default()
        };
        tracing::info!(
            max_drift_us = config.max_drift_us,
            sync_period_us =
                sync_period_for(config.max_drift_us, timer.frequency(), timer.accuracy()),
            sink,
            "Timekeeper initialized"
        );
        Timekeeper {
            timer,
            config,
            sink,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &TimekeeperConfig {
        &self.config
    }

    pub fn timer(&self) -> &Arc<dyn HardwareTimer> {
        &self.timer
    }

    #[inline]
    pub fn is_sink(&self) -> bool {
        self.sink
    }

    /// Raw hardware ticks
    #[inline]
    pub fn read(&self) -> u64 {
        self.timer.read()
    }

    /// Hardware time without the epoch
    pub fn local_time(&self) -> Time {
        Time(self.timer.count2us(self.timer.read()))
    }

    /// Network time
    pub fn now(&self) -> Time {
        let offset = self.state.lock().offset;
        self.local_time().offset(offset)
    }

    /// Network time minus local time
    pub fn offset(&self) -> i64 {
        self.state.lock().offset
    }

    /// Epoch last advertised by the sink
    pub fn sink_epoch(&self) -> i64 {
        self.state.lock().sink_epoch
    }

    pub fn sync_period(&self) -> u64 {
        sync_period_for(
            self.config.max_drift_us,
            self.timer.frequency(),
            self.timer.accuracy(),
        )
    }

    fn sync_required_at(&self, state: &ClockState, ticks: u64) -> bool {
        if self.sink {
            return false;
        }
        let half = self.timer.us2count(self.sync_period() / 2);
        state.next_sync == 0 || ticks >= state.next_sync.saturating_sub(half)
    }

    /// True until the first fix, and again from half a period before
    /// the next mandatory resync
    pub fn sync_required(&self) -> bool {
        let ticks = self.timer.read();
        let state = self.state.lock();
        self.sync_required_at(&state, ticks)
    }

    #[inline]
    pub fn synchronized(&self) -> bool {
        !self.sync_required()
    }

    /// Tick of the next mandatory resync (0 before the first fix)
    pub fn next_sync(&self) -> u64 {
        self.state.lock().next_sync
    }

    /// Hardware ticks to network time. 0 and infinity pass through.
    pub fn absolute(&self, ticks: u64) -> Time {
        match ticks {
            0 => Time::ZERO,
            u64::MAX => Time::INFINITE,
            _ => Time(self.timer.count2us(ticks)).offset(self.offset()),
        }
    }

    /// Network time to hardware ticks. 0 and infinity pass through.
    pub fn relative(&self, t: Time) -> u64 {
        if t == Time::ZERO {
            return 0;
        }
        if t.is_infinite() {
            return u64::MAX;
        }
        self.timer.us2count(t.offset(-self.offset()).0)
    }

    /// Seed network time so that `now() == t` (sink)
    pub fn set_epoch(&self, t: Time) {
        let local = self.local_time();
        let mut state = self.state.lock();
        state.offset = t.signed_diff(local);
        tracing::info!(epoch = state.offset, "Network time seeded");
    }

    /// Align with `reference`, the network time at which the frame
    /// received at `reception_ticks` was sent. Returns true on the first
    /// fix.
    pub fn adopt(&self, reference: Time, reception_ticks: u64) -> bool {
        if self.sink {
            return false;
        }
        let ticks = if reception_ticks == 0 {
            self.timer.read()
        } else {
            reception_ticks
        };
        let local = Time(self.timer.count2us(ticks));
        let reference = reference.saturating_add(self.config.reception_delay_us);
        let next = ticks.saturating_add(self.timer.us2count(self.sync_period())).max(1);

        let mut state = self.state.lock();
        let first = state.next_sync == 0;
        state.offset = reference.signed_diff(local);
        state.next_sync = next;
        drop(state);

        if first {
            tracing::info!(offset = reference.signed_diff(local), "First time fix");
        } else {
            tracing::debug!(offset = reference.signed_diff(local), "Time resynchronized");
        }
        first
    }

    /// Fold a received frame into the clock.
    ///
    /// Epochs and frames from synchronized senders closer to the sink
    /// carry usable time in their last-hop stamp. Returns true if the
    /// frame was adopted.
    pub fn update(&self, packet: &Packet, meta: &BufferMeta, here: Space) -> bool {
        if self.sink || meta.is_microframe {
            return false;
        }
        let header = &packet.header;
        if header.time_request || header.last_hop.time == Time::ZERO {
            return false;
        }

        let usable = match packet.control() {
            Some(Control::Epoch { epoch, .. }) => {
                self.state.lock().sink_epoch = *epoch;
                true
            }
            _ => header.last_hop.space.distance(&Space::SINK) < here.distance(&Space::SINK),
        };
        if usable {
            self.adopt(header.last_hop.time, meta.reception_ticks);
        }
        usable
    }

    /// True when a keep-alive should go out now; arms the next one
    pub fn keep_alive_due(&self) -> bool {
        if self.sink {
            return false;
        }
        let ticks = self.timer.read();
        let mut state = self.state.lock();
        if ticks < state.next_keep_alive {
            return false;
        }
        let period = if self.sync_required_at(&state, ticks) {
            self.config.keep_alive_retry_us
        } else {
            self.sync_period()
        };
        state.next_keep_alive = ticks.saturating_add(self.timer.us2count(period));
        true
    }

    /// Sink only: true when an Epoch should be broadcast. `requested`
    /// marks an answer to a time request, which is rate limited;
    /// otherwise the Epoch is re-broadcast every half sync period.
    pub fn epoch_due(&self, requested: bool) -> bool {
        if !self.sink {
            return false;
        }
        let ticks = self.timer.read();
        let gap = if requested {
            self.timer.us2count(self.config.epoch_min_interval_us)
        } else {
            self.timer.us2count(self.sync_period() / 2)
        };
        let mut state = self.state.lock();
        match state.last_epoch {
            Some(last) if ticks.saturating_sub(last) < gap => false,
            _ => {
                state.last_epoch = Some(ticks);
                true
            }
        }
    }
}

impl std::fmt::Debug for Timekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Timekeeper")
            .field("sink", &self.sink)
            .field("offset", &state.offset)
            .field("next_sync", &state.next_sync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualTimer;
    use proptest::prelude::*;
    use tstp_core::{Scale, Spacetime, Sphere};
    use tstp_wire::{Body, PacketBuilder};

    fn node(ticks: u64) -> (ManualTimer, Timekeeper) {
        let timer = ManualTimer::new(ticks);
        let tk = Timekeeper::new(Arc::new(timer.clone()), TimekeeperConfig::default(), false);
        (timer, tk)
    }

    fn epoch_from_sink(sent_at: Time) -> Packet {
        PacketBuilder::new(Scale::Cm16, Spacetime::new(Space::SINK, sent_at)).build(Body::Control(
            Control::Epoch {
                destination: Sphere::new(Space::SINK, 1_000),
                t1: sent_at.saturating_add(1_000_000),
                epoch: 7,
                coordinates: Space::new(1, 2, 3),
            },
        ))
    }

    #[test]
    fn test_default_sync_period() {
        let (_, tk) = node(0);
        // 500 ms at 20 ppm
        assert_eq!(tk.sync_period(), 25_000_000_000);
    }

    #[test]
    fn test_sink_never_requires_sync() {
        let timer = ManualTimer::new(u64::MAX - 1);
        let tk = Timekeeper::new(Arc::new(timer), TimekeeperConfig::default(), true);
        assert!(!tk.sync_required());
        assert!(tk.synchronized());
        assert!(!tk.adopt(Time(5), 5));
        assert!(!tk.keep_alive_due());
    }

    #[test]
    fn test_unsynchronized_until_first_fix() {
        let (timer, tk) = node(1_000);
        assert!(tk.sync_required());
        assert_eq!(tk.next_sync(), 0);

        assert!(tk.adopt(Time(51_000), 1_000));
        assert!(tk.synchronized());
        assert_eq!(tk.offset(), 50_000);
        assert_eq!(tk.now(), Time(51_000));

        // Required again half a period before the deadline
        let half = tk.sync_period() / 2;
        timer.advance(half - 1);
        assert!(tk.synchronized());
        timer.advance(1);
        assert!(tk.sync_required());
    }

    #[test]
    fn test_epoch_message_sets_offset() {
        let (timer, tk) = node(2_000);
        let mut packet = epoch_from_sink(Time(2_000 + 9_000));
        packet.header.last_hop = Spacetime::new(Space::SINK, Time(11_000));
        let meta = BufferMeta {
            reception_ticks: 2_000,
            ..BufferMeta::default()
        };
        assert!(tk.update(&packet, &meta, Space::new(50, 0, 0)));
        assert_eq!(tk.now(), Time(timer.read() + 9_000));
        assert_eq!(tk.sink_epoch(), 7);
    }

    #[test]
    fn test_time_request_frames_ignored() {
        let (_, tk) = node(2_000);
        let mut packet = epoch_from_sink(Time(5_000));
        packet.header.time_request = true;
        assert!(!tk.update(&packet, &BufferMeta::default(), Space::new(50, 0, 0)));
        assert!(tk.sync_required());
    }

    #[test]
    fn test_only_closer_senders_are_trusted_for_time() {
        let (_, tk) = node(2_000);
        let keep_alive = |from: Space| {
            PacketBuilder::new(Scale::Cm16, Spacetime::new(from, Time(4_000)))
                .build(Body::Control(Control::KeepAlive))
        };
        let meta = BufferMeta::default();
        assert!(!tk.update(&keep_alive(Space::new(90, 0, 0)), &meta, Space::new(50, 0, 0)));
        assert!(tk.update(&keep_alive(Space::new(10, 0, 0)), &meta, Space::new(50, 0, 0)));
    }

    #[test]
    fn test_absolute_relative() {
        let (_, tk) = node(0);
        tk.adopt(Time(1_000_500), 500);
        assert_eq!(tk.absolute(1_000), Time(1_001_000));
        assert_eq!(tk.relative(Time(1_001_000)), 1_000);
        assert_eq!(tk.absolute(0), Time::ZERO);
        assert_eq!(tk.absolute(u64::MAX), Time::INFINITE);
        assert_eq!(tk.relative(Time::INFINITE), u64::MAX);
    }

    #[test]
    fn test_keep_alive_cadence() {
        let (timer, tk) = node(10);
        assert!(tk.keep_alive_due());
        assert!(!tk.keep_alive_due());
        timer.advance(tk.config().keep_alive_retry_us);
        assert!(tk.keep_alive_due());
    }

    #[test]
    fn test_epoch_rate_limit() {
        let timer = ManualTimer::new(1);
        let tk = Timekeeper::new(Arc::new(timer.clone()), TimekeeperConfig::default(), true);
        assert!(tk.epoch_due(true));
        assert!(!tk.epoch_due(true));
        timer.advance(tk.config().epoch_min_interval_us);
        assert!(tk.epoch_due(true));
        assert!(!tk.epoch_due(false));
    }

    #[test]
    fn test_set_epoch() {
        let timer = ManualTimer::new(300);
        let tk = Timekeeper::new(Arc::new(timer), TimekeeperConfig::default(), true);
        tk.set_epoch(Time(1_000_000));
        assert_eq!(tk.now(), Time(1_000_000));
        assert_eq!(tk.offset(), 999_700);
    }

    proptest! {
        #[test]
        fn prop_sync_period_positive_and_monotone(
            max_drift in 1u64..10_000_000,
            frequency in 1_000u64..100_000_000,
            accuracy in 1u64..1_000_000,
            extra in 1u64..1_000_000,
        ) {
            let p = sync_period_for(max_drift, frequency, accuracy);
            prop_assert!(p > 0);
            prop_assert!(sync_period_for(max_drift, frequency, accuracy + extra) <= p);
            prop_assert!(sync_period_for(max_drift, frequency, accuracy * 2) < p);
        }
    }
}
