//! Time primitives for TSTP
//!
//! Network time is an unsigned count of microseconds. The sink's clock
//! defines it; every other node tracks it through an offset kept by the
//! timekeeper. `Time::INFINITE` marks open-ended windows and never
//! participates in arithmetic.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point in network time, microseconds
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Time(pub u64);

impl Time {
    pub const ZERO: Time = Time(0);
    pub const INFINITE: Time = Time(u64::MAX);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        Time(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Time(millis.saturating_mul(1_000))
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        Time(secs.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_infinite(self) -> bool {
        self.0 == u64::MAX
    }

    /// Add a microsecond offset, saturating below `INFINITE`.
    #[inline]
    pub fn saturating_add(self, micros: u64) -> Self {
        if self.is_infinite() {
            return self;
        }
        Time(self.0.saturating_add(micros).min(u64::MAX - 1))
    }

    #[inline]
    pub fn saturating_sub(self, micros: u64) -> Self {
        if self.is_infinite() {
            return self;
        }
        Time(self.0.saturating_sub(micros))
    }

    /// Apply a signed offset (used for epoch corrections).
    #[inline]
    pub fn offset(self, micros: i64) -> Self {
        if micros >= 0 {
            self.saturating_add(micros as u64)
        } else {
            self.saturating_sub(micros.unsigned_abs())
        }
    }

    /// Signed distance `self - earlier` in microseconds.
    #[inline]
    pub fn signed_diff(self, earlier: Time) -> i64 {
        (self.0 as i128 - earlier.0 as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Time(u64::from_le_bytes(bytes))
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs.as_micros().min(u64::MAX as u128) as u64)
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs.as_micros().min(u64::MAX as u128) as u64)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "Time(inf)")
        } else {
            write!(f, "Time({}us)", self.0)
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}us", self.0)
        }
    }
}
