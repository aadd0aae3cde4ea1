//! Spatial primitives and the Region addressing model
//!
//! Coordinates are relative to the sink, which sits at the origin of the
//! network's coordinate frame. They are in units of the network's
//! `Scale` (`Scale::unit_cm` centimeters each), never converted.
//!
//! A `Region` is a sphere intersected with a closed time interval; it is
//! the only way messages are addressed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Time, TstpError, TstpResult};

/// Position in the network coordinate frame, in `Scale` units
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Space {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Space {
    /// The sink's position; also the origin of the coordinate frame.
    pub const SINK: Space = Space { x: 0, y: 0, z: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Space { x, y, z }
    }

    /// Squared euclidean distance. Exact for the whole i32 range.
    #[inline]
    pub fn distance_squared(&self, other: &Space) -> u128 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs() as u128;
        let dy = (self.y as i64 - other.y as i64).unsigned_abs() as u128;
        let dz = (self.z as i64 - other.z as i64).unsigned_abs() as u128;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance rounded down, saturating at `u32::MAX`.
    #[inline]
    pub fn distance(&self, other: &Space) -> u32 {
        let sq = self.distance_squared(other);
        let mut d = (sq as f64).sqrt() as u128;
        // Correct the float estimate so that d = floor(sqrt(sq))
        while d * d > sq {
            d -= 1;
        }
        while (d + 1) * (d + 1) <= sq {
            d += 1;
        }
        d.min(u32::MAX as u128) as u32
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A (position, time) pair
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Spacetime {
    pub space: Space,
    pub time: Time,
}

impl Spacetime {
    #[inline]
    pub fn new(space: Space, time: Time) -> Self {
        Spacetime { space, time }
    }
}

/// Sphere in space, without a time window
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Sphere {
    pub center: Space,
    pub radius: u32,
}

impl Sphere {
    #[inline]
    pub fn new(center: Space, radius: u32) -> Self {
        Sphere { center, radius }
    }

    #[inline]
    pub fn contains(&self, point: &Space) -> bool {
        let r = self.radius as u128;
        self.center.distance_squared(point) <= r * r
    }
}

/// Sphere intersected with the closed interval `[t0, t1]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub center: Space,
    pub radius: u32,
    pub t0: Time,
    pub t1: Time,
}

impl Region {
    /// Build a region. An inverted window collapses onto `t0`.
    pub fn new(center: Space, radius: u32, t0: Time, t1: Time) -> Self {
        Region {
            center,
            radius,
            t0,
            t1: t1.max(t0),
        }
    }

    /// Build a region, rejecting `t0 > t1`.
    pub fn try_new(center: Space, radius: u32, t0: Time, t1: Time) -> TstpResult<Self> {
        if t0 > t1 {
            return Err(TstpError::InvalidRegion { t0: t0.0, t1: t1.0 });
        }
        Ok(Region {
            center,
            radius,
            t0,
            t1,
        })
    }

    /// Region built from a sphere and a time window.
    pub fn from_sphere(sphere: Sphere, t0: Time, t1: Time) -> Self {
        Region::new(sphere.center, sphere.radius, t0, t1)
    }

    #[inline]
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.center, self.radius)
    }

    /// True iff `point` lies within the radius and `t0 <= time <= t1`.
    #[inline]
    pub fn contains(&self, point: &Space, time: Time) -> bool {
        self.t0 <= time && time <= self.t1 && self.sphere().contains(point)
    }

    #[inline]
    pub fn contains_spacetime(&self, st: &Spacetime) -> bool {
        self.contains(&st.space, st.time)
    }

    #[inline]
    pub fn is_expired(&self, now: Time) -> bool {
        self.t1 < now
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({:?}, r={}, [{}, {}])",
            self.center, self.radius, self.t0, self.t1
        )
    }
}
