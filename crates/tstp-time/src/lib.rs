//! TSTP Time - Network time on top of a free-running hardware timer
//!
//! The sink's clock defines network time. Every other node keeps an
//! offset from its own hardware timer, refreshed from Epoch messages and
//! from frames stamped by already synchronized neighbours, and must
//! resynchronize before its worst-case drift exceeds the configured
//! budget.

pub mod timekeeper;
pub mod timer;

pub use timekeeper::*;
pub use timer::*;
