//! TSTP Test Harness - Simulated radio medium and multi-node scenarios
//!
//! This crate provides:
//! - An in-memory broadcast medium with radio range and seeded loss
//! - A `Radio` implementation over that medium
//! - A scenario builder wiring protocol instances to the medium, each
//!   with its own manual hardware clock

pub mod medium;
pub mod scenario;

pub use medium::*;
pub use scenario::*;
