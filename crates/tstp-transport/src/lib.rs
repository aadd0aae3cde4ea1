//! TSTP Transport - Radio mediators for hosts without an 802.15.4 radio
//!
//! This crate provides:
//! - A UDP radio that emulates a broadcast neighbourhood
//! - A background receive loop feeding time-stamped buffers

pub mod udp;

pub use udp::*;
