//! TSTP Core - Fundamental types and primitives
//!
//! This crate defines the value types shared by every TSTP layer:
//! - Space, Spacetime, Sphere and Region (the addressing primitive)
//! - Time (64-bit microseconds of network time)
//! - Identifiers and key material carried on the wire
//! - Units of measurement for payload values
//! - Message types, control subtypes and coordinate scales

pub mod error;
pub mod id;
pub mod message;
pub mod space;
pub mod time;
pub mod token;
pub mod unit;

pub use error::*;
pub use id::*;
pub use message::*;
pub use space::*;
pub use time::*;
pub use token::*;
pub use unit::*;
