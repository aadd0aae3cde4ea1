//! TSTP Crypto - Trust establishment and Response protection
//!
//! - X25519 key agreement producing a per-peer Master Secret
//! - One-time pads proving possession of a Master Secret
//! - Authentication tokens bound to node ids
//! - A pluggable block cipher for the AUTH_GRANTED token
//! - AEAD sealing of Response payloads

pub mod cipher;
pub mod dh;
pub mod otp;
pub mod seal;

pub use cipher::*;
pub use dh::*;
pub use otp::*;
pub use seal::*;
