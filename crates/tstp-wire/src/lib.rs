//! TSTP Wire Protocol - Packet encoding and decoding
//!
//! Packet layout (packed, little-endian, no implicit padding):
//! - Header (36 to 52 bytes depending on scale)
//! - Type-specific body (Region, offsets, or control submessage)
//! - Value (variable length, up to the MTU)
//! - Trailer: packet id (2 bytes) + CRC-32 (4 bytes)

pub mod body;
pub mod buffer;
mod codec;
pub mod header;
pub mod packet;
pub mod radio;
pub mod record;

pub use body::*;
pub use buffer::*;
pub use header::*;
pub use packet::*;
pub use radio::*;
pub use record::*;
