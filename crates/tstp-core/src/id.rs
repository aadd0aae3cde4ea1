//! Identity types for TSTP
//!
//! Nodes are identified by a 128-bit id (the size of a block cipher key),
//! devices by the 32-bit selector carried in every header, and packets by
//! a 16-bit fold of their header.

use std::fmt;

/// Size of a node id in bytes
pub const NODE_ID_SIZE: usize = 16;

/// Node identity - 128-bit, unique per deployed node
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub [u8; NODE_ID_SIZE]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; NODE_ID_SIZE]);

    #[inline]
    pub fn new(bytes: [u8; NODE_ID_SIZE]) -> Self {
        NodeId(bytes)
    }

    /// Id built from a serial number (upper half zero). Handy for fleets
    /// provisioned from a counter.
    #[inline]
    pub fn from_serial(serial: u64) -> Self {
        let mut bytes = [0u8; NODE_ID_SIZE];
        bytes[..8].copy_from_slice(&serial.to_le_bytes());
        NodeId(bytes)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; NODE_ID_SIZE] {
        self.0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; NODE_ID_SIZE] {
        &self.0
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; NODE_ID_SIZE]) -> Self {
        NodeId(bytes)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Device selector carried in the header (transducer instance)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub const ZERO: DeviceId = DeviceId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        DeviceId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        DeviceId(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

/// Packet identity - XOR fold of the hop-invariant header words
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PacketId(pub u16);

impl PacketId {
    #[inline]
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        PacketId(u16::from_le_bytes(bytes))
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({:04x})", self.0)
    }
}
