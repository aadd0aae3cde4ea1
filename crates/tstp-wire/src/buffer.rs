//! Radio buffers and the routing metadata attached to them
//!
//! The radio mediator owns the frame bytes; the protocol layers only
//! read and rewrite the metadata while the buffer passes through them.

use tstp_core::{PacketId, Time, TstpResult};

use crate::Packet;

/// Per-frame metadata, mutated as the frame moves through the stack
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferMeta {
    /// Short preamble frame announcing a data frame
    pub is_microframe: bool,
    /// This node is a final recipient
    pub destined_to_me: bool,
    /// Some local subsystem cares about the frame
    pub relevant: bool,
    /// This node's distance to the destination center
    pub my_distance: u32,
    /// Previous hop's distance to the destination center
    pub sender_distance: u32,
    /// Security accepted the frame
    pub trusted: bool,
    /// Travelling away from the sink
    pub downlink: bool,
    /// End of the destination's time window
    pub deadline: Time,
    /// Distance advertised to the next hop's microframes
    pub hint: u32,
    /// Hardware timer value when the frame's SFD was received
    pub reception_ticks: u64,
    /// Identity of the data frame (also carried by its microframes)
    pub id: PacketId,
}

/// Frame plus metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    pub frame: Vec<u8>,
    pub meta: BufferMeta,
}

impl Buffer {
    /// Empty transmit buffer with room for `size` bytes
    pub fn with_capacity(size: usize) -> Self {
        Buffer {
            frame: Vec::with_capacity(size),
            meta: BufferMeta::default(),
        }
    }

    /// Received data frame
    pub fn received(frame: Vec<u8>, reception_ticks: u64) -> Self {
        Buffer {
            frame,
            meta: BufferMeta {
                reception_ticks,
                ..BufferMeta::default()
            },
        }
    }

    /// Received microframe; the MAC fills both distances from its hint
    pub fn microframe(id: PacketId, my_distance: u32, sender_distance: u32) -> Self {
        Buffer {
            frame: Vec::new(),
            meta: BufferMeta {
                is_microframe: true,
                my_distance,
                sender_distance,
                id,
                ..BufferMeta::default()
            },
        }
    }

    /// Decode the frame
    pub fn packet(&self) -> TstpResult<Packet> {
        Packet::decode(&self.frame)
    }

    /// Replace the frame with an encoded packet
    pub fn set_packet(&mut self, packet: &Packet) -> TstpResult<()> {
        self.frame = packet.encode()?;
        self.meta.id = packet.id()?;
        Ok(())
    }
}
