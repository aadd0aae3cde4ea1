//! Duplicate suppression
//!
//! Greedy relaying lets the same frame reach a node over several paths.
//! A frame is identified by its packet id, its origin time and a digest
//! of its body. The id alone folds only header words, so two frames a
//! node emits in the same microsecond differ only in the digest. The
//! cache remembers the most recent `capacity` frames.

use std::collections::VecDeque;

use tstp_core::{PacketId, Time};
use tstp_wire::Packet;

/// Identity of a frame across hops
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub id: PacketId,
    pub origin: Time,
    pub digest: u32,
}

impl FrameKey {
    pub fn new(id: PacketId, origin: Time, digest: u32) -> Self {
        FrameKey { id, origin, digest }
    }

    /// Key of a packet whose id is already known
    pub fn of(packet: &Packet, id: PacketId) -> Self {
        // A decoded body always re-encodes; the zero digest only covers
        // packets built with out-of-range coordinates
        let digest = packet.body_digest().unwrap_or_default();
        FrameKey::new(id, packet.header.origin.time, digest)
    }
}

/// Bounded FIFO of recently seen frames
#[derive(Debug, Clone)]
pub struct DuplicateCache {
    seen: VecDeque<FrameKey>,
    capacity: usize,
}

impl DuplicateCache {
    pub fn new(capacity: usize) -> Self {
        DuplicateCache {
            seen: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, key: &FrameKey) -> bool {
        self.seen.contains(key)
    }

    /// Record a frame. Returns false if it was already present.
    pub fn insert(&mut self, key: FrameKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        if self.seen.len() == self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
