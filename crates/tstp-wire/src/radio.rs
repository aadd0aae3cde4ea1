//! Radio mediator interface

use tstp_core::TstpResult;

use crate::{Buffer, MTU};

/// Broadcast radio consumed by the protocol.
///
/// Implementations deliver received frames by calling the protocol's
/// `update` with a `Buffer` whose `reception_ticks` came from the same
/// hardware timer the timekeeper reads.
pub trait Radio: Send + Sync {
    /// Broadcast-addressed transmit buffer, or `None` when the pool is empty
    fn alloc(&self, size: usize) -> Option<Buffer>;

    /// Transmit; returns the number of bytes queued
    fn send(&self, buf: Buffer) -> TstpResult<usize>;

    /// Largest frame this radio carries
    fn mtu(&self) -> usize {
        MTU
    }
}
