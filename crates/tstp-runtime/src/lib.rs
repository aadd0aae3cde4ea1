//! TSTP Runtime - Router, security manager and protocol context
//!
//! A received frame goes through these stages:
//! 1. Decode and drop duplicates
//! 2. Fold last-hop time into the clock
//! 3. Compute the destination and relay (greedy geographic forwarding)
//! 4. Answer time requests (sink)
//! 5. Run the trust handshake and unseal Responses
//! 6. Hand data messages to the observers of their unit
//!
//! Outgoing packets are stamped by the router and sealed by the
//! security manager before they reach the radio.

pub mod config;
pub mod dedup;
pub mod driver;
pub mod locator;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod security;

pub use config::*;
pub use dedup::*;
pub use driver::*;
pub use locator::*;
pub use logging::*;
pub use protocol::*;
pub use registry::*;
pub use router::*;
pub use security::*;
