//! Router - destination computation and greedy forwarding
//!
//! Every message type maps to a destination Region. A node is a final
//! recipient when it lies inside that region; it relays a frame when it
//! is strictly closer to the region's center than the previous hop, or
//! when it sits inside a region that more than one node may occupy.
//! Relaying is stateless broadcast: no acknowledgment and no retry.

use parking_lot::Mutex;
use rand::Rng;

use tstp_core::{PacketId, Region, Space, Spacetime, Time, SUBTYPE_MODEL};
use tstp_wire::{Body, Buffer, BufferMeta, Control, Packet};

use crate::{DuplicateCache, FrameKey, RouterConfig};

/// What the router needs to know about this node for one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalState {
    pub here: Space,
    /// Location confidence, percent
    pub confidence: u8,
    pub now: Time,
    pub synchronized: bool,
}

/// Geographic router
pub struct Router {
    config: RouterConfig,
    security_deadline_us: u64,
    seen: Mutex<DuplicateCache>,
}

impl Router {
    pub fn new(config: RouterConfig, security_deadline_us: u64) -> Self {
        let seen = Mutex::new(DuplicateCache::new(config.dedup_capacity));
        Router {
            config,
            security_deadline_us,
            seen,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[inline]
    pub fn is_forwarder(&self) -> bool {
        self.config.forwarder
    }

    /// End of a handshake message's lifetime
    pub fn security_deadline(&self, origin: Time) -> Time {
        origin.saturating_add(self.security_deadline_us)
    }

    /// Region a packet is addressed to
    pub fn destination(&self, packet: &Packet, here: Space) -> Region {
        let origin = packet.header.origin.time;
        match &packet.body {
            Body::Interest(interest) => interest.region,
            Body::Response(response) => Region::new(
                Space::SINK,
                0,
                origin,
                origin.saturating_add(response.expiry as u64),
            ),
            Body::Command(command) => command.region,
            Body::Control(control) => match control {
                Control::DhRequest { destination, .. } | Control::AuthGranted { destination, .. } => {
                    Region::from_sphere(*destination, origin, self.security_deadline(origin))
                }
                Control::DhResponse { .. } | Control::AuthRequest { .. } => {
                    Region::new(Space::SINK, 0, origin, self.security_deadline(origin))
                }
                Control::Report { .. } => Region::new(Space::SINK, 0, origin, Time::INFINITE),
                Control::KeepAlive => self.decoy(here),
                Control::Epoch {
                    destination, t1, ..
                } => Region::from_sphere(*destination, origin, *t1),
                Control::Other { subtype, .. } if *subtype == SUBTYPE_MODEL => {
                    Region::new(Space::SINK, 0, origin, self.security_deadline(origin))
                }
                Control::Other { subtype, .. } => {
                    tracing::warn!(subtype = *subtype, "Invalid control subtype");
                    self.decoy(here)
                }
            },
        }
    }

    /// Region no node can be inside of: a nearby point other than `here`
    /// with an already closed window
    fn decoy(&self, here: Space) -> Region {
        let span = (self.config.radio_range / 3).max(2) as i32;
        let mut rng = rand::thread_rng();
        let fake = Space::new(
            here.x.wrapping_add(rng.gen_range(1..span)),
            here.y.wrapping_add(rng.gen_range(0..span)),
            here.z.wrapping_add(rng.gen_range(0..span)),
        );
        Region::new(fake, 0, Time::ZERO, Time::ZERO)
    }

    /// Record a frame; true if it was seen before
    pub fn seen_before(&self, packet: &Packet, id: PacketId) -> bool {
        !self.seen.lock().insert(FrameKey::of(packet, id))
    }

    /// Remember a frame this node sends, so its echo from a relay is
    /// dropped. Call it with the packet as it goes on the air.
    pub fn remember(&self, packet: &Packet, id: PacketId) {
        self.seen.lock().insert(FrameKey::of(packet, id));
    }

    /// Greedy admission for a microframe announcing a data frame
    pub fn update_microframe(&self, meta: &mut BufferMeta) {
        if !meta.relevant {
            meta.relevant = self.config.forwarder && meta.my_distance < meta.sender_distance;
        }
        tracing::trace!(
            my_distance = meta.my_distance,
            sender_distance = meta.sender_distance,
            relevant = meta.relevant,
            "Microframe"
        );
    }

    /// Classify a received data frame. Returns the copy to relay, if any.
    pub fn update(&self, buf: &mut Buffer, packet: &Packet, local: &LocalState) -> Option<Buffer> {
        let meta = &mut buf.meta;

        // Keep-alives and unknown control subtypes are never delivered
        // nor relayed
        if packet.is_keep_alive() || is_unroutable(packet) {
            meta.destined_to_me = false;
            meta.relevant = false;
            return None;
        }

        let dst = self.destination(packet, local.here);
        let at = if local.synchronized { local.now } else { dst.t0 };
        meta.destined_to_me =
            packet.header.origin.space != local.here && dst.contains(&local.here, at);
        meta.my_distance = local.here.distance(&dst.center);
        meta.sender_distance = packet.header.last_hop.space.distance(&dst.center);
        meta.downlink = dst.center != Space::SINK;
        meta.deadline = dst.t1;

        let forward = self.forward(meta, &dst, local);
        meta.relevant = meta.destined_to_me || forward;
        if !forward {
            return None;
        }

        let mut relay = packet.clone();
        relay.header.last_hop = Spacetime::new(local.here, local.now);
        relay.header.location_confidence = local.confidence;
        relay.header.time_request = !local.synchronized;

        let frame = match relay.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot re-encode frame for relay");
                return None;
            }
        };
        let relay_meta = BufferMeta {
            is_microframe: false,
            sender_distance: meta.my_distance,
            hint: meta.my_distance,
            trusted: false,
            relevant: false,
            ..meta.clone()
        };
        tracing::trace!(id = relay_meta.id.0, distance = relay_meta.hint, "Forwarding");
        Some(Buffer {
            frame,
            meta: relay_meta,
        })
    }

    fn forward(&self, meta: &BufferMeta, dst: &Region, local: &LocalState) -> bool {
        if !self.config.forwarder {
            return false;
        }
        if self.config.drop_expired && local.synchronized && dst.is_expired(local.now) {
            tracing::trace!(id = meta.id.0, "Not relaying expired frame");
            return false;
        }
        // Sole recipient
        if meta.destined_to_me && dst.radius == 0 {
            return false;
        }
        let in_region = dst.radius > 0 && dst.sphere().contains(&local.here);
        meta.my_distance < meta.sender_distance || in_region
    }

    /// Stamp an outgoing packet and its metadata. Returns its destination.
    pub fn marshal(
        &self,
        meta: &mut BufferMeta,
        packet: &mut Packet,
        local: &LocalState,
    ) -> Region {
        packet.header.last_hop = Spacetime::new(local.here, local.now);
        packet.header.location_confidence = local.confidence;
        packet.header.time_request = !local.synchronized;

        let dst = self.destination(packet, local.here);
        meta.downlink = dst.center != Space::SINK;
        meta.destined_to_me =
            packet.header.origin.space != local.here && dst.contains(&local.here, local.now);
        meta.my_distance = local.here.distance(&dst.center);
        meta.sender_distance = meta.my_distance;
        meta.hint = meta.my_distance;
        meta.deadline = dst.t1;

        if let Ok(id) = packet.id() {
            meta.id = id;
        }
        dst
    }
}

/// Control subtype this router has no destination for
fn is_unroutable(packet: &Packet) -> bool {
    matches!(
        packet.control(),
        Some(Control::Other { subtype, .. }) if *subtype != SUBTYPE_MODEL
    )
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("security_deadline_us", &self.security_deadline_us)
            .finish()
    }
}
