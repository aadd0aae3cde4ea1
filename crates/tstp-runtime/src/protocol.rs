//! Protocol - the per-radio context object
//!
//! Owns the router, timekeeper and security manager of one radio unit
//! and is the single dispatch point for received frames:
//!
//! ```text
//! radio -> update() -> Timekeeper -> Router (relay) -> Security -> observers
//! upper layer -> send() -> Router::marshal -> Security::marshal -> radio
//! ```
//!
//! The dispatch path never returns errors; frames are dropped, marked
//! untrusted, or delivered, and every decision is logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use tstp_core::{NodeId, Region, Space, Spacetime, Sphere, Time, TstpError, TstpResult, Unit};
use tstp_crypto::{BlockCipher, ChaChaCipher};
use tstp_time::{HardwareTimer, Timekeeper};
use tstp_wire::{
    header_size, Body, Buffer, BufferMeta, Control, DbRecord, DbSeries, Packet, PacketBuilder,
    Radio, TRAILER_SIZE,
};

use crate::{LocalState, Locator, ProtocolConfig, Router, Security, StartupConfig};

/// Upper-layer consumer of data messages
pub trait Observer: Send + Sync {
    fn notify(&self, unit: Unit, packet: &Packet, meta: &BufferMeta);
}

impl<F> Observer for F
where
    F: Fn(Unit, &Packet, &BufferMeta) + Send + Sync,
{
    fn notify(&self, unit: Unit, packet: &Packet, meta: &BufferMeta) {
        self(unit, packet, meta)
    }
}

/// Handle returned by `attach`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Protocol counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub microframes: u64,
    pub malformed: u64,
    pub duplicates: u64,
    pub forwarded: u64,
    pub delivered: u64,
    pub alloc_failures: u64,
    pub send_failures: u64,
    pub keep_alives: u64,
    pub epochs: u64,
}

/// TSTP instance bound to one radio unit
pub struct Protocol {
    config: ProtocolConfig,
    radio: Arc<dyn Radio>,
    locator: Arc<dyn Locator>,
    timekeeper: Timekeeper,
    router: Router,
    security: Security,
    observers: RwLock<HashMap<Unit, Vec<(ObserverId, Arc<dyn Observer>)>>>,
    next_observer: AtomicU64,
    stats: Mutex<ProtocolStats>,
}

impl Protocol {
    pub fn new(
        config: ProtocolConfig,
        radio: Arc<dyn Radio>,
        locator: Arc<dyn Locator>,
        timer: Arc<dyn HardwareTimer>,
    ) -> TstpResult<Self> {
        Self::with_cipher(config, radio, locator, timer, Arc::new(ChaChaCipher))
    }

    /// Protocol whose handshake seals tokens with `cipher`
    pub fn with_cipher(
        config: ProtocolConfig,
        radio: Arc<dyn Radio>,
        locator: Arc<dyn Locator>,
        timer: Arc<dyn HardwareTimer>,
        cipher: Arc<dyn BlockCipher>,
    ) -> TstpResult<Self> {
        config.validate()?;
        let timekeeper = Timekeeper::new(timer, config.timekeeper.clone(), config.is_sink);
        let router = Router::new(config.router.clone(), config.security.handshake_deadline_us);
        let security = Security::with_cipher(
            NodeId::from_serial(config.serial),
            config.is_sink,
            config.security.clone(),
            cipher,
        );
        tracing::info!(
            unit = config.unit,
            is_sink = config.is_sink,
            here = %locator.here(),
            scale = config.scale.name(),
            "TSTP initialized"
        );
        Ok(Protocol {
            config,
            radio,
            locator,
            timekeeper,
            router,
            security,
            observers: RwLock::new(HashMap::new()),
            next_observer: AtomicU64::new(1),
            stats: Mutex::new(ProtocolStats::default()),
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Radio unit this instance serves
    pub fn unit(&self) -> usize {
        self.config.unit
    }

    pub fn id(&self) -> NodeId {
        self.security.id()
    }

    pub fn is_sink(&self) -> bool {
        self.config.is_sink
    }

    pub fn timekeeper(&self) -> &Timekeeper {
        &self.timekeeper
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn security(&self) -> &Security {
        &self.security
    }

    pub fn locator(&self) -> &Arc<dyn Locator> {
        &self.locator
    }

    pub fn stats(&self) -> ProtocolStats {
        self.stats.lock().clone()
    }

    /// Sink position: the origin of the coordinate frame
    #[inline]
    pub fn sink(&self) -> Space {
        Space::SINK
    }

    pub fn here(&self) -> Space {
        self.locator.here()
    }

    pub fn now(&self) -> Time {
        self.timekeeper.now()
    }

    /// Seed network time (sink only)
    pub fn epoch(&self, t: Time) {
        if !self.is_sink() {
            tracing::warn!("Only the sink defines network time");
            return;
        }
        self.timekeeper.set_epoch(t);
    }

    fn local_state(&self) -> LocalState {
        LocalState {
            here: self.locator.here(),
            confidence: self.locator.confidence(),
            now: self.timekeeper.now(),
            synchronized: self.timekeeper.synchronized(),
        }
    }

    /// Builder for a packet created here and now
    pub fn packet(&self) -> PacketBuilder {
        PacketBuilder::new(
            self.config.scale,
            Spacetime::new(self.locator.here(), self.timekeeper.now()),
        )
        .location_confidence(self.locator.confidence())
    }

    /// Transmit buffer for a message carrying `size` bytes after the header
    pub fn alloc(&self, size: usize) -> Option<Buffer> {
        let total = header_size(self.config.scale) + size + TRAILER_SIZE;
        let buf = self.radio.alloc(total);
        if buf.is_none() {
            self.stats.lock().alloc_failures += 1;
            tracing::warn!(size = total, "Radio buffer allocation failed");
        }
        buf
    }

    /// Send an encoded frame prepared by an upper layer
    pub fn send(&self, buf: Buffer) -> TstpResult<usize> {
        let packet = buf.packet()?;
        self.transmit(packet, buf)
    }

    /// Marshal and send a packet
    pub fn send_packet(&self, packet: Packet) -> TstpResult<usize> {
        let buf = self
            .alloc(packet.body.encoded_len(self.config.scale))
            .ok_or(TstpError::AllocationFailed(packet.encoded_len()))?;
        self.transmit(packet, buf)
    }

    fn transmit(&self, mut packet: Packet, mut buf: Buffer) -> TstpResult<usize> {
        let local = self.local_state();
        let destination = self.router.marshal(&mut buf.meta, &mut packet, &local);
        self.security
            .marshal(&mut buf.meta, &mut packet, &destination, local.now)?;
        buf.set_packet(&packet)?;
        // Our own frame coming back from a relay is a duplicate
        self.router.remember(&packet, buf.meta.id);

        if buf.meta.destined_to_me {
            self.deliver(&packet, &buf.meta);
            if destination.radius == 0 {
                return Ok(0);
            }
        }

        match self.radio.send(buf) {
            Ok(size) => {
                self.stats.lock().frames_out += 1;
                Ok(size)
            }
            Err(e) => {
                self.stats.lock().send_failures += 1;
                Err(e)
            }
        }
    }

    fn send_body(&self, body: Body) {
        if let Err(e) = self.send_packet(self.packet().build(body)) {
            tracing::warn!(error = %e, "Cannot send control message");
        }
    }

    /// Radio notification: process one received frame
    pub fn update(&self, mut buf: Buffer) {
        self.stats.lock().frames_in += 1;

        if buf.meta.is_microframe {
            self.stats.lock().microframes += 1;
            self.router.update_microframe(&mut buf.meta);
            return;
        }

        let mut packet = match buf.packet() {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.lock().malformed += 1;
                tracing::debug!(error = %e, "Dropping malformed frame");
                return;
            }
        };
        let id = match packet.id() {
            Ok(id) => id,
            Err(e) => {
                self.stats.lock().malformed += 1;
                tracing::debug!(error = %e, "Dropping frame without id");
                return;
            }
        };
        buf.meta.id = id;

        if self.router.seen_before(&packet, id) {
            self.stats.lock().duplicates += 1;
            tracing::debug!(id = id.0, "Dropping duplicate");
            return;
        }

        self.timekeeper.update(&packet, &buf.meta, self.locator.here());
        let local = self.local_state();

        if let Some(relay) = self.router.update(&mut buf, &packet, &local) {
            match self.radio.send(relay) {
                Ok(_) => self.stats.lock().forwarded += 1,
                Err(e) => {
                    self.stats.lock().send_failures += 1;
                    tracing::warn!(error = %e, "Relay failed");
                }
            }
        }

        if self.is_sink() && packet.header.time_request && self.timekeeper.epoch_due(true) {
            self.send_epoch();
        }

        if !buf.meta.destined_to_me {
            tracing::debug!(id = id.0, "Not destined to this node");
            return;
        }

        for reply in self.security.update(&mut buf.meta, &mut packet, local.now) {
            self.send_body(reply);
        }

        if let Some(Control::Epoch { coordinates, .. }) = packet.control() {
            if !self.is_sink() {
                self.locator.set_reference(*coordinates);
            }
        }

        self.deliver(&packet, &buf.meta);
    }

    fn deliver(&self, packet: &Packet, meta: &BufferMeta) {
        if packet.control().is_some() {
            return;
        }
        if self.notify(packet.header.unit, packet, meta) {
            self.stats.lock().delivered += 1;
        }
    }

    /// Register an observer for data messages carrying `unit`
    pub fn attach(&self, unit: Unit, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .entry(unit)
            .or_default()
            .push((id, observer));
        id
    }

    pub fn detach(&self, unit: Unit, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let Some(list) = observers.get_mut(&unit) else {
            return false;
        };
        let before = list.len();
        list.retain(|(o, _)| *o != id);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.remove(&unit);
        }
        removed
    }

    /// Hand a packet to the observers of `unit`. True if any was attached.
    pub fn notify(&self, unit: Unit, packet: &Packet, meta: &BufferMeta) -> bool {
        let observers: Vec<Arc<dyn Observer>> = match self.observers.read().get(&unit) {
            Some(list) => list.iter().map(|(_, o)| Arc::clone(o)).collect(),
            None => return false,
        };
        for observer in &observers {
            observer.notify(unit, packet, meta);
        }
        !observers.is_empty()
    }

    /// Gateway record for a received Response, in absolute coordinates
    pub fn db_record(&self, packet: &Packet) -> TstpResult<DbRecord> {
        DbRecord::from_response(packet, |s| self.locator.absolute(s))
    }

    /// Gateway record for a received Interest, in absolute coordinates
    pub fn db_series(&self, packet: &Packet) -> TstpResult<DbSeries> {
        DbSeries::from_interest(packet, |s| self.locator.absolute(s))
    }

    /// Provision a peer for the trust handshake
    pub fn add_peer(&self, id: NodeId, valid: Region) {
        self.security.add_peer(id, valid);
    }

    /// Start a handshake with every pending peer
    pub fn request_trust(&self) -> usize {
        let requests = self.security.request_trust(self.now());
        let count = requests.len();
        for body in requests {
            self.send_body(body);
        }
        count
    }

    /// Announce this node to the sink
    pub fn report(&self) -> TstpResult<usize> {
        let body = Body::Control(Control::Report {
            auth: self.security.auth(),
        });
        self.send_packet(self.packet().build(body))
    }

    /// Broadcast the network time and the sink's absolute coordinates
    pub fn send_epoch(&self) {
        let now = self.now();
        let body = Body::Control(Control::Epoch {
            destination: Sphere::new(Space::SINK, u32::MAX),
            t1: now.saturating_add(self.timekeeper.sync_period()),
            epoch: self.timekeeper.offset(),
            coordinates: self.locator.absolute(Space::SINK),
        });
        self.stats.lock().epochs += 1;
        self.send_body(body);
    }

    /// Periodic work: keep-alives, Epoch rebroadcast and handshake expiry
    pub fn tick(&self) {
        if self.timekeeper.keep_alive_due() {
            self.stats.lock().keep_alives += 1;
            self.send_body(Body::Control(Control::KeepAlive));
        }
        if self.is_sink() && self.timekeeper.epoch_due(false) {
            self.send_epoch();
        }
        let timeout = self
            .timekeeper
            .sync_period()
            .saturating_mul(self.config.security.handshake_timeout_periods as u64);
        self.security.expire(self.now(), timeout);
    }

    /// Wait until the node has a position fix and a time fix.
    ///
    /// Keeps ticking while it waits so keep-alives solicit an Epoch.
    pub async fn wait_until_ready(&self, startup: &StartupConfig) -> TstpResult<()> {
        for attempt in 1..=startup.max_attempts {
            let located = self.locator.confidence() >= startup.min_confidence;
            if located && self.timekeeper.synchronized() {
                tracing::info!(attempt, "Node ready");
                return Ok(());
            }
            self.tick();
            tokio::time::sleep(Duration::from_millis(startup.backoff_ms)).await;
        }

        let confidence = self.locator.confidence();
        if confidence < startup.min_confidence {
            tracing::warn!(confidence, "Location confidence never reached the threshold");
            return Err(TstpError::LocalizationTimeout {
                confidence,
                required: startup.min_confidence,
                attempts: startup.max_attempts,
            });
        }
        if self.timekeeper.synchronized() {
            return Ok(());
        }
        tracing::warn!("No time fix");
        Err(TstpError::SyncTimeout {
            attempts: startup.max_attempts,
        })
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("unit", &self.config.unit)
            .field("is_sink", &self.config.is_sink)
            .field("timekeeper", &self.timekeeper)
            .field("security", &self.security)
            .finish()
    }
}
