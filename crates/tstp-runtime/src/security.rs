//! Security - trust establishment and Response protection
//!
//! Handshake between the gateway at the sink (initiator) and a node
//! (responder), both provisioned with a pending Peer record for the
//! other side:
//!
//! ```text
//! sink                                     node
//!  | ---- DH_REQUEST(pk_s) ----------------> |  ms = DH(node, pk_s)
//!  | <--- DH_RESPONSE(pk_n) ---------------- |
//!  | <--- AUTH_REQUEST(auth_n, OTP(ms, n)) - |
//!  ms = DH(sink, pk_n), verify OTP           |
//!  | ---- AUTH_GRANTED(E(OTP, auth_n)) ----> |  decrypt, compare auth_n
//! ```
//!
//! Each side promotes its Peer from pending to trusted once the other
//! has proven possession of the same Master Secret. Candidate secrets
//! wait in the pending-key list and are consumed by the first match.

use std::sync::Arc;

use parking_lot::Mutex;

use tstp_core::{
    AuthToken, EncryptedAuth, NodeId, Otp, PublicKeyBytes, Region, Space, Time, TstpResult,
};
use tstp_crypto::{
    auth_token, otp, pack, sealed_len, unpack, verify_otp, BlockCipher, ChaChaCipher, KeyPair,
    MasterSecret,
};
use tstp_wire::{Body, BufferMeta, Control, Packet};

use crate::SecurityConfig;

/// Trust record for one remote node
#[derive(Clone, Debug)]
pub struct Peer {
    id: NodeId,
    auth: AuthToken,
    valid: Region,
    master_secret: Option<MasterSecret>,
}

impl Peer {
    pub fn new(id: NodeId, valid: Region) -> Self {
        Peer {
            id,
            auth: auth_token(&id),
            valid,
            master_secret: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn auth(&self) -> AuthToken {
        self.auth
    }

    /// Where and when the peer may be deployed
    pub fn valid(&self) -> Region {
        self.valid
    }

    pub fn master_secret(&self) -> Option<&MasterSecret> {
        self.master_secret.as_ref()
    }

    /// A message from `place` at `now` may come from this peer
    pub fn valid_deploy(&self, place: &Space, now: Time) -> bool {
        self.valid.contains(place, now)
    }

    /// `auth` is this peer's token and it was sent from its deployment
    pub fn valid_request(&self, auth: &AuthToken, place: &Space, now: Time) -> bool {
        self.auth == *auth && self.valid_deploy(place, now)
    }
}

/// Candidate Master Secret awaiting an authentication message
#[derive(Clone, Debug)]
pub struct PendingKey {
    master_secret: MasterSecret,
    created: Time,
}

impl PendingKey {
    pub fn master_secret(&self) -> &MasterSecret {
        &self.master_secret
    }

    pub fn created(&self) -> Time {
        self.created
    }
}

#[derive(Debug, Default)]
struct SecurityState {
    pending: Vec<Peer>,
    trusted: Vec<Peer>,
    keys: Vec<PendingKey>,
    /// Send times of DH requests still waiting for a response
    dh_requests_open: Vec<Time>,
}

/// Security counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityStats {
    pub handshakes_completed: u64,
    pub auth_failures: u64,
    pub responses_unpacked: u64,
    pub unpack_failures: u64,
    pub keys_expired: u64,
}

/// Security manager for one node
pub struct Security {
    id: NodeId,
    auth: AuthToken,
    is_sink: bool,
    key_pair: KeyPair,
    cipher: Arc<dyn BlockCipher>,
    config: SecurityConfig,
    state: Mutex<SecurityState>,
    stats: Mutex<SecurityStats>,
}

impl Security {
    pub fn new(id: NodeId, is_sink: bool, config: SecurityConfig) -> Self {
        Self::with_cipher(id, is_sink, config, Arc::new(ChaChaCipher))
    }

    /// Security manager with a specific AUTH_GRANTED cipher
    pub fn with_cipher(
        id: NodeId,
        is_sink: bool,
        config: SecurityConfig,
        cipher: Arc<dyn BlockCipher>,
    ) -> Self {
        tracing::info!(node = %id, is_sink, "Security initialized");
        Security {
            id,
            auth: auth_token(&id),
            is_sink,
            key_pair: KeyPair::generate(),
            cipher,
            config,
            state: Mutex::new(SecurityState::default()),
            stats: Mutex::new(SecurityStats::default()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn auth(&self) -> AuthToken {
        self.auth
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn stats(&self) -> SecurityStats {
        self.stats.lock().clone()
    }

    /// Provision a peer. It starts pending; a known id gets its window
    /// replaced.
    pub fn add_peer(&self, id: NodeId, valid: Region) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let existing = state
            .pending
            .iter_mut()
            .chain(state.trusted.iter_mut())
            .find(|p| p.id == id);
        match existing {
            Some(peer) => peer.valid = valid,
            None => state.pending.push(Peer::new(id, valid)),
        }
        tracing::info!(peer = %id, ?valid, "Peer provisioned");
    }

    pub fn is_trusted(&self, id: &NodeId) -> bool {
        self.state.lock().trusted.iter().any(|p| p.id == *id)
    }

    pub fn is_pending(&self, id: &NodeId) -> bool {
        self.state.lock().pending.iter().any(|p| p.id == *id)
    }

    pub fn trusted_peers(&self) -> Vec<Peer> {
        self.state.lock().trusted.clone()
    }

    pub fn pending_peers(&self) -> Vec<Peer> {
        self.state.lock().pending.clone()
    }

    pub fn pending_keys(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn dh_requests_open(&self) -> usize {
        self.state.lock().dh_requests_open.len()
    }

    /// Master Secret shared with a trusted peer
    pub fn master_secret(&self, id: &NodeId) -> Option<MasterSecret> {
        self.state
            .lock()
            .trusted
            .iter()
            .find(|p| p.id == *id)
            .and_then(|p| p.master_secret.clone())
    }

    /// One DH_REQUEST per pending peer, addressed to its deployment
    pub fn request_trust(&self, now: Time) -> Vec<Body> {
        let public_key = self.key_pair.public_key();
        let mut state = self.state.lock();
        let requests: Vec<Body> = state
            .pending
            .iter()
            .map(|peer| {
                Body::Control(Control::DhRequest {
                    destination: peer.valid.sphere(),
                    public_key,
                })
            })
            .collect();
        state
            .dh_requests_open
            .extend(std::iter::repeat(now).take(requests.len()));
        tracing::debug!(count = requests.len(), "Requesting trust");
        requests
    }

    /// Drop pending keys and open DH requests older than `timeout_us`
    pub fn expire(&self, now: Time, timeout_us: u64) -> usize {
        let fresh = |created: Time| created.saturating_add(timeout_us) >= now;
        let mut state = self.state.lock();
        let before = state.keys.len() + state.dh_requests_open.len();
        state.keys.retain(|k| fresh(k.created));
        state.dh_requests_open.retain(|t| fresh(*t));
        let expired = before - state.keys.len() - state.dh_requests_open.len();
        drop(state);
        if expired > 0 {
            self.stats.lock().keys_expired += expired as u64;
            tracing::debug!(expired, "Abandoned handshakes expired");
        }
        expired
    }

    /// Process a received frame destined to this node. Returns the
    /// control bodies to send in reply.
    pub fn update(&self, meta: &mut BufferMeta, packet: &mut Packet, now: Time) -> Vec<Body> {
        if meta.is_microframe || !meta.destined_to_me {
            return Vec::new();
        }
        let origin = packet.header.origin.space;

        match &packet.body {
            Body::Control(control) => match control {
                Control::DhRequest { public_key, .. } => {
                    if self.is_sink {
                        return Vec::new();
                    }
                    self.dh_request(public_key, &origin, now)
                }
                Control::DhResponse { public_key } => {
                    self.dh_response(public_key, &origin, now);
                    Vec::new()
                }
                Control::AuthRequest { auth, otp } => self
                    .auth_request(auth, otp, &origin, now)
                    .into_iter()
                    .collect(),
                Control::AuthGranted { auth, .. } => {
                    if !self.is_sink {
                        self.auth_granted(auth, &origin, now);
                    }
                    Vec::new()
                }
                Control::Report { auth } => {
                    meta.trusted = self.report(auth, &origin, now);
                    Vec::new()
                }
                Control::KeepAlive | Control::Epoch { .. } | Control::Other { .. } => {
                    meta.trusted = true;
                    Vec::new()
                }
            },
            Body::Response(_) => {
                meta.trusted = self.unpack_response(packet, now);
                Vec::new()
            }
            Body::Interest(_) | Body::Command(_) => {
                meta.trusted = true;
                Vec::new()
            }
        }
    }

    fn dh_request(&self, public_key: &PublicKeyBytes, origin: &Space, now: Time) -> Vec<Body> {
        let mut state = self.state.lock();
        let mut valid_peer = state.pending.iter().any(|p| p.valid_deploy(origin, now));
        if !valid_peer {
            // Re-keying demotes a trusted peer
            if let Some(pos) = state.trusted.iter().position(|p| p.valid_deploy(origin, now)) {
                let peer = state.trusted.remove(pos);
                tracing::info!(peer = %peer.id, "Re-keying trusted peer");
                state.pending.push(peer);
                valid_peer = true;
            }
        }
        if !valid_peer {
            tracing::warn!(?origin, "DH request from outside any peer deployment");
            return Vec::new();
        }

        let master_secret = match self.key_pair.master_secret(public_key) {
            Ok(ms) => ms,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding DH request");
                return Vec::new();
            }
        };
        let proof = match otp(&master_secret, &self.id) {
            Ok(proof) => proof,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot derive OTP");
                return Vec::new();
            }
        };
        state.keys.push(PendingKey {
            master_secret,
            created: now,
        });
        tracing::info!("DH request accepted, sending DH response and auth request");

        vec![
            Body::Control(Control::DhResponse {
                public_key: self.key_pair.public_key(),
            }),
            Body::Control(Control::AuthRequest {
                auth: self.auth,
                otp: proof,
            }),
        ]
    }

    fn dh_response(&self, public_key: &PublicKeyBytes, origin: &Space, now: Time) {
        let mut state = self.state.lock();
        if state.dh_requests_open.is_empty() {
            tracing::debug!("Unsolicited DH response");
            return;
        }
        if !state.pending.iter().any(|p| p.valid_deploy(origin, now)) {
            tracing::warn!(?origin, "DH response from outside any pending peer deployment");
            return;
        }
        match self.key_pair.master_secret(public_key) {
            Ok(master_secret) => {
                state.dh_requests_open.remove(0);
                state.keys.push(PendingKey {
                    master_secret,
                    created: now,
                });
                tracing::info!(keys = state.keys.len(), "Inserted pending key");
            }
            Err(e) => tracing::warn!(error = %e, "Discarding DH response"),
        }
    }

    fn auth_request(
        &self,
        auth: &AuthToken,
        proof: &Otp,
        origin: &Space,
        now: Time,
    ) -> Option<Body> {
        let mut state = self.state.lock();
        let mut matched = None;
        'peers: for (p, peer) in state.pending.iter().enumerate() {
            if !peer.valid_request(auth, origin, now) {
                continue;
            }
            for (k, key) in state.keys.iter().enumerate() {
                if verify_otp(&key.master_secret, &peer.id, proof) {
                    matched = Some((p, k));
                    break 'peers;
                }
            }
        }

        let Some((p, k)) = matched else {
            drop(state);
            self.stats.lock().auth_failures += 1;
            tracing::warn!("No peer found");
            return None;
        };

        let key = state.keys.remove(k);
        let mut peer = state.pending.remove(p);
        let sealed = otp(&key.master_secret, &peer.id)
            .and_then(|pad| self.cipher.encrypt(&pad, &peer.auth));
        peer.master_secret = Some(key.master_secret);
        let destination = peer.valid.sphere();
        tracing::info!(peer = %peer.id, "Peer trusted");
        state.trusted.push(peer);
        drop(state);
        self.stats.lock().handshakes_completed += 1;

        match sealed {
            Ok(auth) => Some(Body::Control(Control::AuthGranted { destination, auth })),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot seal auth token");
                None
            }
        }
    }

    fn auth_granted(&self, sealed: &EncryptedAuth, origin: &Space, now: Time) {
        let mut state = self.state.lock();
        let mut matched = None;
        'peers: for (p, peer) in state.pending.iter().enumerate() {
            if !peer.valid_deploy(origin, now) {
                continue;
            }
            for (k, key) in state.keys.iter().enumerate() {
                let Ok(pad) = otp(&key.master_secret, &self.id) else {
                    continue;
                };
                if matches!(self.cipher.decrypt(&pad, sealed), Ok(token) if token == self.auth) {
                    matched = Some((p, k));
                    break 'peers;
                }
            }
        }

        let Some((p, k)) = matched else {
            drop(state);
            self.stats.lock().auth_failures += 1;
            tracing::warn!("No pending key opens auth granted");
            return;
        };

        let key = state.keys.remove(k);
        let mut peer = state.pending.remove(p);
        peer.master_secret = Some(key.master_secret);
        tracing::info!(peer = %peer.id, "Trust granted by peer");
        state.trusted.push(peer);
        drop(state);
        self.stats.lock().handshakes_completed += 1;
    }

    fn report(&self, auth: &AuthToken, origin: &Space, now: Time) -> bool {
        let state = self.state.lock();
        match state.trusted.iter().find(|p| p.valid_request(auth, origin, now)) {
            Some(peer) => {
                tracing::info!(peer = %peer.id, ?origin, "Report from trusted peer");
                true
            }
            None => {
                tracing::warn!(?origin, "Report from unknown node");
                false
            }
        }
    }

    /// Open a sealed Response in place. Plain Responses stay untrusted.
    fn unpack_response(&self, packet: &mut Packet, now: Time) -> bool {
        let value_len = packet.header.unit.value_size();
        let Body::Response(response) = &packet.body else {
            return false;
        };
        if value_len == 0 || response.value.len() != sealed_len(value_len) {
            tracing::debug!("Plain response");
            return false;
        }
        let Ok(aad) = packet.header.invariant_bytes() else {
            return false;
        };
        let origin = packet.header.origin;
        let device = packet.header.device;

        let opened = {
            let state = self.state.lock();
            let mut opened = None;
            for peer in state.trusted.iter().filter(|p| p.valid_deploy(&origin.space, now)) {
                let Some(ms) = &peer.master_secret else {
                    continue;
                };
                match unpack(ms, &aad, origin.time, device, &response.value, value_len) {
                    Ok(value) => {
                        opened = Some(value);
                        break;
                    }
                    Err(_) => tracing::warn!(peer = %peer.id, "Unpack failed"),
                }
            }
            opened
        };

        let mut stats = self.stats.lock();
        match opened {
            Some(value) => {
                stats.responses_unpacked += 1;
                if let Body::Response(response) = &mut packet.body {
                    response.value = value;
                }
                true
            }
            None => {
                stats.unpack_failures += 1;
                false
            }
        }
    }

    /// Seal an outgoing Response for the trusted peer covering its
    /// destination. Other messages pass through trusted.
    pub fn marshal(
        &self,
        meta: &mut BufferMeta,
        packet: &mut Packet,
        destination: &Region,
        now: Time,
    ) -> TstpResult<()> {
        let aad = packet.header.invariant_bytes()?;
        let origin = packet.header.origin.time;
        let device = packet.header.device;
        let Body::Response(response) = &mut packet.body else {
            meta.trusted = true;
            return Ok(());
        };

        let master_secret = self
            .state
            .lock()
            .trusted
            .iter()
            .find(|p| p.valid_deploy(&destination.center, now))
            .and_then(|p| p.master_secret.clone());
        let Some(ms) = master_secret else {
            tracing::debug!("No trusted peer at the destination, sending plain response");
            return Ok(());
        };

        response.value = pack(&ms, &aad, origin, device, &response.value)?;
        meta.trusted = true;
        Ok(())
    }
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Security")
            .field("id", &self.id)
            .field("is_sink", &self.is_sink)
            .field("pending", &state.pending.len())
            .field("trusted", &state.trusted.len())
            .field("keys", &state.keys.len())
            .finish()
    }
}
