//! X25519 key agreement

use std::fmt;

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use tstp_core::{PublicKeyBytes, TstpError, TstpResult};

/// Master Secret size; Response payloads are padded to it
pub const MASTER_SECRET_SIZE: usize = 32;

/// Shared secret agreed with one peer
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret(pub(crate) [u8; MASTER_SECRET_SIZE]);

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        MasterSecret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret(..)")
    }
}

/// Node's Diffie-Hellman key pair. Reused across handshakes.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        KeyPair { secret, public }
    }

    /// Key pair from stored secret bytes
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        KeyPair { secret, public }
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.public.to_bytes())
    }

    /// Master Secret shared with the owner of `peer`
    pub fn master_secret(&self, peer: &PublicKeyBytes) -> TstpResult<MasterSecret> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            tracing::warn!("Rejecting low-order Diffie-Hellman public key");
            return Err(TstpError::KeyDerivation);
        }

        let hkdf = Hkdf::<Sha256>::new(Some(b"TSTP_DH_v0"), shared.as_bytes());
        let mut ms = [0u8; MASTER_SECRET_SIZE];
        hkdf.expand(b"TSTP_MASTER_SECRET", &mut ms)
            .map_err(|_| TstpError::KeyDerivation)?;
        Ok(MasterSecret(ms))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}
