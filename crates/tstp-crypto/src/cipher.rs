//! Ciphers: the AEAD wrapper and the block-cipher seam used by the
//! handshake

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

use tstp_core::{AuthToken, EncryptedAuth, Otp, TstpError, TstpResult, AUTH_SIZE};

/// Key size for ChaCha20-Poly1305
pub const KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305
pub const NONCE_SIZE: usize = 12;

/// Tag size for ChaCha20-Poly1305
pub const TAG_SIZE: usize = 16;

/// AEAD cipher wrapper
pub struct AeadCipher {
    cipher: ChaCha20Poly1305,
}

impl AeadCipher {
    /// Create a new cipher from key bytes
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        AeadCipher {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Encrypt plaintext with associated data
    /// Returns ciphertext with appended auth tag
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> TstpResult<Vec<u8>> {
        self.cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| TstpError::DecryptionFailed)
    }

    /// Decrypt ciphertext with associated data
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> TstpResult<Vec<u8>> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| TstpError::DecryptionFailed)
    }
}

/// Cipher used to seal the authentication token in AUTH_GRANTED.
///
/// The key is the OTP both sides derive from the fresh Master Secret.
/// Decryption under the wrong key must fail or yield a different token.
pub trait BlockCipher: Send + Sync {
    fn encrypt(&self, key: &Otp, token: &AuthToken) -> TstpResult<EncryptedAuth>;

    fn decrypt(&self, key: &Otp, sealed: &EncryptedAuth) -> TstpResult<AuthToken>;
}

/// ChaCha20-Poly1305 keyed by HKDF(OTP). Each OTP seals a single token,
/// so a fixed nonce is safe.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChaChaCipher;

impl ChaChaCipher {
    fn cipher(key: &Otp) -> TstpResult<AeadCipher> {
        let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut k = [0u8; KEY_SIZE];
        hkdf.expand(b"TSTP_AUTH_KEY_v0", &mut k)
            .map_err(|_| TstpError::KeyDerivation)?;
        Ok(AeadCipher::new(&k))
    }
}

impl BlockCipher for ChaChaCipher {
    fn encrypt(&self, key: &Otp, token: &AuthToken) -> TstpResult<EncryptedAuth> {
        let sealed =
            Self::cipher(key)?.encrypt(&[0u8; NONCE_SIZE], b"AUTH_GRANTED", token.as_bytes())?;
        let bytes = sealed
            .try_into()
            .map_err(|_| TstpError::InvalidWireFormat("unexpected sealed token size".into()))?;
        Ok(EncryptedAuth(bytes))
    }

    fn decrypt(&self, key: &Otp, sealed: &EncryptedAuth) -> TstpResult<AuthToken> {
        let plain =
            Self::cipher(key)?.decrypt(&[0u8; NONCE_SIZE], b"AUTH_GRANTED", sealed.as_bytes())?;
        let bytes: [u8; AUTH_SIZE] = plain
            .try_into()
            .map_err(|_| TstpError::DecryptionFailed)?;
        Ok(AuthToken(bytes))
    }
}
