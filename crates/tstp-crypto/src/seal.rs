//! Response payload protection
//!
//! A Response value is zero-padded to a multiple of the Master Secret
//! size, then sealed with ChaCha20-Poly1305 under a key derived from the
//! Master Secret and the message's origin time. The hop-invariant header
//! bytes are authenticated as associated data.

use hkdf::Hkdf;
use sha2::Sha256;

use tstp_core::{DeviceId, Time, TstpError, TstpResult};

use crate::{AeadCipher, MasterSecret, KEY_SIZE, MASTER_SECRET_SIZE, NONCE_SIZE, TAG_SIZE};

/// Padded length for a plaintext value
pub fn padded_len(value_len: usize) -> usize {
    value_len.max(1).div_ceil(MASTER_SECRET_SIZE) * MASTER_SECRET_SIZE
}

/// Sealed length for a plaintext value
pub fn sealed_len(value_len: usize) -> usize {
    padded_len(value_len) + TAG_SIZE
}

fn message_key(master: &MasterSecret, origin: Time) -> TstpResult<AeadCipher> {
    let hkdf = Hkdf::<Sha256>::new(Some(&origin.to_bytes()), master.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(b"TSTP_RESPONSE_KEY_v0", &mut key)
        .map_err(|_| TstpError::KeyDerivation)?;
    Ok(AeadCipher::new(&key))
}

/// Nonce unique per (origin time, device) of one sender
pub fn derive_nonce(origin: Time, device: DeviceId) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..8].copy_from_slice(&origin.to_bytes());
    nonce[8..12].copy_from_slice(&device.to_bytes());
    nonce
}

/// Pad and seal a Response value
pub fn pack(
    master: &MasterSecret,
    aad: &[u8],
    origin: Time,
    device: DeviceId,
    value: &[u8],
) -> TstpResult<Vec<u8>> {
    let mut padded = value.to_vec();
    padded.resize(padded_len(value.len()), 0);
    message_key(master, origin)?.encrypt(&derive_nonce(origin, device), aad, &padded)
}

/// Open a sealed Response value and strip the padding down to `value_len`
pub fn unpack(
    master: &MasterSecret,
    aad: &[u8],
    origin: Time,
    device: DeviceId,
    sealed: &[u8],
    value_len: usize,
) -> TstpResult<Vec<u8>> {
    if sealed.len() != sealed_len(value_len) {
        return Err(TstpError::DecryptionFailed);
    }
    let mut plain =
        message_key(master, origin)?.decrypt(&derive_nonce(origin, device), aad, sealed)?;
    plain.truncate(value_len);
    Ok(plain)
}
