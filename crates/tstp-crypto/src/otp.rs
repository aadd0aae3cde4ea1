//! One-time pads and authentication tokens

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use tstp_core::{AuthToken, NodeId, Otp, TstpError, TstpResult, AUTH_SIZE, OTP_SIZE};

use crate::MasterSecret;

/// OTP proving possession of `master` by the node `id`
pub fn otp(master: &MasterSecret, id: &NodeId) -> TstpResult<Otp> {
    let hkdf = Hkdf::<Sha256>::new(Some(id.as_bytes()), master.as_bytes());
    let mut pad = [0u8; OTP_SIZE];
    hkdf.expand(b"TSTP_OTP_v0", &mut pad)
        .map_err(|_| TstpError::KeyDerivation)?;
    Ok(Otp(pad))
}

/// Check a received OTP against a candidate Master Secret
pub fn verify_otp(master: &MasterSecret, id: &NodeId, candidate: &Otp) -> bool {
    match otp(master, id) {
        Ok(expected) => {
            // Compare every byte regardless of where the first mismatch is
            expected
                .as_bytes()
                .iter()
                .zip(candidate.as_bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
        }
        Err(_) => false,
    }
}

/// Authentication token of a node. Both sides of a handshake derive it
/// from the provisioned node id.
pub fn auth_token(id: &NodeId) -> AuthToken {
    let mut hasher = Sha256::new();
    hasher.update(b"TSTP_AUTH_v0");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    let mut token = [0u8; AUTH_SIZE];
    token.copy_from_slice(&digest[..AUTH_SIZE]);
    AuthToken(token)
}
