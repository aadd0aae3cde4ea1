//! Fixed-size key material carried by handshake messages

use std::fmt;

/// X25519 public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Authentication token size (one cipher block)
pub const AUTH_SIZE: usize = 16;

/// One-time pad size
pub const OTP_SIZE: usize = 16;

/// Encrypted authentication token: one block plus a 16-byte tag
pub const ENCRYPTED_AUTH_SIZE: usize = AUTH_SIZE + 16;

macro_rules! key_bytes {
    ($(#[$meta:meta])* $name:ident, $size:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            #[inline]
            pub fn to_bytes(self) -> [u8; $size] {
                self.0
            }

            #[inline]
            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name([0u8; $size])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!($label, "({:02x}{:02x}{:02x}{:02x}..)"),
                    self.0[0],
                    self.0[1],
                    self.0[2],
                    self.0[3]
                )
            }
        }
    };
}

key_bytes!(
    /// Diffie-Hellman public key as sent on the wire
    PublicKeyBytes,
    PUBLIC_KEY_SIZE,
    "PublicKey"
);

key_bytes!(
    /// Node authentication token, derived from the node id
    AuthToken,
    AUTH_SIZE,
    "Auth"
);

key_bytes!(
    /// Proof of Master Secret possession bound to a node id
    Otp,
    OTP_SIZE,
    "Otp"
);

key_bytes!(
    /// Authentication token sealed under an OTP-derived key
    EncryptedAuth,
    ENCRYPTED_AUTH_SIZE,
    "EncryptedAuth"
);
