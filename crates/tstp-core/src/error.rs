//! Error types for TSTP

use thiserror::Error;

/// Core TSTP errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TstpError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Coordinate {value} out of range for scale {scale}")]
    CoordinateOutOfRange { value: i64, scale: &'static str },

    #[error("Invalid region: t0 {t0} after t1 {t1}")]
    InvalidRegion { t0: u64, t1: u64 },

    #[error("Packet too large: {size} bytes, MTU is {mtu}")]
    PacketTooLarge { size: usize, mtu: usize },

    #[error("CRC mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    // Crypto errors
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Key derivation failed")]
    KeyDerivation,

    // Startup errors
    #[error("Time synchronization not reached after {attempts} attempts")]
    SyncTimeout { attempts: u32 },

    #[error("Location confidence {confidence}% below {required}% after {attempts} attempts")]
    LocalizationTimeout {
        confidence: u8,
        required: u8,
        attempts: u32,
    },

    // Radio errors
    #[error("Radio buffer allocation failed ({0} bytes)")]
    AllocationFailed(usize),

    #[error("Transport error: {0}")]
    TransportError(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No protocol instance for radio unit {0}")]
    NoSuchRadio(usize),
}

/// Result type for TSTP operations
pub type TstpResult<T> = Result<T, TstpError>;
