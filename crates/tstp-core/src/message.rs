//! Message types, control subtypes and coordinate scales

use serde::{Deserialize, Serialize};

use crate::{TstpError, TstpResult};

/// Protocol version carried in the low 3 bits of the config byte
pub const VERSION_V0: u8 = 4;

/// Top-level message type (2 bits on the wire)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Interest = 0,
    Response = 1,
    Command = 2,
    Control = 3,
}

impl MessageType {
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Interest,
            1 => MessageType::Response,
            2 => MessageType::Command,
            _ => MessageType::Control,
        }
    }

    #[inline]
    pub fn to_bits(self) -> u8 {
        self as u8
    }
}

/// Control message subtype
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlSubtype {
    DhRequest,
    DhResponse,
    AuthRequest,
    AuthGranted,
    Report,
    KeepAlive,
    Epoch,
    /// Any code without a dedicated body (model updates, future subtypes)
    Other(u8),
}

impl ControlSubtype {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => ControlSubtype::DhRequest,
            2 => ControlSubtype::DhResponse,
            3 => ControlSubtype::AuthRequest,
            4 => ControlSubtype::AuthGranted,
            5 => ControlSubtype::Report,
            6 => ControlSubtype::KeepAlive,
            7 => ControlSubtype::Epoch,
            other => ControlSubtype::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ControlSubtype::DhRequest => 1,
            ControlSubtype::DhResponse => 2,
            ControlSubtype::AuthRequest => 3,
            ControlSubtype::AuthGranted => 4,
            ControlSubtype::Report => 5,
            ControlSubtype::KeepAlive => 6,
            ControlSubtype::Epoch => 7,
            ControlSubtype::Other(b) => b,
        }
    }
}

/// Model update subtype; carried opaquely
pub const SUBTYPE_MODEL: u8 = 8;

/// Interest modes
pub mod interest_mode {
    pub const SINGLE: u8 = 0;
    pub const ALL: u8 = 1;
    pub const DELETE: u8 = 2;
}

/// Response modes
pub mod response_mode {
    pub const PRIVATE: u8 = 0;
    pub const ADVERTISED: u8 = 1;
    pub const COMMANDED: u8 = 2;
}

/// Coordinate scale: how many bits each local coordinate takes on the
/// wire, and how many centimeters one coordinate unit stands for.
/// Coordinates are carried as is; every node of a network works in the
/// units of the scale it is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scale {
    /// 8-bit coordinates, one unit is 50 cm
    CmX50_8,
    /// 16-bit coordinates, one unit is 1 cm
    #[default]
    Cm16,
    /// 16-bit coordinates, one unit is 25 cm
    CmX25_16,
    /// 32-bit coordinates, one unit is 1 cm
    Cm32,
}

impl Scale {
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Scale::CmX50_8,
            1 => Scale::Cm16,
            2 => Scale::CmX25_16,
            _ => Scale::Cm32,
        }
    }

    #[inline]
    pub fn to_bits(self) -> u8 {
        match self {
            Scale::CmX50_8 => 0,
            Scale::Cm16 => 1,
            Scale::CmX25_16 => 2,
            Scale::Cm32 => 3,
        }
    }

    /// Bytes per coordinate
    #[inline]
    pub fn coordinate_size(self) -> usize {
        match self {
            Scale::CmX50_8 => 1,
            Scale::Cm16 | Scale::CmX25_16 => 2,
            Scale::Cm32 => 4,
        }
    }

    /// Padding after the three coordinates
    #[inline]
    pub fn padding(self) -> usize {
        match self {
            Scale::CmX50_8 => 1,
            Scale::Cm16 | Scale::CmX25_16 => 2,
            Scale::Cm32 => 0,
        }
    }

    /// Encoded size of a `Space` at this scale
    #[inline]
    pub fn space_size(self) -> usize {
        3 * self.coordinate_size() + self.padding()
    }

    /// Centimeters per coordinate unit
    pub fn unit_cm(self) -> u32 {
        match self {
            Scale::CmX50_8 => 50,
            Scale::Cm16 | Scale::Cm32 => 1,
            Scale::CmX25_16 => 25,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::CmX50_8 => "CMx50_8",
            Scale::Cm16 => "CM_16",
            Scale::CmX25_16 => "CMx25_16",
            Scale::Cm32 => "CM_32",
        }
    }

    /// Check that a coordinate fits this scale's word.
    pub fn check(self, value: i32) -> TstpResult<()> {
        let fits = match self.coordinate_size() {
            1 => i8::try_from(value).is_ok(),
            2 => i16::try_from(value).is_ok(),
            _ => true,
        };
        if fits {
            Ok(())
        } else {
            Err(TstpError::CoordinateOutOfRange {
                value: value as i64,
                scale: self.name(),
            })
        }
    }
}
