//! Unit descriptor for payload semantics (IEEE 1451 TEDS style)
//!
//! ```text
//! Bit       31                                 16                                     0
//!         +--+----------------------------------+-------------------------------------+
//! Digital |0 | type                             | len                                 |
//!         +--+----------------------------------+-------------------------------------+
//!
//! Bit       31   29   27     24     21     18     15     12      9      6      3      0
//!         +--+----+----+------+------+------+------+------+------+------+------+------+
//! SI      |1 |NUM |MOD |sr+4  |rad+4 |m+4   |kg+4  |s+4   |A+4   |K+4   |mol+4 |cd+4  |
//!         +--+----+----+------+------+------+------+------+------+------+------+------+
//! ```

use std::fmt;

/// Payload unit descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Unit(pub u32);

/// Numeric representation of an SI value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericKind {
    I32,
    I64,
    F32,
    D64,
}

impl Unit {
    pub const SI: u32 = 1 << 31;
    pub const DIGITAL: u32 = 0;

    pub const I32: u32 = 0 << 29;
    pub const I64: u32 = 1 << 29;
    pub const F32: u32 = 2 << 29;
    pub const D64: u32 = 3 << 29;
    pub const NUM: u32 = 3 << 29;

    pub const LEN: u32 = (1 << 16) - 1;

    /// Length in meters, 32-bit float
    pub const LENGTH: Unit = Unit::si(Self::F32, [0, 0, 1, 0, 0, 0, 0, 0, 0]);
    /// Temperature in kelvin, 32-bit float
    pub const TEMPERATURE: Unit = Unit::si(Self::F32, [0, 0, 0, 0, 0, 0, 1, 0, 0]);
    /// Acceleration (m/s^2), 32-bit float
    pub const ACCELERATION: Unit = Unit::si(Self::F32, [0, 0, 1, 0, -2, 0, 0, 0, 0]);
    /// Electric current in amperes, 64-bit float
    pub const CURRENT: Unit = Unit::si(Self::D64, [0, 0, 0, 0, 0, 1, 0, 0, 0]);
    /// Dimensionless counter, 32-bit integer
    pub const COUNTER: Unit = Unit::si(Self::I32, [0; 9]);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Unit(raw)
    }

    /// SI unit from base-unit exponents `[sr, rad, m, kg, s, A, K, mol, cd]`,
    /// each in -4..=3.
    pub const fn si(num: u32, exp: [i8; 9]) -> Self {
        let mut raw = Self::SI | num;
        let mut i = 0;
        while i < 9 {
            let shift = 24 - 3 * i as u32;
            raw |= (((exp[i] + 4) as u32) & 7) << shift;
            i += 1;
        }
        Unit(raw)
    }

    /// Digital unit of `len` bytes.
    pub const fn digital(kind: u16, len: u16) -> Self {
        Unit((((kind as u32) & 0x7FFF) << 16) | len as u32)
    }

    #[inline]
    pub fn is_si(self) -> bool {
        self.0 & Self::SI != 0
    }

    #[inline]
    pub fn numeric_kind(self) -> Option<NumericKind> {
        if !self.is_si() {
            return None;
        }
        Some(match self.0 & Self::NUM {
            Self::I32 => NumericKind::I32,
            Self::I64 => NumericKind::I64,
            Self::F32 => NumericKind::F32,
            _ => NumericKind::D64,
        })
    }

    /// Size in bytes of a value carried under this unit.
    pub fn value_size(self) -> usize {
        match self.numeric_kind() {
            Some(NumericKind::I32) | Some(NumericKind::F32) => 4,
            Some(NumericKind::I64) | Some(NumericKind::D64) => 8,
            None => (self.0 & Self::LEN) as usize,
        }
    }

    /// Decode a little-endian value under this unit as f64.
    pub fn value_as_f64(self, bytes: &[u8]) -> Option<f64> {
        let kind = self.numeric_kind()?;
        Some(match kind {
            NumericKind::I32 => i32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as f64,
            NumericKind::I64 => i64::from_le_bytes(bytes.get(..8)?.try_into().ok()?) as f64,
            NumericKind::F32 => f32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as f64,
            NumericKind::D64 => f64::from_le_bytes(bytes.get(..8)?.try_into().ok()?),
        })
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Unit(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.numeric_kind() {
            Some(kind) => write!(f, "Unit(SI {:?} {:08x})", kind, self.0),
            None => write!(f, "Unit(digital len={})", self.0 & Self::LEN),
        }
    }
}
