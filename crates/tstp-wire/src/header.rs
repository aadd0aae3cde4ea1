//! TSTP header
//!
//! Header layout (S = encoded `Space` size for the header's scale):
//! - Byte 0: config = scale (2 bits) | time request (1) | type (2) | version (3)
//! - Byte 1: subtype (Control) or precision (Interest)
//! - Byte 2: mode (Interest, Command) or error (Response)
//! - Byte 3: location confidence (percent)
//! - Origin: Space (S bytes) + Time (8 bytes)
//! - Unit (4 bytes)
//! - Device id (4 bytes)
//! - Last hop: Space (S bytes) + Time (8 bytes)
//!
//! The scale travels in the first byte, so a receiver learns the
//! coordinate width before it reaches the first coordinate.

use bytes::BufMut;
use tstp_core::{
    DeviceId, MessageType, PacketId, Scale, Spacetime, TstpError, TstpResult, Unit, VERSION_V0,
};

use crate::codec::{put_space, Reader};

const TIME_REQUEST_BIT: u8 = 1 << 5;

/// Header size for a given scale
#[inline]
pub const fn header_size(scale: Scale) -> usize {
    let space = match scale {
        Scale::CmX50_8 => 4,
        Scale::Cm16 | Scale::CmX25_16 => 8,
        Scale::Cm32 => 12,
    };
    4 + 2 * (space + 8) + 4 + 4
}

/// Header present in every packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Protocol version (3 bits)
    pub version: u8,
    /// Coordinate scale
    pub scale: Scale,
    /// Sender still needs a time fix
    pub time_request: bool,
    /// Message type
    pub message_type: MessageType,
    /// Control subtype or Interest precision
    pub subtype: u8,
    /// Mode, or error for Responses
    pub mode: u8,
    /// Sender's location confidence (percent)
    pub location_confidence: u8,
    /// Where and when the message was created
    pub origin: Spacetime,
    /// Payload unit
    pub unit: Unit,
    /// Device selector
    pub device: DeviceId,
    /// Rewritten on every hop
    pub last_hop: Spacetime,
}

impl Header {
    /// Create a header with origin and last hop set to `origin`
    pub fn new(message_type: MessageType, scale: Scale, origin: Spacetime) -> Self {
        Header {
            version: VERSION_V0,
            scale,
            time_request: false,
            message_type,
            subtype: 0,
            mode: 0,
            location_confidence: 0,
            origin,
            unit: Unit::default(),
            device: DeviceId::ZERO,
            last_hop: origin,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        header_size(self.scale)
    }

    #[inline]
    fn config(&self) -> u8 {
        (self.scale.to_bits() << 6)
            | if self.time_request { TIME_REQUEST_BIT } else { 0 }
            | (self.message_type.to_bits() << 3)
            | (self.version & 0x07)
    }

    /// Parse header from the start of `buf`
    pub fn parse(buf: &[u8]) -> TstpResult<Self> {
        let mut r = Reader::new(buf);
        Self::read(&mut r)
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> TstpResult<Self> {
        // Byte 0: config
        let config = r.u8()?;
        let version = config & 0x07;
        if version != VERSION_V0 {
            return Err(TstpError::UnsupportedVersion(version));
        }
        let scale = Scale::from_bits(config >> 6);
        let time_request = config & TIME_REQUEST_BIT != 0;
        let message_type = MessageType::from_bits(config >> 3);

        // Bytes 1-3: subtype, mode, confidence
        let subtype = r.u8()?;
        let mode = r.u8()?;
        let location_confidence = r.u8()?;

        let origin = Spacetime::new(r.space(scale)?, r.time()?);
        let unit = Unit(r.u32()?);
        let device = DeviceId(r.u32()?);
        let last_hop = Spacetime::new(r.space(scale)?, r.time()?);

        Ok(Header {
            version,
            scale,
            time_request,
            message_type,
            subtype,
            mode,
            location_confidence,
            origin,
            unit,
            device,
            last_hop,
        })
    }

    /// Serialize header into `out`
    pub fn write(&self, out: &mut impl BufMut) -> TstpResult<()> {
        out.put_u8(self.config());
        out.put_u8(self.subtype);
        out.put_u8(self.mode);
        out.put_u8(self.location_confidence);
        put_space(out, &self.origin.space, self.scale)?;
        out.put_u64_le(self.origin.time.0);
        out.put_u32_le(self.unit.0);
        out.put_u32_le(self.device.0);
        put_space(out, &self.last_hop.space, self.scale)?;
        out.put_u64_le(self.last_hop.time.0);
        Ok(())
    }

    /// Serialize header to a new Vec
    pub fn to_bytes(&self) -> TstpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size());
        self.write(&mut out)?;
        Ok(out)
    }

    /// Bytes that no forwarding hop may change: config without the time
    /// request bit, subtype, mode, origin, unit and device. Confidence is
    /// zeroed in place to keep the length even.
    pub fn invariant_bytes(&self) -> TstpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size());
        out.put_u8(self.config() & !TIME_REQUEST_BIT);
        out.put_u8(self.subtype);
        out.put_u8(self.mode);
        out.put_u8(0);
        put_space(&mut out, &self.origin.space, self.scale)?;
        out.put_u64_le(self.origin.time.0);
        out.put_u32_le(self.unit.0);
        out.put_u32_le(self.device.0);
        Ok(out)
    }

    /// XOR fold of the invariant 16-bit words
    pub fn packet_id(&self) -> TstpResult<PacketId> {
        let bytes = self.invariant_bytes()?;
        let id = bytes
            .chunks(2)
            .map(|w| u16::from_le_bytes([w[0], *w.get(1).unwrap_or(&0)]))
            .fold(0u16, |acc, w| acc ^ w);
        Ok(PacketId(id))
    }

    /// Restamp for transmission from this hop
    pub fn stamp_last_hop(&mut self, last_hop: Spacetime) {
        self.last_hop = last_hop;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tstp_core::{Space, Time};

    fn sample(scale: Scale) -> Header {
        Header {
            version: VERSION_V0,
            scale,
            time_request: true,
            message_type: MessageType::Control,
            subtype: 6,
            mode: 2,
            location_confidence: 93,
            origin: Spacetime::new(Space::new(-12, 34, 5), Time(123_456_789)),
            unit: Unit::TEMPERATURE,
            device: DeviceId(0xDEAD_BEEF),
            last_hop: Spacetime::new(Space::new(100, -100, 0), Time(123_999_000)),
        }
    }

    #[test]
    fn test_header_roundtrip_all_scales() {
        for scale in [Scale::CmX50_8, Scale::Cm16, Scale::CmX25_16, Scale::Cm32] {
            let header = sample(scale);
            let bytes = header.to_bytes().unwrap();
            assert_eq!(bytes.len(), header_size(scale));
            assert_eq!(Header::parse(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn test_config_byte_layout() {
        let header = sample(Scale::Cm32);
        let bytes = header.to_bytes().unwrap();
        // scale=3, tr=1, type=3, version=4
        assert_eq!(bytes[0], 0b11_1_11_100);
        assert_eq!(bytes[1], 6);
        assert_eq!(bytes[2], 2);
        assert_eq!(bytes[3], 93);
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(header_size(Scale::CmX50_8), 36);
        assert_eq!(header_size(Scale::Cm16), 44);
        assert_eq!(header_size(Scale::Cm32), 52);
    }

    #[test]
    fn test_packet_id_ignores_hop_fields() {
        let a = sample(Scale::Cm16);
        let mut b = a.clone();
        b.last_hop = Spacetime::new(Space::new(1, 1, 1), Time(1));
        b.location_confidence = 10;
        b.time_request = false;
        assert_eq!(a.packet_id().unwrap(), b.packet_id().unwrap());

        let mut c = a.clone();
        c.origin.time = Time(123_456_790);
        assert_ne!(a.packet_id().unwrap(), c.packet_id().unwrap());
    }

    #[test]
    fn test_header_too_short() {
        let bytes = sample(Scale::Cm16).to_bytes().unwrap();
        let result = Header::parse(&bytes[..20]);
        assert!(matches!(result, Err(TstpError::BufferTooShort { .. })));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = sample(Scale::Cm16).to_bytes().unwrap();
        bytes[0] &= !0x07;
        assert!(matches!(Header::parse(&bytes), Err(TstpError::UnsupportedVersion(0))));
    }
}
