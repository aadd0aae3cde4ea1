//! Complete packet: header + body + trailer

use bytes::BufMut;
use tstp_core::{DeviceId, MessageType, PacketId, Scale, Spacetime, TstpError, TstpResult, Unit};

use crate::codec::Reader;
use crate::{header_size, Body, Control, Header};

/// IEEE 802.15.4 frame size
pub const LINK_FRAME_SIZE: usize = 127;

/// MAC header and FCS around the payload
pub const LINK_OVERHEAD: usize = 11;

/// Largest encoded packet
pub const MTU: usize = LINK_FRAME_SIZE - LINK_OVERHEAD;

/// Packet id (2) + CRC-32 (4)
pub const TRAILER_SIZE: usize = 6;

/// Packet trailer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trailer {
    pub id: PacketId,
    pub crc: u32,
}

/// Decoded TSTP packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub body: Body,
}

impl Packet {
    /// Create a packet. Type and subtype in the header follow the body.
    pub fn new(mut header: Header, body: Body) -> Self {
        header.message_type = body.message_type();
        if let Body::Control(control) = &body {
            header.subtype = control.subtype().to_byte();
        }
        Packet { header, body }
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    #[inline]
    pub fn control(&self) -> Option<&Control> {
        match &self.body {
            Body::Control(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        matches!(self.control(), Some(Control::KeepAlive))
    }

    pub fn id(&self) -> TstpResult<PacketId> {
        self.header.packet_id()
    }

    pub fn encoded_len(&self) -> usize {
        self.header.size() + self.body.encoded_len(self.header.scale) + TRAILER_SIZE
    }

    /// Serialize, enforcing the MTU
    pub fn encode(&self) -> TstpResult<Vec<u8>> {
        let size = self.encoded_len();
        if size > MTU {
            return Err(TstpError::PacketTooLarge { size, mtu: MTU });
        }

        let mut out = Vec::with_capacity(size);
        self.header.write(&mut out)?;
        self.body.write(&mut out, self.header.scale)?;
        out.put_u16_le(self.id()?.0);
        let crc = crc32fast::hash(&out);
        out.put_u32_le(crc);
        Ok(out)
    }

    /// Parse and verify a packet
    pub fn decode(buf: &[u8]) -> TstpResult<Self> {
        let min = header_size(Scale::CmX50_8) + TRAILER_SIZE;
        if buf.len() < min {
            return Err(TstpError::BufferTooShort {
                expected: min,
                actual: buf.len(),
            });
        }
        if buf.len() > MTU {
            return Err(TstpError::PacketTooLarge {
                size: buf.len(),
                mtu: MTU,
            });
        }

        let (content, crc_bytes) = buf.split_at(buf.len() - 4);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = crc32fast::hash(content);
        if expected != actual {
            return Err(TstpError::CrcMismatch { expected, actual });
        }

        let (frame, id_bytes) = content.split_at(content.len() - 2);
        let mut r = Reader::new(frame);
        let header = Header::read(&mut r)?;
        let body = Body::read(&mut r, header.message_type, header.subtype, header.scale)?;

        let id = PacketId::from_bytes([id_bytes[0], id_bytes[1]]);
        if id != header.packet_id()? {
            return Err(TstpError::InvalidWireFormat(format!(
                "packet id {:?} does not match header",
                id
            )));
        }

        Ok(Packet { header, body })
    }

    /// Trailer that `encode` would append
    pub fn trailer(&self) -> TstpResult<Trailer> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.header.write(&mut out)?;
        self.body.write(&mut out, self.header.scale)?;
        let id = self.id()?;
        out.put_u16_le(id.0);
        Ok(Trailer {
            id,
            crc: crc32fast::hash(&out),
        })
    }

    /// CRC-32 of the encoded body. Relays only rewrite the header, so
    /// every copy of a frame has the same digest.
    pub fn body_digest(&self) -> TstpResult<u32> {
        let mut out = Vec::with_capacity(self.body.encoded_len(self.header.scale));
        self.body.write(&mut out, self.header.scale)?;
        Ok(crc32fast::hash(&out))
    }

    /// Largest value a data message of this shape can carry
    pub fn max_value_len(&self) -> usize {
        let used = self.encoded_len() - self.body.value().map_or(0, |v| v.len());
        MTU.saturating_sub(used)
    }
}

/// Packet builder
pub struct PacketBuilder {
    header: Header,
}

impl PacketBuilder {
    /// Start a packet created at `origin`
    pub fn new(scale: Scale, origin: Spacetime) -> Self {
        PacketBuilder {
            header: Header::new(MessageType::Control, scale, origin),
        }
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.header.unit = unit;
        self
    }

    pub fn device(mut self, device: DeviceId) -> Self {
        self.header.device = device;
        self
    }

    pub fn mode(mut self, mode: u8) -> Self {
        self.header.mode = mode;
        self
    }

    /// Precision for Interests
    pub fn precision(mut self, precision: u8) -> Self {
        self.header.subtype = precision;
        self
    }

    pub fn location_confidence(mut self, confidence: u8) -> Self {
        self.header.location_confidence = confidence;
        self
    }

    pub fn time_request(mut self, required: bool) -> Self {
        self.header.time_request = required;
        self
    }

    pub fn build(self, body: Body) -> Packet {
        Packet::new(self.header, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Interest, Response};
    use tstp_core::*;

    fn origin() -> Spacetime {
        Spacetime::new(Space::new(120, -40, 3), Time(5_000_000))
    }

    fn sphere() -> Sphere {
        Sphere::new(Space::new(-300, 250, 0), 150)
    }

    fn region() -> Region {
        Region::new(Space::new(10, 20, 30), 500, Time(5_000_000), Time(9_000_000))
    }

    fn all_bodies(value: Vec<u8>) -> Vec<Body> {
        vec![
            Body::Interest(Interest {
                region: region(),
                expiry: 1_000,
                period: 250_000,
                value: value.clone(),
            }),
            Body::Response(Response {
                confidence: 88,
                expiry: 2_000_000,
                value: value.clone(),
            }),
            Body::Command(Command {
                region: region(),
                expiry: 30,
                period: 0,
                value,
            }),
            Body::Control(Control::DhRequest {
                destination: sphere(),
                public_key: PublicKeyBytes([7; 32]),
            }),
            Body::Control(Control::DhResponse {
                public_key: PublicKeyBytes([9; 32]),
            }),
            Body::Control(Control::AuthRequest {
                auth: AuthToken([1; 16]),
                otp: Otp([2; 16]),
            }),
            Body::Control(Control::AuthGranted {
                destination: sphere(),
                auth: EncryptedAuth([3; 32]),
            }),
            Body::Control(Control::Report {
                auth: AuthToken([4; 16]),
            }),
            Body::Control(Control::KeepAlive),
            Body::Control(Control::Epoch {
                destination: sphere(),
                t1: Time(99_000_000),
                epoch: -1_234_567,
                coordinates: Space::new(-2_000_000_000, 15, 2_000_000_000),
            }),
            Body::Control(Control::Other {
                subtype: SUBTYPE_MODEL,
                payload: vec![1, 2, 3],
            }),
        ]
    }

    fn build(scale: Scale, body: Body) -> Packet {
        PacketBuilder::new(scale, origin())
            .unit(Unit::TEMPERATURE)
            .device(DeviceId(4))
            .mode(interest_mode::ALL)
            .location_confidence(97)
            .build(body)
    }

    #[test]
    fn test_roundtrip_every_type_min_and_max_value() {
        for scale in [Scale::Cm16, Scale::Cm32] {
            for body in all_bodies(Vec::new()) {
                let packet = build(scale, body);
                let bytes = packet.encode().unwrap();
                assert_eq!(bytes.len(), packet.encoded_len());
                assert_eq!(Packet::decode(&bytes).unwrap(), packet);

                if packet.body.value().is_some() {
                    let max = packet.max_value_len();
                    let full = build(scale, all_bodies(vec![0xA5; max])
                        .into_iter()
                        .find(|b| b.message_type() == packet.message_type())
                        .unwrap());
                    let bytes = full.encode().unwrap();
                    assert_eq!(bytes.len(), MTU);
                    assert_eq!(Packet::decode(&bytes).unwrap(), full);
                }
            }
        }
    }

    #[test]
    fn test_header_follows_body() {
        let packet = build(Scale::Cm16, Body::Control(Control::KeepAlive));
        assert_eq!(packet.header.message_type, MessageType::Control);
        assert_eq!(packet.header.subtype, 6);
        assert!(packet.is_keep_alive());
    }

    #[test]
    fn test_oversized_rejected() {
        let packet = build(
            Scale::Cm32,
            Body::Response(Response {
                confidence: 1,
                expiry: 1,
                value: vec![0; MTU],
            }),
        );
        assert!(matches!(packet.encode(), Err(TstpError::PacketTooLarge { .. })));
    }

    #[test]
    fn test_corruption_detected() {
        let packet = build(Scale::Cm16, Body::Control(Control::KeepAlive));
        let mut bytes = packet.encode().unwrap();
        bytes[10] ^= 0x01;
        assert!(matches!(Packet::decode(&bytes), Err(TstpError::CrcMismatch { .. })));
    }

    #[test]
    fn test_trailer_matches_encoding() {
        let packet = build(Scale::Cm16, Body::Control(Control::KeepAlive));
        let bytes = packet.encode().unwrap();
        let trailer = packet.trailer().unwrap();
        let n = bytes.len();
        assert_eq!(&bytes[n - 6..n - 4], &trailer.id.to_bytes());
        assert_eq!(&bytes[n - 4..], &trailer.crc.to_le_bytes());
    }

    #[test]
    fn test_body_digest_ignores_hop_fields() {
        let packet = build(Scale::Cm16, Body::Control(Control::KeepAlive));
        let mut relayed = packet.clone();
        relayed.header.last_hop = Spacetime::new(Space::new(7, 7, 7), Time(99));
        relayed.header.time_request = !packet.header.time_request;
        assert_eq!(packet.body_digest().unwrap(), relayed.body_digest().unwrap());

        let other = build(
            Scale::Cm16,
            Body::Control(Control::DhResponse {
                public_key: PublicKeyBytes([9; 32]),
            }),
        );
        assert_ne!(packet.body_digest().unwrap(), other.body_digest().unwrap());
    }

    #[test]
    fn test_truncated_control_rejected() {
        let packet = build(
            Scale::Cm16,
            Body::Control(Control::DhResponse {
                public_key: PublicKeyBytes([9; 32]),
            }),
        );
        let mut bytes = packet.encode().unwrap();
        // Drop one key byte and re-seal so only the body is malformed
        let n = bytes.len();
        bytes.remove(n - 7);
        let n = bytes.len();
        bytes.truncate(n - 4);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        assert!(matches!(Packet::decode(&bytes), Err(TstpError::BufferTooShort { .. })));
    }
}
