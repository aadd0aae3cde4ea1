//! Packed database records uploaded by the gateway
//!
//! DbRecord (39 bytes): kind (1) + unit (4) + value f64 (8) + error (1) +
//! confidence (1) + x, y, z (12) + device (4) + t (8)
//!
//! DbSeries (41 bytes): kind (1) + unit (4) + x, y, z (12) + device (4) +
//! r (4) + t0 (8) + t1 (8)
//!
//! Coordinates are absolute; the caller converts from the local frame.

use bytes::BufMut;
use tstp_core::{Space, Time, TstpError, TstpResult};

use crate::codec::{put_global_space, Reader};
use crate::{Body, Packet};

pub const DB_RECORD_SIZE: usize = 39;
pub const DB_SERIES_SIZE: usize = 41;

/// Record kinds
pub mod record_kind {
    pub const FIXED: u8 = 0;
    pub const MOBILE: u8 = 1;
}

/// One data point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DbRecord {
    pub kind: u8,
    pub unit: u32,
    pub value: f64,
    pub error: u8,
    pub confidence: u8,
    pub position: Space,
    pub device: u32,
    pub t: Time,
}

/// A series definition, as requested by an Interest
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DbSeries {
    pub kind: u8,
    pub unit: u32,
    pub center: Space,
    pub device: u32,
    pub radius: u32,
    pub t0: Time,
    pub t1: Time,
}

impl DbRecord {
    /// Record for a received Response. `absolute` maps local coordinates
    /// into the frame advertised by the sink's Epoch.
    pub fn from_response(packet: &Packet, absolute: impl Fn(Space) -> Space) -> TstpResult<Self> {
        let Body::Response(response) = &packet.body else {
            return Err(TstpError::InvalidWireFormat("record needs a Response".into()));
        };
        let value = packet
            .header
            .unit
            .value_as_f64(&response.value)
            .ok_or_else(|| TstpError::InvalidWireFormat("non-numeric response value".into()))?;
        Ok(DbRecord {
            kind: record_kind::FIXED,
            unit: packet.header.unit.0,
            value,
            error: packet.header.mode,
            confidence: response.confidence,
            position: absolute(packet.header.origin.space),
            device: packet.header.device.0,
            t: packet.header.origin.time,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DB_RECORD_SIZE);
        out.put_u8(self.kind);
        out.put_u32_le(self.unit);
        out.put_f64_le(self.value);
        out.put_u8(self.error);
        out.put_u8(self.confidence);
        put_global_space(&mut out, &self.position);
        out.put_u32_le(self.device);
        out.put_u64_le(self.t.0);
        out
    }

    pub fn parse(buf: &[u8]) -> TstpResult<Self> {
        let mut r = Reader::new(buf);
        let record = DbRecord {
            kind: r.u8()?,
            unit: r.u32()?,
            value: r.f64()?,
            error: r.u8()?,
            confidence: r.u8()?,
            position: r.global_space()?,
            device: r.u32()?,
            t: r.time()?,
        };
        r.expect_end("record")?;
        Ok(record)
    }
}

impl DbSeries {
    /// Series requested by an Interest
    pub fn from_interest(packet: &Packet, absolute: impl Fn(Space) -> Space) -> TstpResult<Self> {
        let Body::Interest(interest) = &packet.body else {
            return Err(TstpError::InvalidWireFormat("series needs an Interest".into()));
        };
        Ok(DbSeries {
            kind: record_kind::FIXED,
            unit: packet.header.unit.0,
            center: absolute(interest.region.center),
            device: packet.header.device.0,
            radius: interest.region.radius,
            t0: interest.region.t0,
            t1: interest.region.t1,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DB_SERIES_SIZE);
        out.put_u8(self.kind);
        out.put_u32_le(self.unit);
        put_global_space(&mut out, &self.center);
        out.put_u32_le(self.device);
        out.put_u32_le(self.radius);
        out.put_u64_le(self.t0.0);
        out.put_u64_le(self.t1.0);
        out
    }

    pub fn parse(buf: &[u8]) -> TstpResult<Self> {
        let mut r = Reader::new(buf);
        let series = DbSeries {
            kind: r.u8()?,
            unit: r.u32()?,
            center: r.global_space()?,
            device: r.u32()?,
            radius: r.u32()?,
            t0: r.time()?,
            t1: r.time()?,
        };
        r.expect_end("series")?;
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interest, PacketBuilder, Response};
    use tstp_core::{DeviceId, Region, Scale, Spacetime, Unit};

    fn shift(s: Space) -> Space {
        Space::new(s.x + 1_000_000, s.y - 1_000_000, s.z)
    }

    #[test]
    fn test_record_from_response() {
        let packet = PacketBuilder::new(Scale::Cm16, Spacetime::new(Space::new(5, 6, 7), Time(42)))
            .unit(Unit::TEMPERATURE)
            .device(DeviceId(3))
            .mode(2)
            .build(Body::Response(Response {
                confidence: 70,
                expiry: 10,
                value: 21.5f32.to_le_bytes().to_vec(),
            }));

        let record = DbRecord::from_response(&packet, shift).unwrap();
        assert_eq!(record.value, 21.5);
        assert_eq!(record.error, 2);
        assert_eq!(record.confidence, 70);
        assert_eq!(record.position, Space::new(1_000_005, -999_994, 7));
        assert_eq!(record.t, Time(42));

        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), DB_RECORD_SIZE);
        assert_eq!(DbRecord::parse(&bytes).unwrap(), record);
    }

    #[test]
    fn test_series_extremes() {
        let series = DbSeries {
            kind: record_kind::MOBILE,
            unit: u32::MAX,
            center: Space::new(i32::MIN, i32::MAX, 0),
            device: u32::MAX,
            radius: u32::MAX,
            t0: Time::ZERO,
            t1: Time::INFINITE,
        };
        let bytes = series.to_bytes();
        assert_eq!(bytes.len(), DB_SERIES_SIZE);
        assert_eq!(DbSeries::parse(&bytes).unwrap(), series);
        assert!(DbSeries::parse(&bytes[..40]).is_err());
    }

    #[test]
    fn test_series_from_interest() {
        let region = Region::new(Space::new(1, 2, 3), 40, Time(100), Time(200));
        let packet = PacketBuilder::new(Scale::Cm16, Spacetime::default())
            .unit(Unit::LENGTH)
            .build(Body::Interest(Interest {
                region,
                expiry: 0,
                period: 0,
                value: Vec::new(),
            }));
        let series = DbSeries::from_interest(&packet, |s| s).unwrap();
        assert_eq!(series.center, region.center);
        assert_eq!((series.t0, series.t1, series.radius), (Time(100), Time(200), 40));
        assert!(DbRecord::from_response(&packet, |s| s).is_err());
    }
}
