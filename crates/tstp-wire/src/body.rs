//! Type-specific message bodies
//!
//! Body layouts (S = space size, R = S + 4 sphere, G = R + 16 region):
//! - Interest:  region (G) + expiry (4) + period (4) + value
//! - Response:  confidence (1) + expiry (4) + value
//! - Command:   region (G) + expiry (4) + period (4) + value
//! - Control:
//!   - DH_REQUEST:   destination sphere (R) + public key (32)
//!   - DH_RESPONSE:  public key (32)
//!   - AUTH_REQUEST: auth token (16) + OTP (16)
//!   - AUTH_GRANTED: destination sphere (R) + encrypted auth (32)
//!   - REPORT:       auth token (16)
//!   - KEEP_ALIVE:   empty
//!   - EPOCH:        destination sphere (R) + t1 (8) + epoch (8, signed) + global space (12)
//!   - other codes:  opaque payload

use bytes::BufMut;
use tstp_core::{
    AuthToken, ControlSubtype, EncryptedAuth, MessageType, Otp, PublicKeyBytes, Region, Scale,
    Space, Sphere, Time, TstpResult, ENCRYPTED_AUTH_SIZE, PUBLIC_KEY_SIZE,
};

use crate::codec::{
    put_global_space, put_region, put_sphere, region_size, sphere_size, Reader,
};

/// Request for data from the sensors inside a region
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interest {
    pub region: Region,
    /// Validity of each response, microseconds after its origin
    pub expiry: u32,
    /// Response period in microseconds; zero for a single response
    pub period: u32,
    pub value: Vec<u8>,
}

/// Sensed data flowing back to the sink
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub confidence: u8,
    /// Validity, microseconds after origin
    pub expiry: u32,
    pub value: Vec<u8>,
}

/// Actuation request for the devices inside a region
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub region: Region,
    pub expiry: u32,
    pub period: u32,
    pub value: Vec<u8>,
}

/// Control submessages
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    DhRequest {
        destination: Sphere,
        public_key: PublicKeyBytes,
    },
    DhResponse {
        public_key: PublicKeyBytes,
    },
    AuthRequest {
        auth: AuthToken,
        otp: Otp,
    },
    AuthGranted {
        destination: Sphere,
        auth: EncryptedAuth,
    },
    Report {
        auth: AuthToken,
    },
    KeepAlive,
    Epoch {
        destination: Sphere,
        t1: Time,
        /// Sink's network time minus its hardware time, microseconds
        epoch: i64,
        /// Sink's absolute coordinates
        coordinates: Space,
    },
    Other {
        subtype: u8,
        payload: Vec<u8>,
    },
}

impl Control {
    pub fn subtype(&self) -> ControlSubtype {
        match self {
            Control::DhRequest { .. } => ControlSubtype::DhRequest,
            Control::DhResponse { .. } => ControlSubtype::DhResponse,
            Control::AuthRequest { .. } => ControlSubtype::AuthRequest,
            Control::AuthGranted { .. } => ControlSubtype::AuthGranted,
            Control::Report { .. } => ControlSubtype::Report,
            Control::KeepAlive => ControlSubtype::KeepAlive,
            Control::Epoch { .. } => ControlSubtype::Epoch,
            Control::Other { subtype, .. } => ControlSubtype::Other(*subtype),
        }
    }

    fn encoded_len(&self, scale: Scale) -> usize {
        match self {
            Control::DhRequest { .. } => sphere_size(scale) + PUBLIC_KEY_SIZE,
            Control::DhResponse { .. } => PUBLIC_KEY_SIZE,
            Control::AuthRequest { .. } => 32,
            Control::AuthGranted { .. } => sphere_size(scale) + ENCRYPTED_AUTH_SIZE,
            Control::Report { .. } => 16,
            Control::KeepAlive => 0,
            Control::Epoch { .. } => sphere_size(scale) + 8 + 8 + 12,
            Control::Other { payload, .. } => payload.len(),
        }
    }

    fn write(&self, out: &mut impl BufMut, scale: Scale) -> TstpResult<()> {
        match self {
            Control::DhRequest {
                destination,
                public_key,
            } => {
                put_sphere(out, destination, scale)?;
                out.put_slice(public_key.as_bytes());
            }
            Control::DhResponse { public_key } => out.put_slice(public_key.as_bytes()),
            Control::AuthRequest { auth, otp } => {
                out.put_slice(auth.as_bytes());
                out.put_slice(otp.as_bytes());
            }
            Control::AuthGranted { destination, auth } => {
                put_sphere(out, destination, scale)?;
                out.put_slice(auth.as_bytes());
            }
            Control::Report { auth } => out.put_slice(auth.as_bytes()),
            Control::KeepAlive => {}
            Control::Epoch {
                destination,
                t1,
                epoch,
                coordinates,
            } => {
                put_sphere(out, destination, scale)?;
                out.put_u64_le(t1.0);
                out.put_i64_le(*epoch);
                put_global_space(out, coordinates);
            }
            Control::Other { payload, .. } => out.put_slice(payload),
        }
        Ok(())
    }

    fn read(r: &mut Reader<'_>, subtype: u8, scale: Scale) -> TstpResult<Self> {
        let control = match ControlSubtype::from_byte(subtype) {
            ControlSubtype::DhRequest => Control::DhRequest {
                destination: r.sphere(scale)?,
                public_key: PublicKeyBytes(r.array()?),
            },
            ControlSubtype::DhResponse => Control::DhResponse {
                public_key: PublicKeyBytes(r.array()?),
            },
            ControlSubtype::AuthRequest => Control::AuthRequest {
                auth: AuthToken(r.array()?),
                otp: Otp(r.array()?),
            },
            ControlSubtype::AuthGranted => Control::AuthGranted {
                destination: r.sphere(scale)?,
                auth: EncryptedAuth(r.array()?),
            },
            ControlSubtype::Report => Control::Report {
                auth: AuthToken(r.array()?),
            },
            ControlSubtype::KeepAlive => Control::KeepAlive,
            ControlSubtype::Epoch => Control::Epoch {
                destination: r.sphere(scale)?,
                t1: r.time()?,
                epoch: r.i64()?,
                coordinates: r.global_space()?,
            },
            ControlSubtype::Other(subtype) => {
                return Ok(Control::Other {
                    subtype,
                    payload: r.rest(),
                })
            }
        };
        r.expect_end("control submessage")?;
        Ok(control)
    }
}

/// Message body, selected by the header's type and subtype
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Interest(Interest),
    Response(Response),
    Command(Command),
    Control(Control),
}

impl Body {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::Interest(_) => MessageType::Interest,
            Body::Response(_) => MessageType::Response,
            Body::Command(_) => MessageType::Command,
            Body::Control(_) => MessageType::Control,
        }
    }

    /// Opaque value carried by data messages
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Body::Interest(i) => Some(&i.value),
            Body::Response(r) => Some(&r.value),
            Body::Command(c) => Some(&c.value),
            Body::Control(_) => None,
        }
    }

    pub fn encoded_len(&self, scale: Scale) -> usize {
        match self {
            Body::Interest(i) => region_size(scale) + 8 + i.value.len(),
            Body::Response(r) => 1 + 4 + r.value.len(),
            Body::Command(c) => region_size(scale) + 8 + c.value.len(),
            Body::Control(c) => c.encoded_len(scale),
        }
    }

    pub(crate) fn write(&self, out: &mut impl BufMut, scale: Scale) -> TstpResult<()> {
        match self {
            Body::Interest(i) => {
                put_region(out, &i.region, scale)?;
                out.put_u32_le(i.expiry);
                out.put_u32_le(i.period);
                out.put_slice(&i.value);
            }
            Body::Response(r) => {
                out.put_u8(r.confidence);
                out.put_u32_le(r.expiry);
                out.put_slice(&r.value);
            }
            Body::Command(c) => {
                put_region(out, &c.region, scale)?;
                out.put_u32_le(c.expiry);
                out.put_u32_le(c.period);
                out.put_slice(&c.value);
            }
            Body::Control(c) => c.write(out, scale)?,
        }
        Ok(())
    }

    pub(crate) fn read(
        r: &mut Reader<'_>,
        message_type: MessageType,
        subtype: u8,
        scale: Scale,
    ) -> TstpResult<Self> {
        Ok(match message_type {
            MessageType::Interest => Body::Interest(Interest {
                region: r.region(scale)?,
                expiry: r.u32()?,
                period: r.u32()?,
                value: r.rest(),
            }),
            MessageType::Response => Body::Response(Response {
                confidence: r.u8()?,
                expiry: r.u32()?,
                value: r.rest(),
            }),
            MessageType::Command => Body::Command(Command {
                region: r.region(scale)?,
                expiry: r.u32()?,
                period: r.u32()?,
                value: r.rest(),
            }),
            MessageType::Control => Body::Control(Control::read(r, subtype, scale)?),
        })
    }
}
