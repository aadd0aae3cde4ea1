//! Bounds-checked primitives shared by the header and body codecs

use bytes::{Buf, BufMut};
use tstp_core::{Region, Scale, Space, Sphere, Time, TstpError, TstpResult};

/// Cursor over a received frame. Every read checks the remaining length
/// first, so `Buf` accessors never panic.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn need(&self, n: usize) -> TstpResult<()> {
        if self.buf.len() < n {
            return Err(TstpError::BufferTooShort {
                expected: n,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> TstpResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> TstpResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn u32(&mut self) -> TstpResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn i32(&mut self) -> TstpResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn u64(&mut self) -> TstpResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub(crate) fn i64(&mut self) -> TstpResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub(crate) fn f64(&mut self) -> TstpResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> TstpResult<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn time(&mut self) -> TstpResult<Time> {
        Ok(Time(self.u64()?))
    }

    /// Local coordinates at `scale`, followed by the scale's padding.
    pub(crate) fn space(&mut self, scale: Scale) -> TstpResult<Space> {
        self.need(scale.space_size())?;
        let mut coord = || -> i32 {
            match scale.coordinate_size() {
                1 => self.buf.get_i8() as i32,
                2 => self.buf.get_i16_le() as i32,
                _ => self.buf.get_i32_le(),
            }
        };
        let (x, y, z) = (coord(), coord(), coord());
        self.buf.advance(scale.padding());
        Ok(Space::new(x, y, z))
    }

    /// Absolute coordinates, always 32-bit.
    pub(crate) fn global_space(&mut self) -> TstpResult<Space> {
        self.need(12)?;
        Ok(Space::new(
            self.buf.get_i32_le(),
            self.buf.get_i32_le(),
            self.buf.get_i32_le(),
        ))
    }

    pub(crate) fn sphere(&mut self, scale: Scale) -> TstpResult<Sphere> {
        let center = self.space(scale)?;
        let radius = self.u32()?;
        Ok(Sphere::new(center, radius))
    }

    pub(crate) fn region(&mut self, scale: Scale) -> TstpResult<Region> {
        let sphere = self.sphere(scale)?;
        let t0 = self.time()?;
        let t1 = self.time()?;
        Region::try_new(sphere.center, sphere.radius, t0, t1)
    }

    /// Everything left, as the opaque value.
    pub(crate) fn rest(&mut self) -> Vec<u8> {
        let out = self.buf.to_vec();
        self.buf.advance(self.buf.len());
        out
    }

    pub(crate) fn expect_end(&self, what: &str) -> TstpResult<()> {
        if !self.buf.is_empty() {
            return Err(TstpError::InvalidWireFormat(format!(
                "{} trailing bytes after {}",
                self.buf.len(),
                what
            )));
        }
        Ok(())
    }
}

pub(crate) fn put_space(out: &mut impl BufMut, space: &Space, scale: Scale) -> TstpResult<()> {
    for c in [space.x, space.y, space.z] {
        scale.check(c)?;
    }
    for c in [space.x, space.y, space.z] {
        match scale.coordinate_size() {
            1 => out.put_i8(c as i8),
            2 => out.put_i16_le(c as i16),
            _ => out.put_i32_le(c),
        }
    }
    out.put_bytes(0, scale.padding());
    Ok(())
}

pub(crate) fn put_global_space(out: &mut impl BufMut, space: &Space) {
    out.put_i32_le(space.x);
    out.put_i32_le(space.y);
    out.put_i32_le(space.z);
}

pub(crate) fn put_sphere(out: &mut impl BufMut, sphere: &Sphere, scale: Scale) -> TstpResult<()> {
    put_space(out, &sphere.center, scale)?;
    out.put_u32_le(sphere.radius);
    Ok(())
}

pub(crate) fn put_region(out: &mut impl BufMut, region: &Region, scale: Scale) -> TstpResult<()> {
    put_sphere(out, &region.sphere(), scale)?;
    out.put_u64_le(region.t0.0);
    out.put_u64_le(region.t1.0);
    Ok(())
}

/// Encoded sizes of composite fields
pub(crate) fn sphere_size(scale: Scale) -> usize {
    scale.space_size() + 4
}

pub(crate) fn region_size(scale: Scale) -> usize {
    sphere_size(scale) + 16
}
