//! Coefficient codec seam.
//!
//! The cache framing never looks inside a polynomial. Everything it needs is
//! behind [`CoeffCodec`]: the polynomial's [`PolyShape`] (used to derive the
//! stream header from the first row), the fixed encoded size for a given ring
//! degree and modulus count, and the encode/decode of the dense coefficient
//! block at a byte offset.
//!
//! [`RnsCodec`] is the built-in backend: RNS polynomials stored limb-major as
//! little-endian `u64` coefficients (`num_moduli * ring_degree * 8` bytes).

use byteorder::{ByteOrder, LittleEndian};

/// Encryption metadata shared by every polynomial of a cache file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyShape {
    pub level: u64,
    pub scale: f64,
    pub ring_degree: usize,
    pub num_moduli: usize,
}

impl PolyShape {
    /// Bitwise comparison, so a `NaN` scale still compares equal to itself.
    pub fn matches(&self, other: &PolyShape) -> bool {
        self.level == other.level
            && self.scale.to_bits() == other.scale.to_bits()
            && self.ring_degree == other.ring_degree
            && self.num_moduli == other.num_moduli
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("coefficient block at offset {offset} needs {needed} bytes, buffer has {len}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("polynomial has {found_moduli} moduli x {found_degree} coefficients, expected {expected_moduli} x {expected_degree}")]
    ShapeMismatch {
        expected_degree: usize,
        expected_moduli: usize,
        found_degree: usize,
        found_moduli: usize,
    },
}

/// Encodes and decodes the dense coefficient data of one polynomial.
pub trait CoeffCodec {
    type Poly;

    fn shape(&self, poly: &Self::Poly) -> PolyShape;

    /// Byte length of one encoded polynomial. Must depend only on the
    /// arguments: the row size bound in the header is derived from it.
    fn encoded_len(&self, ring_degree: usize, num_moduli: usize) -> usize;

    /// Writes `poly` at `offset` and returns the offset just past it.
    fn write_coeffs(
        &self,
        poly: &Self::Poly,
        ring_degree: usize,
        num_moduli: usize,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, CodecError>;

    /// Reads one polynomial of `shape` starting at `offset`; returns it along
    /// with the offset just past it.
    fn read_coeffs(
        &self,
        shape: &PolyShape,
        buf: &[u8],
        offset: usize,
    ) -> Result<(Self::Poly, usize), CodecError>;
}

/// A polynomial in RNS form: one coefficient vector ("limb") per modulus.
#[derive(Debug, Clone, PartialEq)]
pub struct RnsPoly {
    pub level: u64,
    pub scale: f64,
    pub ring_degree: usize,
    pub limbs: Vec<Vec<u64>>,
}

impl RnsPoly {
    pub fn zero(level: u64, scale: f64, ring_degree: usize, num_moduli: usize) -> Self {
        Self {
            level,
            scale,
            ring_degree,
            limbs: vec![vec![0u64; ring_degree]; num_moduli],
        }
    }

    pub fn num_moduli(&self) -> usize {
        self.limbs.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RnsCodec;

const COEFF_BYTES: usize = 8;

fn block_len(ring_degree: usize, num_moduli: usize) -> usize {
    ring_degree
        .saturating_mul(num_moduli)
        .saturating_mul(COEFF_BYTES)
}

fn check_bounds(offset: usize, needed: usize, len: usize) -> Result<(), CodecError> {
    match offset.checked_add(needed) {
        Some(end) if end <= len => Ok(()),
        _ => Err(CodecError::OutOfBounds {
            offset,
            needed,
            len,
        }),
    }
}

impl CoeffCodec for RnsCodec {
    type Poly = RnsPoly;

    fn shape(&self, poly: &RnsPoly) -> PolyShape {
        PolyShape {
            level: poly.level,
            scale: poly.scale,
            ring_degree: poly.ring_degree,
            num_moduli: poly.num_moduli(),
        }
    }

    fn encoded_len(&self, ring_degree: usize, num_moduli: usize) -> usize {
        block_len(ring_degree, num_moduli)
    }

    fn write_coeffs(
        &self,
        poly: &RnsPoly,
        ring_degree: usize,
        num_moduli: usize,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, CodecError> {
        let mismatch = poly.num_moduli() != num_moduli
            || poly.ring_degree != ring_degree
            || poly.limbs.iter().any(|limb| limb.len() != ring_degree);
        if mismatch {
            return Err(CodecError::ShapeMismatch {
                expected_degree: ring_degree,
                expected_moduli: num_moduli,
                found_degree: poly.limbs.first().map_or(0, Vec::len),
                found_moduli: poly.num_moduli(),
            });
        }

        let needed = block_len(ring_degree, num_moduli);
        check_bounds(offset, needed, buf.len())?;

        let mut pos = offset;
        for limb in &poly.limbs {
            for &coeff in limb {
                LittleEndian::write_u64(&mut buf[pos..pos + COEFF_BYTES], coeff);
                pos += COEFF_BYTES;
            }
        }
        Ok(pos)
    }

    fn read_coeffs(
        &self,
        shape: &PolyShape,
        buf: &[u8],
        offset: usize,
    ) -> Result<(RnsPoly, usize), CodecError> {
        let needed = block_len(shape.ring_degree, shape.num_moduli);
        check_bounds(offset, needed, buf.len())?;

        let mut pos = offset;
        let mut limbs = Vec::with_capacity(shape.num_moduli);
        for _ in 0..shape.num_moduli {
            let mut limb = Vec::with_capacity(shape.ring_degree);
            for _ in 0..shape.ring_degree {
                limb.push(LittleEndian::read_u64(&buf[pos..pos + COEFF_BYTES]));
                pos += COEFF_BYTES;
            }
            limbs.push(limb);
        }

        let poly = RnsPoly {
            level: shape.level,
            scale: shape.scale,
            ring_degree: shape.ring_degree,
            limbs,
        };
        Ok((poly, pos))
    }
}
