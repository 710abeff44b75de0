//! Stream header and BSGS index tables.
//!
//! ```text
//! [0..48)        vector_len, level, scale (f64 bits), ring_degree, num_moduli, row_size   (6 x u64 LE)
//! [48..48+2d)    baby table (d bytes), giant table (d bytes), one byte per bool
//! ```
//!
//! `d` is not stored; both sides derive it from the scheme's slot count.

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::PolyShape;
use crate::error::{DiagCacheError, Result};

pub const HEADER_LEN: usize = 6 * 8;

/// Bytes taken by the shift tag at the start of every row payload.
pub const SHIFT_LEN: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamHeader {
    pub vector_len: u64,
    pub level: u64,
    pub scale: f64,
    pub ring_degree: u64,
    pub num_moduli: u64,
    /// Upper bound on one row payload: every slot present.
    pub row_size: u64,
}

/// `4 + vector_len * (1 + per_slot_len)`, or `None` on overflow.
pub fn max_row_size(vector_len: u64, per_slot_len: u64) -> Option<u64> {
    per_slot_len
        .checked_add(1)?
        .checked_mul(vector_len)?
        .checked_add(SHIFT_LEN)
}

impl StreamHeader {
    /// Derives the header from the first row of a stream.
    pub fn derive(shape: &PolyShape, vector_len: usize, per_slot_len: usize) -> Result<Self> {
        let row_size = max_row_size(vector_len as u64, per_slot_len as u64)
            .ok_or(DiagCacheError::InvalidHeader("row size overflows u64"))?;
        Ok(Self {
            vector_len: vector_len as u64,
            level: shape.level,
            scale: shape.scale,
            ring_degree: shape.ring_degree as u64,
            num_moduli: shape.num_moduli as u64,
            row_size,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u64(&mut buf[0..8], self.vector_len);
        LittleEndian::write_u64(&mut buf[8..16], self.level);
        LittleEndian::write_u64(&mut buf[16..24], self.scale.to_bits());
        LittleEndian::write_u64(&mut buf[24..32], self.ring_degree);
        LittleEndian::write_u64(&mut buf[32..40], self.num_moduli);
        LittleEndian::write_u64(&mut buf[40..48], self.row_size);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DiagCacheError::TruncatedHeader {
                expected: HEADER_LEN as u64,
                found: bytes.len() as u64,
            });
        }

        Ok(Self {
            vector_len: LittleEndian::read_u64(&bytes[0..8]),
            level: LittleEndian::read_u64(&bytes[8..16]),
            scale: f64::from_bits(LittleEndian::read_u64(&bytes[16..24])),
            ring_degree: LittleEndian::read_u64(&bytes[24..32]),
            num_moduli: LittleEndian::read_u64(&bytes[32..40]),
            row_size: LittleEndian::read_u64(&bytes[40..48]),
        })
    }

    /// Checks that the fields agree with each other and with the codec's
    /// per-slot size.
    pub fn validate(&self, per_slot_len: usize) -> Result<()> {
        if self.vector_len == 0 {
            return Err(DiagCacheError::InvalidHeader("vector length is zero"));
        }
        let expected = max_row_size(self.vector_len, per_slot_len as u64)
            .ok_or(DiagCacheError::InvalidHeader("row size overflows u64"))?;
        if expected != self.row_size {
            return Err(DiagCacheError::InvalidHeader(
                "row size disagrees with vector length and coefficient size",
            ));
        }
        if usize::try_from(self.row_size).is_err() {
            return Err(DiagCacheError::InvalidHeader(
                "row size exceeds addressable memory",
            ));
        }
        Ok(())
    }

    pub fn vector_len(&self) -> usize {
        self.vector_len as usize
    }

    pub fn row_size(&self) -> usize {
        self.row_size as usize
    }

    pub fn poly_shape(&self) -> PolyShape {
        PolyShape {
            level: self.level,
            scale: self.scale,
            ring_degree: self.ring_degree as usize,
            num_moduli: self.num_moduli as usize,
        }
    }
}

/// Which baby-step and giant-step indices take part in the decomposition the
/// cache file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexTables {
    pub baby: Vec<bool>,
    pub giant: Vec<bool>,
}

impl IndexTables {
    pub fn new(baby: Vec<bool>, giant: Vec<bool>) -> Self {
        Self { baby, giant }
    }

    /// Both tables must have exactly `len` entries.
    pub fn check_len(&self, len: usize) -> Result<()> {
        for table in [&self.baby, &self.giant] {
            if table.len() != len {
                return Err(DiagCacheError::IndexTableLength {
                    expected: len,
                    found: table.len(),
                });
            }
        }
        Ok(())
    }

    pub fn encoded_len(len: usize) -> usize {
        2 * len
    }

    pub fn encode(&self) -> Vec<u8> {
        self.baby
            .iter()
            .chain(self.giant.iter())
            .map(|&set| u8::from(set))
            .collect()
    }

    pub fn decode(bytes: &[u8], len: usize) -> Result<Self> {
        let needed = Self::encoded_len(len);
        if bytes.len() < needed {
            return Err(DiagCacheError::TruncatedHeader {
                expected: (HEADER_LEN + needed) as u64,
                found: (HEADER_LEN + bytes.len()) as u64,
            });
        }

        Ok(Self {
            baby: bytes[..len].iter().map(|&b| b != 0).collect(),
            giant: bytes[len..needed].iter().map(|&b| b != 0).collect(),
        })
    }

    pub fn baby_set(&self) -> usize {
        self.baby.iter().filter(|&&set| set).count()
    }

    pub fn giant_set(&self) -> usize {
        self.giant.iter().filter(|&&set| set).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> StreamHeader {
        StreamHeader {
            vector_len: 3,
            level: 5,
            scale: 2f64.powi(30),
            ring_degree: 16,
            num_moduli: 2,
            row_size: 4 + 3 * (1 + 256),
        }
    }

    #[test]
    fn header_layout_is_little_endian() {
        let bytes = header().encode();
        assert_eq!(&bytes[0..8], &3u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &2f64.powi(30).to_bits().to_le_bytes());
        assert_eq!(&bytes[40..48], &775u64.to_le_bytes());
        assert_eq!(StreamHeader::decode(&bytes).unwrap(), header());
    }

    #[test]
    fn short_header_is_truncated() {
        let bytes = header().encode();
        match StreamHeader::decode(&bytes[..47]).unwrap_err() {
            DiagCacheError::TruncatedHeader { expected, found } => {
                assert_eq!(expected, 48);
                assert_eq!(found, 47);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn derive_computes_row_size() {
        let shape = PolyShape {
            level: 5,
            scale: 2f64.powi(30),
            ring_degree: 16,
            num_moduli: 2,
        };
        let derived = StreamHeader::derive(&shape, 3, 256).unwrap();
        assert_eq!(derived, header());
        derived.validate(256).unwrap();
    }

    #[test]
    fn validate_rejects_inconsistent_row_size() {
        let mut h = header();
        h.row_size += 1;
        assert!(matches!(
            h.validate(256),
            Err(DiagCacheError::InvalidHeader(_))
        ));
        assert!(matches!(
            header().validate(128),
            Err(DiagCacheError::InvalidHeader(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_vector_len() {
        let h = StreamHeader {
            vector_len: 0,
            row_size: 4,
            ..header()
        };
        assert!(h.validate(256).is_err());
    }

    #[test]
    fn row_size_overflow_is_detected() {
        assert_eq!(max_row_size(u64::MAX, 1), None);
        assert_eq!(max_row_size(2, u64::MAX), None);
        assert_eq!(max_row_size(0, 10), Some(4));
    }

    #[test]
    fn tables_encode_baby_then_giant() {
        let tables = IndexTables::new(vec![true, false, true], vec![false, false, true]);
        assert_eq!(tables.encode(), vec![1, 0, 1, 0, 0, 1]);
        assert_eq!(IndexTables::decode(&tables.encode(), 3).unwrap(), tables);
        assert_eq!(tables.baby_set(), 2);
        assert_eq!(tables.giant_set(), 1);
    }

    #[test]
    fn tables_treat_nonzero_as_set() {
        let tables = IndexTables::decode(&[0, 7, 0xff, 0], 2).unwrap();
        assert_eq!(tables.baby, vec![false, true]);
        assert_eq!(tables.giant, vec![true, false]);
    }

    #[test]
    fn short_tables_are_truncated_header() {
        let err = IndexTables::decode(&[1, 0, 1], 2).unwrap_err();
        match err {
            DiagCacheError::TruncatedHeader { expected, found } => {
                assert_eq!(expected, 52);
                assert_eq!(found, 51);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn check_len_reports_offending_table() {
        let tables = IndexTables::new(vec![true; 4], vec![true; 3]);
        match tables.check_len(4).unwrap_err() {
            DiagCacheError::IndexTableLength { expected, found } => {
                assert_eq!((expected, found), (4, 3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
