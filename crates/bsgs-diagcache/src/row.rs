//! Row payload codec.
//!
//! ```text
//! u32 shift (LE), then vector_len x { u8 flag, coefficient block if flag == 0 }
//! ```
//!
//! The flag marks *emptiness*: `1` means the slot is structurally zero and
//! nothing follows it, so sparse rows cost one byte per absent slot.

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::CoeffCodec;
use crate::error::{DiagCacheError, Result};
use crate::header::{StreamHeader, SHIFT_LEN};

pub const FLAG_PRESENT: u8 = 0;
pub const FLAG_ABSENT: u8 = 1;

/// One cached diagonal: the rotation it belongs to and one optional
/// polynomial per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagRow<P> {
    pub shift: i32,
    pub slots: Vec<Option<P>>,
}

impl<P> DiagRow<P> {
    pub fn new(shift: i32, slots: Vec<Option<P>>) -> Self {
        Self { shift, slots }
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Payload length of a row with `present` of `vector_len` slots stored.
pub fn encoded_row_len(vector_len: usize, present: usize, per_slot_len: usize) -> usize {
    SHIFT_LEN as usize + vector_len + present * per_slot_len
}

/// Encodes one row into `buf` (at least `header.row_size` bytes) and returns
/// the number of bytes used.
pub(crate) fn encode_row<C: CoeffCodec>(
    codec: &C,
    header: &StreamHeader,
    shift: i32,
    slots: &[Option<C::Poly>],
    buf: &mut [u8],
) -> Result<usize> {
    if slots.len() != header.vector_len() {
        return Err(DiagCacheError::RowShapeMismatch(format!(
            "expected {} slots, found {}",
            header.vector_len,
            slots.len()
        )));
    }

    let expected = header.poly_shape();
    for (idx, poly) in slots.iter().enumerate() {
        if let Some(poly) = poly {
            let found = codec.shape(poly);
            if !found.matches(&expected) {
                return Err(DiagCacheError::RowShapeMismatch(format!(
                    "slot {idx} has shape {found:?}, stream was started with {expected:?}"
                )));
            }
        }
    }

    let ring_degree = expected.ring_degree;
    let num_moduli = expected.num_moduli;

    LittleEndian::write_u32(&mut buf[..SHIFT_LEN as usize], shift as u32);
    let mut pos = SHIFT_LEN as usize;
    for poly in slots {
        match poly {
            None => {
                buf[pos] = FLAG_ABSENT;
                pos += 1;
            }
            Some(poly) => {
                buf[pos] = FLAG_PRESENT;
                pos = codec.write_coeffs(poly, ring_degree, num_moduli, buf, pos + 1)?;
            }
        }
    }
    Ok(pos)
}

/// Decodes one row payload. `payload` is exactly the declared row length;
/// `row` is only used for error reporting.
pub(crate) fn decode_row<C: CoeffCodec>(
    codec: &C,
    header: &StreamHeader,
    payload: &[u8],
    row: u64,
) -> Result<DiagRow<C::Poly>> {
    let shift_len = SHIFT_LEN as usize;
    if payload.len() < shift_len {
        return Err(DiagCacheError::corrupt_row(
            row,
            format!("payload of {} bytes cannot hold a shift", payload.len()),
        ));
    }

    let shift = LittleEndian::read_u32(&payload[..shift_len]) as i32;
    let shape = header.poly_shape();
    let vector_len = header.vector_len();

    // Every slot costs at least its flag byte.
    if payload.len() - shift_len < vector_len {
        return Err(DiagCacheError::corrupt_row(
            row,
            format!(
                "payload of {} bytes cannot hold {vector_len} slot flags",
                payload.len()
            ),
        ));
    }

    let mut pos = shift_len;
    let mut slots = Vec::with_capacity(vector_len);
    for idx in 0..vector_len {
        let Some(&flag) = payload.get(pos) else {
            return Err(DiagCacheError::corrupt_row(
                row,
                format!("payload ends before slot {idx} of {vector_len}"),
            ));
        };
        pos += 1;

        match flag {
            FLAG_ABSENT => slots.push(None),
            FLAG_PRESENT => {
                let (poly, next) = codec
                    .read_coeffs(&shape, payload, pos)
                    .map_err(|err| DiagCacheError::corrupt_row(row, format!("slot {idx}: {err}")))?;
                pos = next;
                slots.push(Some(poly));
            }
            other => {
                return Err(DiagCacheError::corrupt_row(
                    row,
                    format!("unknown presence flag {other} at slot {idx}"),
                ));
            }
        }
    }

    if pos != payload.len() {
        return Err(DiagCacheError::corrupt_row(
            row,
            format!(
                "{} trailing bytes after the last slot",
                payload.len() - pos
            ),
        ));
    }

    Ok(DiagRow { shift, slots })
}
