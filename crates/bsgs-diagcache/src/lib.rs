//! Disk-backed cache of encrypted diagonals for baby-step/giant-step
//! matrix-vector products.
//!
//! Encoding and encrypting the diagonals of a matrix block is expensive, so a
//! process writes them once to `<prefix>_<block>.bin` and any later pass
//! replays them from disk.
//!
//! ## Format
//! All integers are little-endian.
//! - a 48-byte header: `vector_len`, `level`, `scale` (f64 bits),
//!   `ring_degree`, `num_moduli`, `row_size` (the largest possible row payload)
//! - the baby-step and giant-step index tables, `d = ceil(sqrt(slots))` bytes
//!   each; `d` itself is not stored and must be derived from the same scheme
//!   parameters on both sides
//! - rows: `u64` payload length, then `u32` shift and one presence flag per
//!   slot (`1` = absent), each present slot followed by its coefficient block
//!
//! The header is derived from the first written row, so a writer must set the
//! index tables before its first [`DiagCacheWriter::write_diag`].
//!
//! ## Usage
//! Opening an existing file for writing returns [`WriteOpen::AlreadyPresent`]
//! and never modifies it; the caller skips recomputation. Files are
//! single-writer and must not be read while still being written.

mod codec;
mod config;
mod error;
mod header;
mod params;
mod row;
mod stream;

pub use codec::{CodecError, CoeffCodec, PolyShape, RnsCodec, RnsPoly};
pub use config::{DiagCacheConfig, BUFFER_BYTES_ENV, DEFAULT_BUFFER_CAPACITY, SYNC_ENV};
pub use error::{DiagCacheError, Result};
pub use header::{max_row_size, IndexTables, StreamHeader, HEADER_LEN, SHIFT_LEN};
pub use params::{index_table_len, SchemeParams, SlotCount};
pub use row::{encoded_row_len, DiagRow, FLAG_ABSENT, FLAG_PRESENT};
pub use stream::{
    open_for_read, open_for_read_with_config, open_for_write, open_for_write_with_config,
    CacheLocation, DiagCacheReader, DiagCacheWriter, EndOfStream, WriteOpen, FRAME_LEN,
};
