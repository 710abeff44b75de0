use std::path::PathBuf;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, DiagCacheError>;

/// Errors produced while writing or replaying a diagonal cache file.
#[derive(Debug, thiserror::Error)]
pub enum DiagCacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file {path} does not exist")]
    CacheMiss { path: PathBuf },

    #[error("truncated header: expected at least {expected} bytes, found {found}")]
    TruncatedHeader { expected: u64, found: u64 },

    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("corrupt row {row}: {reason}")]
    CorruptRow { row: u64, reason: String },

    #[error("index tables must be set before the first diagonal is written")]
    MissingIndexTables,

    #[error("index table length mismatch: expected {expected}, found {found}")]
    IndexTableLength { expected: usize, found: usize },

    #[error("first diagonal has no present slot; cannot derive the stream header")]
    EmptyFirstRow,

    #[error("diagonal does not match the stream header: {0}")]
    RowShapeMismatch(String),

    #[error("an earlier write failed; the cache file is incomplete and must be discarded")]
    WriterFailed,

    #[error("coefficient codec error: {0}")]
    Codec(#[from] CodecError),
}

impl DiagCacheError {
    pub(crate) fn corrupt_row(row: u64, reason: impl Into<String>) -> Self {
        Self::CorruptRow {
            row,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors meaning the file content is unusable and
    /// should be discarded and recomputed.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::TruncatedHeader { .. }
                | Self::InvalidHeader(_)
                | Self::CorruptRow { .. }
                | Self::Codec(_)
        )
    }
}
