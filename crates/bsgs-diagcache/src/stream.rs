//! Write-once / read-many cache streams.
//!
//! A [`DiagCacheWriter`] creates `<prefix>_<block>.bin`, and emits the header
//! lazily: nothing but the index tables is known until the first diagonal
//! arrives, whose shape fixes every header field. A [`DiagCacheReader`] parses
//! the header eagerly on open and then replays rows in write order, with
//! [`DiagCacheReader::reset`] rewinding to the first row.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::CoeffCodec;
use crate::config::DiagCacheConfig;
use crate::error::{DiagCacheError, Result};
use crate::header::{IndexTables, StreamHeader, HEADER_LEN};
use crate::params::SlotCount;
use crate::row::{decode_row, encode_row, DiagRow};

/// Length of the prefix framing every row payload.
pub const FRAME_LEN: usize = 8;

/// Identifies one cache file: `<prefix>_<block_index>.bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocation {
    pub prefix: PathBuf,
    pub block_index: usize,
}

impl CacheLocation {
    pub fn new(prefix: impl Into<PathBuf>, block_index: usize) -> Self {
        Self {
            prefix: prefix.into(),
            block_index,
        }
    }

    pub fn path(&self) -> PathBuf {
        let mut name = self.prefix.clone().into_os_string();
        name.push(format!("_{}.bin", self.block_index));
        PathBuf::from(name)
    }
}

/// Result of opening a cache for writing.
#[derive(Debug)]
pub enum WriteOpen<C: CoeffCodec> {
    Created(DiagCacheWriter<C>),
    /// The file already exists; recomputation should be skipped entirely.
    AlreadyPresent(PathBuf),
}

impl<C: CoeffCodec> WriteOpen<C> {
    pub fn into_writer(self) -> Option<DiagCacheWriter<C>> {
        match self {
            WriteOpen::Created(writer) => Some(writer),
            WriteOpen::AlreadyPresent(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, WriteOpen::AlreadyPresent(_))
    }
}

#[derive(Debug)]
enum WriteState {
    AwaitingFirstRow,
    Streaming(StreamHeader),
    /// An I/O error hit the file mid-write; its tail is unknown.
    Failed,
}

pub struct DiagCacheWriter<C: CoeffCodec> {
    path: PathBuf,
    writer: BufWriter<File>,
    codec: C,
    table_len: usize,
    tables: Option<IndexTables>,
    state: WriteState,
    buf: Vec<u8>,
    rows_written: u64,
    sync_on_close: bool,
}

impl<C: CoeffCodec> std::fmt::Debug for DiagCacheWriter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagCacheWriter")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

/// Opens `location` for writing with [`DiagCacheConfig::default`].
pub fn open_for_write<C: CoeffCodec>(
    location: &CacheLocation,
    params: &impl SlotCount,
    codec: C,
) -> Result<WriteOpen<C>> {
    open_for_write_with_config(location, params, codec, &DiagCacheConfig::default())
}

/// Creates the cache file unless it already exists. An existing file is never
/// touched: [`WriteOpen::AlreadyPresent`] tells the caller to skip work.
pub fn open_for_write_with_config<C: CoeffCodec>(
    location: &CacheLocation,
    params: &impl SlotCount,
    codec: C,
    config: &DiagCacheConfig,
) -> Result<WriteOpen<C>> {
    let path = location.path();
    let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            tracing::info!(target: "bsgs.cache", path = %path.display(), "found cache file");
            return Ok(WriteOpen::AlreadyPresent(path));
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!(target: "bsgs.cache", path = %path.display(), "created cache file");

    Ok(WriteOpen::Created(DiagCacheWriter {
        writer: BufWriter::with_capacity(config.buffer_capacity, file),
        path,
        codec,
        table_len: params.index_table_len(),
        tables: None,
        state: WriteState::AwaitingFirstRow,
        buf: Vec::new(),
        rows_written: 0,
        sync_on_close: config.sync_on_close,
    }))
}

impl<C: CoeffCodec> DiagCacheWriter<C> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// The header, once the first diagonal has been written.
    pub fn header(&self) -> Option<&StreamHeader> {
        match &self.state {
            WriteState::Streaming(header) => Some(header),
            WriteState::AwaitingFirstRow | WriteState::Failed => None,
        }
    }

    /// Sets the BSGS index tables. Each must have `ceil(sqrt(slot_count))`
    /// entries. They reach the disk together with the header, so changing them
    /// after the first row has no effect on the file.
    pub fn set_index_tables(&mut self, baby: Vec<bool>, giant: Vec<bool>) -> Result<()> {
        let tables = IndexTables::new(baby, giant);
        tables.check_len(self.table_len)?;
        if matches!(self.state, WriteState::Streaming(_)) {
            tracing::warn!(
                target: "bsgs.cache",
                path = %self.path.display(),
                "index tables set after the header was written"
            );
        }
        self.tables = Some(tables);
        Ok(())
    }

    pub fn index_tables(&self) -> Option<&IndexTables> {
        self.tables.as_ref()
    }

    /// Appends one diagonal and returns its payload length (excluding the
    /// length prefix). The first call derives and writes the header; a first
    /// row that fails to encode leaves the file untouched.
    ///
    /// Encoding errors leave the writer usable. An I/O error does not: the
    /// file may end in a partial frame, so every later call returns
    /// [`DiagCacheError::WriterFailed`].
    pub fn write_diag(&mut self, shift: i32, slots: &[Option<C::Poly>]) -> Result<usize> {
        let (header, first) = match self.state {
            WriteState::Streaming(header) => (header, false),
            WriteState::AwaitingFirstRow => (self.derive_header(slots)?, true),
            WriteState::Failed => return Err(DiagCacheError::WriterFailed),
        };

        let len = encode_row(&self.codec, &header, shift, slots, &mut self.buf)?;
        if let Err(err) = self.append(header, first, len) {
            if matches!(err, DiagCacheError::Io(_)) {
                tracing::warn!(
                    target: "bsgs.cache",
                    path = %self.path.display(),
                    error = %err,
                    "cache write failed; writer is unusable"
                );
                self.state = WriteState::Failed;
            }
            return Err(err);
        }
        self.rows_written += 1;
        Ok(len)
    }

    fn append(&mut self, header: StreamHeader, first: bool, len: usize) -> Result<()> {
        if first {
            self.write_header(header)?;
        }

        let mut frame = [0u8; FRAME_LEN];
        LittleEndian::write_u64(&mut frame, len as u64);
        self.writer.write_all(&frame)?;
        self.writer.write_all(&self.buf[..len])?;
        Ok(())
    }

    fn derive_header(&mut self, slots: &[Option<C::Poly>]) -> Result<StreamHeader> {
        if self.tables.is_none() {
            return Err(DiagCacheError::MissingIndexTables);
        }
        let first = slots
            .iter()
            .flatten()
            .next()
            .ok_or(DiagCacheError::EmptyFirstRow)?;

        let shape = self.codec.shape(first);
        let per_slot = self.codec.encoded_len(shape.ring_degree, shape.num_moduli);
        let header = StreamHeader::derive(&shape, slots.len(), per_slot)?;
        let row_size = usize::try_from(header.row_size)
            .map_err(|_| DiagCacheError::InvalidHeader("row size exceeds addressable memory"))?;

        self.buf = vec![0u8; row_size];
        Ok(header)
    }

    fn write_header(&mut self, header: StreamHeader) -> Result<()> {
        let tables = self
            .tables
            .as_ref()
            .ok_or(DiagCacheError::MissingIndexTables)?;
        self.writer.write_all(&header.encode())?;
        self.writer.write_all(&tables.encode())?;

        tracing::debug!(
            target: "bsgs.cache",
            path = %self.path.display(),
            vector_len = header.vector_len,
            level = header.level,
            scale = header.scale,
            ring_degree = header.ring_degree,
            num_moduli = header.num_moduli,
            row_size = header.row_size,
            table_len = self.table_len,
            baby_set = tables.baby_set(),
            giant_set = tables.giant_set(),
            "wrote cache header"
        );

        self.state = WriteState::Streaming(header);
        Ok(())
    }

    /// Flushes buffered rows and closes the file.
    pub fn close(self) -> Result<()> {
        if self.rows_written == 0 {
            tracing::warn!(
                target: "bsgs.cache",
                path = %self.path.display(),
                "closing cache file before any diagonal was written; it has no header"
            );
        }
        let file = self.writer.into_inner().map_err(|err| err.into_error())?;
        if self.sync_on_close {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// Why the last [`DiagCacheReader::read_diag`] returned `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStream {
    /// The file ended exactly on a row boundary.
    Clean,
    /// Only `found` bytes of a length prefix were left, or the read failed.
    Truncated { found: usize },
    /// Row `row` was corrupt; the rest of the file is not trusted.
    Corrupt { row: u64 },
}

pub struct DiagCacheReader<C: CoeffCodec> {
    path: PathBuf,
    reader: BufReader<File>,
    codec: C,
    header: StreamHeader,
    tables: IndexTables,
    data_start: u64,
    file_len: u64,
    pos: u64,
    buf: Vec<u8>,
    rows_read: u64,
    end: Option<EndOfStream>,
}

impl<C: CoeffCodec> std::fmt::Debug for DiagCacheReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagCacheReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}

/// Opens `location` for reading with [`DiagCacheConfig::default`].
pub fn open_for_read<C: CoeffCodec>(
    location: &CacheLocation,
    params: &impl SlotCount,
    codec: C,
) -> Result<DiagCacheReader<C>> {
    open_for_read_with_config(location, params, codec, &DiagCacheConfig::default())
}

/// Opens an existing cache file and parses its header and index tables.
pub fn open_for_read_with_config<C: CoeffCodec>(
    location: &CacheLocation,
    params: &impl SlotCount,
    codec: C,
    config: &DiagCacheConfig,
) -> Result<DiagCacheReader<C>> {
    let path = location.path();
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DiagCacheError::CacheMiss { path });
        }
        Err(err) => return Err(err.into()),
    };

    let table_len = params.index_table_len();
    let data_start = (HEADER_LEN + IndexTables::encoded_len(table_len)) as u64;
    let file_len = file.metadata()?.len();
    if file_len < data_start {
        return Err(DiagCacheError::TruncatedHeader {
            expected: data_start,
            found: file_len,
        });
    }

    let mut reader = BufReader::with_capacity(config.buffer_capacity, file);
    let mut head = vec![0u8; data_start as usize];
    reader.read_exact(&mut head)?;

    let header = StreamHeader::decode(&head[..HEADER_LEN])?;
    let per_slot = codec.encoded_len(header.ring_degree as usize, header.num_moduli as usize);
    header.validate(per_slot)?;
    let tables = IndexTables::decode(&head[HEADER_LEN..], table_len)?;

    tracing::info!(target: "bsgs.cache", path = %path.display(), "opened cache file");
    tracing::debug!(
        target: "bsgs.cache",
        path = %path.display(),
        vector_len = header.vector_len,
        level = header.level,
        scale = header.scale,
        ring_degree = header.ring_degree,
        num_moduli = header.num_moduli,
        row_size = header.row_size,
        table_len,
        baby_set = tables.baby_set(),
        giant_set = tables.giant_set(),
        "read cache header"
    );

    Ok(DiagCacheReader {
        buf: Vec::new(),
        path,
        reader,
        codec,
        header,
        tables,
        data_start,
        file_len,
        pos: data_start,
        rows_read: 0,
        end: None,
    })
}

impl<C: CoeffCodec> DiagCacheReader<C> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn index_tables(&self) -> &IndexTables {
        &self.tables
    }

    /// Byte offset of the first row, just past the header and index tables.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Rows returned since open or the last [`reset`](Self::reset).
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Set once a read pass has ended; cleared by [`reset`](Self::reset).
    pub fn end_of_stream(&self) -> Option<EndOfStream> {
        self.end
    }

    /// Reads the next diagonal. `Ok(None)` marks the end of the stream: a
    /// missing or short length prefix, whether from a clean EOF or a truncated
    /// file. [`end_of_stream`](Self::end_of_stream) tells the two apart.
    ///
    /// A `CorruptRow` error also ends the pass: later calls return `Ok(None)`
    /// until [`reset`](Self::reset).
    pub fn read_diag(&mut self) -> Result<Option<DiagRow<C::Poly>>> {
        if self.end.is_some() {
            return Ok(None);
        }

        let mut frame = [0u8; FRAME_LEN];
        let found = match read_up_to(&mut self.reader, &mut frame) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    target: "bsgs.cache",
                    path = %self.path.display(),
                    error = %err,
                    "read pass ended on an i/o error"
                );
                self.end = Some(EndOfStream::Truncated { found: 0 });
                return Ok(None);
            }
        };
        if found < FRAME_LEN {
            let end = if found == 0 {
                EndOfStream::Clean
            } else {
                tracing::warn!(
                    target: "bsgs.cache",
                    path = %self.path.display(),
                    found,
                    "read pass ended on a truncated length prefix"
                );
                EndOfStream::Truncated { found }
            };
            self.end = Some(end);
            return Ok(None);
        }

        self.pos += FRAME_LEN as u64;

        let row = self.rows_read;
        let declared = LittleEndian::read_u64(&frame);
        if declared > self.header.row_size {
            return Err(self.corrupt(
                row,
                format!(
                    "declared length {declared} exceeds maximum row size {}",
                    self.header.row_size
                ),
            ));
        }
        let remaining = self.file_len.saturating_sub(self.pos);
        if declared > remaining {
            return Err(self.corrupt(
                row,
                format!("file ends inside a {declared}-byte payload ({remaining} bytes left)"),
            ));
        }

        // Bounded by the bytes left in the file, so a forged header cannot
        // force a huge allocation.
        let declared = declared as usize;
        if self.buf.len() < declared {
            self.buf.resize(declared, 0);
        }

        if let Err(err) = self.reader.read_exact(&mut self.buf[..declared]) {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                return Err(self.corrupt(
                    row,
                    format!("file ends inside a {declared}-byte payload"),
                ));
            }
            return Err(err.into());
        }
        self.pos += declared as u64;

        match decode_row(&self.codec, &self.header, &self.buf[..declared], row) {
            Ok(decoded) => {
                self.rows_read += 1;
                Ok(Some(decoded))
            }
            Err(err) => {
                self.end = Some(EndOfStream::Corrupt { row });
                Err(err)
            }
        }
    }

    fn corrupt(&mut self, row: u64, reason: String) -> DiagCacheError {
        self.end = Some(EndOfStream::Corrupt { row });
        DiagCacheError::corrupt_row(row, reason)
    }

    /// Rewinds to the first row for another pass over the same file.
    pub fn reset(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.data_start))?;
        self.pos = self.data_start;
        self.rows_read = 0;
        self.end = None;
        tracing::debug!(target: "bsgs.cache", path = %self.path.display(), "reset read position");
        Ok(())
    }

    /// Releases the file. Reading needs no flush, so this cannot fail.
    pub fn close(self) {}
}

impl<C: CoeffCodec> Iterator for DiagCacheReader<C> {
    type Item = Result<DiagRow<C::Poly>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_diag().transpose()
    }
}

/// Like `read_exact`, but reports how many bytes were available instead of
/// failing at EOF.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
