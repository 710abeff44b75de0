use std::path::PathBuf;

use bsgs_diagcache::{
    encoded_row_len, CoeffCodec, DiagCacheReader, DiagRow, EndOfStream, RnsCodec, RnsPoly,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HeaderReport {
    pub path: PathBuf,
    pub vector_len: u64,
    pub level: u64,
    pub scale: f64,
    pub ring_degree: u64,
    pub num_moduli: u64,
    pub row_size: u64,
    pub table_len: usize,
    pub baby_set: usize,
    pub giant_set: usize,
}

impl HeaderReport {
    pub fn from_reader(reader: &DiagCacheReader<RnsCodec>) -> Self {
        let header = reader.header();
        let tables = reader.index_tables();
        Self {
            path: reader.path().to_path_buf(),
            vector_len: header.vector_len,
            level: header.level,
            scale: header.scale,
            ring_degree: header.ring_degree,
            num_moduli: header.num_moduli,
            row_size: header.row_size,
            table_len: tables.baby.len(),
            baby_set: tables.baby_set(),
            giant_set: tables.giant_set(),
        }
    }

    pub fn print_human(&self) {
        println!("cache: {}", self.path.display());
        println!("  vector_len: {}", self.vector_len);
        println!("  level: {}", self.level);
        println!("  scale: {}", self.scale);
        println!("  ring_degree: {}", self.ring_degree);
        println!("  num_moduli: {}", self.num_moduli);
        println!("  row_size: {}", self.row_size);
        println!(
            "  index tables: {} entries, {} baby set, {} giant set",
            self.table_len, self.baby_set, self.giant_set
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowSummary {
    pub index: u64,
    pub shift: i32,
    pub present: usize,
    pub payload_len: usize,
    #[serde(skip)]
    pub digest: blake3::Hash,
}

impl RowSummary {
    pub fn new(index: u64, row: &DiagRow<RnsPoly>, reader: &DiagCacheReader<RnsCodec>) -> Self {
        let header = reader.header();
        let per_slot =
            RnsCodec.encoded_len(header.ring_degree as usize, header.num_moduli as usize);
        let present = row.present_count();
        Self {
            index,
            shift: row.shift,
            present,
            payload_len: encoded_row_len(row.slots.len(), present, per_slot),
            digest: digest(row),
        }
    }
}

/// Content hash over the shift, slot presence and every coefficient.
fn digest(row: &DiagRow<RnsPoly>) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&row.shift.to_le_bytes());
    for slot in &row.slots {
        match slot {
            None => {
                hasher.update(&[1]);
            }
            Some(poly) => {
                hasher.update(&[0]);
                for &coeff in poly.limbs.iter().flatten() {
                    hasher.update(&coeff.to_le_bytes());
                }
            }
        }
    }
    hasher.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndKind {
    Clean,
    Truncated,
    Corrupt,
}

impl From<EndOfStream> for EndKind {
    fn from(end: EndOfStream) -> Self {
        match end {
            EndOfStream::Clean => EndKind::Clean,
            EndOfStream::Truncated { .. } => EndKind::Truncated,
            EndOfStream::Corrupt { .. } => EndKind::Corrupt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub path: PathBuf,
    pub rows: Vec<RowSummary>,
    pub total_payload_bytes: u64,
    pub end: EndKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanReport {
    pub fn print_human(&self) {
        println!("cache: {}", self.path.display());
        for row in &self.rows {
            println!(
                "  row {:>6}  shift {:>8}  present {:>4}  bytes {}",
                row.index, row.shift, row.present, row.payload_len
            );
        }
        println!(
            "summary: {} rows, {} payload bytes, end {:?}",
            self.rows.len(),
            self.total_payload_bytes,
            self.end
        );
        if let Some(error) = &self.error {
            println!("error: {error}");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub path: PathBuf,
    pub rows: usize,
    pub passes_agree: bool,
    pub end: EndKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyReport {
    pub fn print_human(&self) {
        let verdict = if self.ok { "ok" } else { "FAILED" };
        println!("verify {}: {verdict}", self.path.display());
        println!("  rows: {}", self.rows);
        println!("  passes agree: {}", self.passes_agree);
        println!("  end: {:?}", self.end);
        if let Some(error) = &self.error {
            println!("  error: {error}");
        }
    }
}
