mod report;

use anyhow::{Context, Result};
use bsgs_diagcache::{
    open_for_read_with_config, CacheLocation, DiagCacheConfig, DiagCacheError, DiagCacheReader,
    RnsCodec, SchemeParams,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::report::{EndKind, HeaderReport, RowSummary, ScanReport, VerifyReport};

#[derive(Parser)]
#[command(
    name = "bsgs-cache",
    version,
    about = "Inspect BSGS diagonal cache files (header, rows, integrity)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stream header and index-table summary
    Header(TargetArgs),
    /// List every row with its shift, present slots and payload size
    Scan(TargetArgs),
    /// Read all rows twice (with a reset) and check the passes agree
    Verify(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Path prefix of the cache files (`<prefix>_<block>.bin`)
    prefix: PathBuf,
    /// Matrix block index
    block: usize,
    /// Slot count of the encryption parameters (sizes the index tables)
    #[arg(long)]
    slots: usize,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

impl TargetArgs {
    fn open(&self) -> Result<DiagCacheReader<RnsCodec>> {
        let location = CacheLocation::new(&self.prefix, self.block);
        let params = SchemeParams::new(self.slots);
        let config = DiagCacheConfig::from_env();
        open_for_read_with_config(&location, &params, RnsCodec, &config)
            .with_context(|| format!("failed to open {}", location.path().display()))
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Header(args) => {
            let reader = args.open()?;
            let report = HeaderReport::from_reader(&reader);
            if args.json {
                print_json(&report)?;
            } else {
                report.print_human();
            }
            Ok(0)
        }
        Command::Scan(args) => {
            let mut reader = args.open()?;
            let (rows, end, error) = scan_pass(&mut reader)?;
            let report = ScanReport {
                path: reader.path().to_path_buf(),
                total_payload_bytes: rows.iter().map(|row| row.payload_len as u64).sum(),
                rows,
                end,
                error,
            };
            let exit = if report.end == EndKind::Corrupt { 1 } else { 0 };
            if args.json {
                print_json(&report)?;
            } else {
                report.print_human();
            }
            Ok(exit)
        }
        Command::Verify(args) => {
            let mut reader = args.open()?;
            let report = verify(&mut reader)?;
            let exit = if report.ok { 0 } else { 1 };
            if args.json {
                print_json(&report)?;
            } else {
                report.print_human();
            }
            Ok(exit)
        }
    }
}

/// Reads rows until the end of the stream. Corruption stops the pass and is
/// reported rather than propagated; other errors (I/O) are propagated.
fn scan_pass(
    reader: &mut DiagCacheReader<RnsCodec>,
) -> Result<(Vec<RowSummary>, EndKind, Option<String>)> {
    let mut rows = Vec::new();
    loop {
        match reader.read_diag() {
            Ok(Some(row)) => {
                let summary = RowSummary::new(rows.len() as u64, &row, reader);
                tracing::debug!(
                    target: "bsgs.cli",
                    row = summary.index,
                    shift = summary.shift,
                    digest = %summary.digest.to_hex(),
                    "read row"
                );
                rows.push(summary);
            }
            Ok(None) => {
                let end = reader.end_of_stream().map_or(EndKind::Clean, EndKind::from);
                return Ok((rows, end, None));
            }
            Err(err) if err.is_corruption() => {
                tracing::warn!(
                    target: "bsgs.cli",
                    path = %reader.path().display(),
                    rows_read = rows.len(),
                    error = %err,
                    "scan stopped at corrupt data"
                );
                return Ok((rows, EndKind::Corrupt, Some(err.to_string())));
            }
            Err(err) => return Err(anyhow::Error::new(err).context("failed to read row")),
        }
    }
}

fn verify(reader: &mut DiagCacheReader<RnsCodec>) -> Result<VerifyReport> {
    let path = reader.path().to_path_buf();
    let (first, end, error) = scan_pass(reader)?;
    if error.is_some() {
        return Ok(VerifyReport {
            path,
            rows: first.len(),
            passes_agree: false,
            end,
            ok: false,
            error,
        });
    }

    reader.reset().map_err(reset_error)?;
    let (second, second_end, second_error) = scan_pass(reader)?;
    let passes_agree = first == second && end == second_end;
    if !passes_agree {
        tracing::warn!(
            target: "bsgs.cli",
            path = %path.display(),
            first_rows = first.len(),
            second_rows = second.len(),
            "replay after reset differs from the first pass"
        );
    }

    Ok(VerifyReport {
        path,
        rows: first.len(),
        passes_agree,
        end: second_end,
        ok: passes_agree && second_error.is_none() && second_end == EndKind::Clean,
        error: second_error,
    })
}

fn reset_error(err: DiagCacheError) -> anyhow::Error {
    anyhow::Error::new(err).context("failed to rewind cache file")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
