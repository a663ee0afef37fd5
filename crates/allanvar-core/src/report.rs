//! Report sinks: where running estimates go after each chunk.
//!
//! # Table format
//!
//! ```text
//! #POSITION: 0
//! #T      avar_nonoverlap(T)
//! 1       2.498731e-01
//! 2       1.250410e-01
//! ```
//!
//! The `#POSITION` line is only part of persisted `.dat` tables; on the
//! console it is printed separately. Values use six fractional digits and a
//! signed two-digit exponent so the tables read back with any
//! whitespace-separated loader.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{AllanError, Result};
use crate::estimator::RunningState;

/// Column header for non-overlapping variance tables.
pub const VALUE_COLUMN: &str = "avar_nonoverlap(T)";

/// State after one chunk has been folded in.
#[derive(Debug, Clone, Copy)]
pub struct ChunkReport<'a> {
    pub chunk_index: usize,
    pub position_bits: u64,
    pub state: &'a RunningState,
}

/// Consumer of per-chunk results.
pub trait ReportSink {
    fn chunk_done(&mut self, report: &ChunkReport<'_>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Scientific notation with six fractional digits, e.g. `2.500000e-01`.
pub fn format_sci(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let s = format!("{value:.6e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// Column header line: `#T`, padding as wide as the largest `T`, value column.
pub fn table_header(state: &RunningState) -> String {
    let width = state
        .iter()
        .last()
        .map_or(1, |(t, _)| t.to_string().len());
    format!("#T{}{VALUE_COLUMN}", " ".repeat(width))
}

/// One `T value` row per cluster size, ascending, newline-terminated.
pub fn table_rows(state: &RunningState) -> String {
    let width = state
        .iter()
        .last()
        .map_or(1, |(t, _)| t.to_string().len());
    let mut out = String::new();
    for (t, entry) in state.iter() {
        out.push_str(&format!(
            "{t:<width$}  {}\n",
            format_sci(entry.estimate.variance)
        ));
    }
    out
}

/// `.dat` file name for one chunk of `source`.
///
/// Path separators in the source name are flattened to `_`.
pub fn dat_file_name(source: &Path, position_bits: u64) -> String {
    format!(
        "{}_offset={position_bits}_nonoverlap.dat",
        source.to_string_lossy().replace('/', "_")
    )
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Prints a table after every chunk to any writer (stdout by default).
pub struct TableSink<W: Write> {
    out: W,
}

impl TableSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, report: &ChunkReport<'_>) -> io::Result<()> {
        writeln!(self.out, "#")?;
        writeln!(self.out, "#POSITION: {}", report.position_bits)?;
        writeln!(self.out, "{}", table_header(report.state))?;
        write!(self.out, "{}", table_rows(report.state))?;
        self.out.flush()
    }
}

impl<W: Write> ReportSink for TableSink<W> {
    fn chunk_done(&mut self, report: &ChunkReport<'_>) -> Result<()> {
        self.write_report(report)
            .map_err(|e| AllanError::io("<output>", e))
    }
}

/// Persists one `.dat` table per chunk into a directory.
pub struct DatFileSink {
    dir: PathBuf,
    source: PathBuf,
    written: Vec<PathBuf>,
}

impl DatFileSink {
    /// Sink for tables of `source`, created under `dir` (which must exist).
    pub fn new(dir: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            source: source.into(),
            written: Vec::new(),
        }
    }

    /// Files written so far, in chunk order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ReportSink for DatFileSink {
    fn chunk_done(&mut self, report: &ChunkReport<'_>) -> Result<()> {
        let path = self
            .dir
            .join(dat_file_name(&self.source, report.position_bits));
        let write = || -> io::Result<()> {
            let mut w = BufWriter::new(File::create(&path)?);
            writeln!(w, "#POSITION: {}", report.position_bits)?;
            writeln!(w, "{}", table_header(report.state))?;
            write!(w, "{}", table_rows(report.state))?;
            w.flush()
        };
        write().map_err(|e| AllanError::io(&path, e))?;
        log::debug!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

/// Fans each report out to several sinks, in order.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for SinkSet {
    fn chunk_done(&mut self, report: &ChunkReport<'_>) -> Result<()> {
        for sink in &mut self.sinks {
            sink.chunk_done(report)?;
        }
        Ok(())
    }
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| AllanError::io(dir, e))
}
