//! Run records written next to the `.dat` tables.
//!
//! # Storage Format
//!
//! The output directory contains:
//! - `_INFO.txt`: start time and the parameters every table shares
//! - `<source>_offset=<bits>_nonoverlap.dat`: one table per chunk
//! - `run.json`: run metadata and the final table of every input file

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{AllanError, Result};
use crate::estimator::RunningState;
use crate::report::ensure_dir;

pub const INFO_FILE: &str = "_INFO.txt";
pub const RUN_FILE: &str = "run.json";

// ---------------------------------------------------------------------------
// Per-file summary
// ---------------------------------------------------------------------------

/// How processing of one input file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Every planned chunk was processed.
    Ok,
    /// Stopped early on request; the table covers the chunks seen so far.
    Partial,
    /// Aborted with an error; no table.
    Failed,
}

/// One `(T, variance)` row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TablePoint {
    pub t: usize,
    pub variance: f64,
    pub clusters: usize,
}

/// Final result for one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub status: FileStatus,
    pub chunks: usize,
    pub table: Vec<TablePoint>,
    pub error: Option<String>,
}

impl FileSummary {
    pub fn completed(path: &Path, state: &RunningState, cancelled: bool) -> Self {
        Self {
            path: path.display().to_string(),
            status: if cancelled {
                FileStatus::Partial
            } else {
                FileStatus::Ok
            },
            chunks: state.chunks(),
            table: state
                .iter()
                .map(|(t, e)| TablePoint {
                    t,
                    variance: e.estimate.variance,
                    clusters: e.estimate.clusters,
                })
                .collect(),
            error: None,
        }
    }

    pub fn failed(path: &Path, err: &AllanError) -> Self {
        Self {
            path: path.display().to_string(),
            status: FileStatus::Failed,
            chunks: 0,
            table: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run metadata (run.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub config: RunConfig,
    pub files: Vec<FileSummary>,
    pub allanvar_version: String,
}

/// Writes `_INFO.txt` at the start of a run and `run.json` at the end.
pub struct RunWriter {
    dir: PathBuf,
    id: String,
    config: RunConfig,
    started_at: SystemTime,
    started_instant: Instant,
    files: Vec<FileSummary>,
}

impl RunWriter {
    /// Create `dir` if needed and write `_INFO.txt` into it.
    pub fn new(dir: impl Into<PathBuf>, config: RunConfig) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;

        let started_at = SystemTime::now();
        let since_epoch = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let info = format!(
            "Calculations started on {}\nchunk size: {}\noffset: {}\navars: nonoverlap\nsummed: {}\n",
            format_dmy(since_epoch),
            config.chunk_bits(),
            config.offset_bits(),
            config.summed,
        );
        let info_path = dir.join(INFO_FILE);
        fs::write(&info_path, info).map_err(|e| AllanError::io(&info_path, e))?;

        Ok(Self {
            dir,
            id: Uuid::new_v4().to_string(),
            config,
            started_at,
            started_instant: Instant::now(),
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&mut self, summary: FileSummary) {
        self.files.push(summary);
    }

    pub fn files(&self) -> &[FileSummary] {
        &self.files
    }

    /// Write `run.json` and return its path.
    pub fn finish(self) -> Result<PathBuf> {
        let meta = RunMeta {
            version: 1,
            id: self.id,
            started_at: format_iso8601(
                self.started_at
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default(),
            ),
            ended_at: format_iso8601(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default(),
            ),
            duration_ms: self.started_instant.elapsed().as_millis() as u64,
            config: self.config,
            files: self.files,
            allanvar_version: crate::VERSION.to_string(),
        };

        let json = serde_json::to_string_pretty(&meta)?;
        let path = self.dir.join(RUN_FILE);
        fs::write(&path, json).map_err(|e| AllanError::io(&path, e))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// `dd.mm.YYYY HH:MM:SS` (UTC).
fn format_dmy(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{day:02}.{month:02}.{year:04} {hour:02}:{min:02}:{sec:02}")
}

/// `YYYY-MM-DDTHH:MM:SSZ`.
fn format_iso8601(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Seconds since the Unix epoch to (year, month, day, hour, minute, second) UTC.
/// No leap seconds.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let feb = if is_leap(year) { 29 } else { 28 };
    let month_days: [u64; 12] = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 1u64;
    for &md in &month_days {
        if days < md {
            break;
        }
        days -= md;
        month += 1;
    }

    (year, month, days + 1, hour, min, sec)
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
