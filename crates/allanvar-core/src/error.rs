//! Error type shared by every stage of a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading, estimating, reporting or fitting.
#[derive(Error, Debug)]
pub enum AllanError {
    /// An I/O operation on `path` failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file cannot supply one full chunk starting at the requested offset.
    #[error(
        "insufficient data in {}: need {needed_bits} bits from the offset, file has {available_bits} (short by {})",
        path.display(),
        needed_bits.saturating_sub(*available_bits)
    )]
    InsufficientData {
        path: PathBuf,
        needed_bits: u64,
        available_bits: u64,
    },

    /// A chunk arrived with a different length than the run was configured for.
    #[error("insufficient data in chunk {chunk_index}: expected {expected} samples, got {got}")]
    ShortChunk {
        chunk_index: usize,
        expected: usize,
        got: usize,
    },

    /// A persisted table could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Not enough distinct points to fit a line.
    #[error("need at least 2 distinct points to fit, got {got}")]
    TooFewPoints { got: usize },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl AllanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AllanError>;
