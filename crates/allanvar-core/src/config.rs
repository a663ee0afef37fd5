//! Run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bytes in one "block" of `blocks` / one MB of `offset_mb`.
pub const BLOCK_BYTES: f64 = 1_000_000.0;

/// Configuration for computing Allan variances over one or more files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Chunk length in 1 MB blocks. Non-positive means "whole file".
    pub blocks: f64,
    /// Smallest cluster size exponent, `T_min = 2^tmin`.
    pub tmin: u32,
    /// Fold every chunk into the previous ones with the seam correction
    /// instead of reporting each chunk on its own.
    pub summed: bool,
    /// Maximum number of chunks per file (0 = all).
    pub count: usize,
    /// Starting offset in MB.
    pub offset_mb: f64,
    /// Where to write `.dat` tables, `_INFO.txt` and `run.json`.
    pub output_dir: Option<PathBuf>,
    /// Worker threads for the per-cluster-size work within one chunk.
    pub threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            blocks: 1.0,
            tmin: 0,
            summed: false,
            count: 0,
            offset_mb: 0.0,
            output_dir: None,
            threads: 1,
        }
    }
}

impl RunConfig {
    /// Requested chunk length in whole bytes, or `None` for "whole file".
    pub fn chunk_bytes(&self) -> Option<u64> {
        let bytes = (self.blocks * BLOCK_BYTES).round() as u64;
        if self.blocks.is_finite() && bytes > 0 {
            Some(bytes)
        } else {
            None
        }
    }

    /// Starting offset in bytes. Negative offsets clamp to 0.
    pub fn offset_bytes(&self) -> u64 {
        if self.offset_mb.is_finite() && self.offset_mb > 0.0 {
            (self.offset_mb * BLOCK_BYTES).round() as u64
        } else {
            0
        }
    }

    /// Chunk length in bits as printed in reports (`#chunk size:`).
    pub fn chunk_bits(&self) -> u64 {
        self.chunk_bytes().map_or(0, |b| b * 8)
    }

    pub fn offset_bits(&self) -> u64 {
        self.offset_bytes() * 8
    }

    /// At least one worker.
    pub fn workers(&self) -> usize {
        self.threads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.chunk_bytes(), Some(1_000_000));
        assert_eq!(cfg.chunk_bits(), 8_000_000);
        assert_eq!(cfg.offset_bytes(), 0);
        assert!(!cfg.summed);
        assert_eq!(cfg.workers(), 1);
    }

    #[test]
    fn test_fractional_blocks() {
        let cfg = RunConfig {
            blocks: 0.25,
            offset_mb: 1.5,
            ..Default::default()
        };
        assert_eq!(cfg.chunk_bytes(), Some(250_000));
        assert_eq!(cfg.offset_bytes(), 1_500_000);
        assert_eq!(cfg.offset_bits(), 12_000_000);
    }

    #[test]
    fn test_non_positive_blocks_mean_whole_file() {
        for blocks in [0.0, -1.0, f64::NAN, 1e-9] {
            let cfg = RunConfig {
                blocks,
                ..Default::default()
            };
            assert_eq!(cfg.chunk_bytes(), None, "blocks={blocks}");
        }
    }

    #[test]
    fn test_negative_offset_clamps() {
        let cfg = RunConfig {
            offset_mb: -3.0,
            ..Default::default()
        };
        assert_eq!(cfg.offset_bytes(), 0);
    }

    #[test]
    fn test_zero_threads_still_one_worker() {
        let cfg = RunConfig {
            threads: 0,
            ..Default::default()
        };
        assert_eq!(cfg.workers(), 1);
    }

    #[test]
    fn test_serde_roundtrip() {
        let cfg = RunConfig {
            summed: true,
            output_dir: Some(PathBuf::from("out")),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cfg);
    }
}
