//! # allanvar-core
//!
//! Non-overlapping Allan variance of bit streams too large to hold in memory.
//!
//! The stream is read in fixed-size chunks. Each chunk is clustered at every
//! cluster size `T` (powers of two), reduced to a partial variance estimate,
//! and folded into one running estimate per `T`. Folding either replaces the
//! previous estimate (each chunk stands alone) or merges it exactly, adding
//! the squared difference across the seam between consecutive chunks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use allanvar_core::{FileChunkSource, RunConfig, TableSink, estimate_source};
//!
//! let config = RunConfig { summed: true, ..Default::default() };
//! let mut source = FileChunkSource::open("noise.bin", &config).unwrap();
//! let mut sink = TableSink::stdout();
//! let outcome = estimate_source(&mut source, &config, &mut sink, &AtomicBool::new(false)).unwrap();
//! for (t, variance) in outcome.state.variances() {
//!     println!("{t} {variance}");
//! }
//! ```
//!
//! ## Architecture
//!
//! ChunkSource → StreamingEstimator (cluster → normalize → merge) → ReportSink

pub mod cluster;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fit;
pub mod report;
pub mod run;
pub mod source;
pub mod variance;

pub use cluster::{ClusterSum, compute as cluster_sum, edge_means, mean};
pub use config::RunConfig;
pub use error::{AllanError, Result};
pub use estimator::{
    ClusterEntry, RunOutcome, RunningState, StreamingEstimator, cluster_sizes, estimate_source,
};
pub use fit::{LineFit, fit_line, fit_table, log_points, read_table};
pub use report::{
    ChunkReport, DatFileSink, ReportSink, SinkSet, TableSink, dat_file_name, format_sci,
};
pub use run::{FileStatus, FileSummary, RunMeta, RunWriter, TablePoint};
pub use source::{Chunk, ChunkPlan, ChunkSource, FileChunkSource, MemoryChunkSource, unpack_bits};
pub use variance::{PartialEstimate, merge, normalize};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
