//! Streaming non-overlapping Allan variance over a sequence of chunks.
//!
//! Architecture:
//! 1. Fix the set of cluster sizes once per input (powers of two)
//! 2. For each chunk, in arrival order, cluster it at every size
//! 3. Fold the chunk's estimate into the [`RunningState`]: replace it, or
//!    merge it with the seam correction when boundary-aware
//! 4. Hand the state to a [`ReportSink`] after every chunk
//!
//! Per-size work inside one chunk may run on several threads; the state is
//! only committed once every size for that chunk is done.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::cluster::{self, ClusterSum};
use crate::config::RunConfig;
use crate::error::{AllanError, Result};
use crate::report::{ChunkReport, ReportSink};
use crate::source::ChunkSource;
use crate::variance::{PartialEstimate, merge};

/// Cluster sizes `2^tmin, 2^(tmin+1), …` strictly below `chunk_len / 2`.
///
/// Every size returned leaves at least two whole clusters in the chunk.
pub fn cluster_sizes(chunk_len: usize, tmin: u32) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut exp = tmin;
    while exp < usize::BITS {
        let t = 1usize << exp;
        match t.checked_mul(2) {
            Some(twice) if twice < chunk_len => sizes.push(t),
            _ => break,
        }
        exp += 1;
    }
    sizes
}

/// Estimate every chunk of `source` with cluster sizes and mode taken from `config`.
pub fn estimate_source(
    source: &mut dyn ChunkSource,
    config: &RunConfig,
    sink: &mut dyn ReportSink,
    stop: &AtomicBool,
) -> Result<RunOutcome> {
    StreamingEstimator::from_config(source.chunk_len(), config).process_until(source, sink, stop)
}

// ---------------------------------------------------------------------------
// Running state
// ---------------------------------------------------------------------------

/// Per-cluster-size record carried between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub estimate: PartialEstimate,
    /// Mean of the last `T` samples of the previous chunk (boundary-aware runs only).
    pub last_avg: Option<f64>,
}

/// One running estimate per cluster size, keyed in ascending order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningState {
    entries: BTreeMap<usize, ClusterEntry>,
    chunks: usize,
}

impl RunningState {
    pub fn new(cluster_sizes: &[usize]) -> Self {
        Self {
            entries: cluster_sizes
                .iter()
                .map(|&t| (t, ClusterEntry::default()))
                .collect(),
            chunks: 0,
        }
    }

    /// Number of chunks folded in so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn get(&self, t: usize) -> Option<&ClusterEntry> {
        self.entries.get(&t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ClusterEntry)> {
        self.entries.iter().map(|(&t, e)| (t, e))
    }

    /// `(T, variance)` pairs in ascending `T`.
    pub fn variances(&self) -> Vec<(usize, f64)> {
        self.iter().map(|(t, e)| (t, e.estimate.variance)).collect()
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Statistics of one chunk at one cluster size.
#[derive(Debug, Clone, Copy)]
struct SizeStats {
    t: usize,
    sum: ClusterSum,
    first_avg: f64,
    last_avg: f64,
}

/// How a run over one source ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunningState,
    /// Stopped on request before the source was exhausted.
    pub cancelled: bool,
}

/// Drives cluster statistics and merging across chunks.
#[derive(Debug, Clone)]
pub struct StreamingEstimator {
    chunk_len: usize,
    cluster_sizes: Vec<usize>,
    boundary_aware: bool,
    workers: usize,
}

impl StreamingEstimator {
    pub fn new(chunk_len: usize, cluster_sizes: Vec<usize>, boundary_aware: bool) -> Self {
        Self {
            chunk_len,
            cluster_sizes,
            boundary_aware,
            workers: 1,
        }
    }

    /// Estimator for chunks of `chunk_len` samples with sizes derived from `config.tmin`.
    pub fn from_config(chunk_len: usize, config: &RunConfig) -> Self {
        Self::new(
            chunk_len,
            cluster_sizes(chunk_len, config.tmin),
            config.summed,
        )
        .with_workers(config.workers())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn cluster_sizes(&self) -> &[usize] {
        &self.cluster_sizes
    }

    pub fn boundary_aware(&self) -> bool {
        self.boundary_aware
    }

    /// Fresh state with `(0, 0)` for every cluster size.
    pub fn initial_state(&self) -> RunningState {
        RunningState::new(&self.cluster_sizes)
    }

    /// Fold one chunk into `state`.
    ///
    /// Chunks must arrive in order starting at index 0. In boundary-aware
    /// mode the accumulated cluster count stands in for `chunk_index * K`,
    /// which is the same thing while every chunk has the same length.
    /// A chunk of the wrong length is rejected before `state` is touched.
    pub fn process_one<S: Copy + Into<f64> + Sync>(
        &self,
        chunk: &[S],
        chunk_index: usize,
        mut state: RunningState,
    ) -> Result<RunningState> {
        if chunk.len() != self.chunk_len {
            return Err(AllanError::ShortChunk {
                chunk_index,
                expected: self.chunk_len,
                got: chunk.len(),
            });
        }

        for s in self.chunk_stats(chunk) {
            let current = PartialEstimate::from_sum(s.sum.sum_sq_diff, s.sum.clusters);
            let entry = state.entries.entry(s.t).or_default();
            if self.boundary_aware {
                let correction = match entry.last_avg {
                    Some(prev) if chunk_index > 0 => {
                        let d = s.first_avg - prev;
                        d * d
                    }
                    _ => 0.0,
                };
                entry.estimate = merge(entry.estimate, current, correction);
                entry.last_avg = Some(s.last_avg);
            } else {
                entry.estimate = current;
            }
        }
        state.chunks += 1;
        Ok(state)
    }

    /// Run over every chunk of `source`, reporting after each one.
    pub fn process(
        &self,
        source: &mut dyn ChunkSource,
        sink: &mut dyn ReportSink,
    ) -> Result<RunOutcome> {
        self.process_until(source, sink, &AtomicBool::new(false))
    }

    /// Like [`process`](Self::process), but checks `stop` before reading each
    /// chunk. A stopped run still returns the state accumulated so far.
    pub fn process_until(
        &self,
        source: &mut dyn ChunkSource,
        sink: &mut dyn ReportSink,
        stop: &AtomicBool,
    ) -> Result<RunOutcome> {
        let mut state = self.initial_state();
        if self.cluster_sizes.is_empty() {
            log::warn!(
                "no cluster sizes below half the chunk length ({} samples); result is empty",
                self.chunk_len
            );
            return Ok(RunOutcome {
                state,
                cancelled: false,
            });
        }

        loop {
            if stop.load(Ordering::Relaxed) {
                log::warn!("stopped after {} chunk(s)", state.chunks());
                return Ok(RunOutcome {
                    state,
                    cancelled: true,
                });
            }
            let Some(chunk) = source.next_chunk()? else {
                break;
            };
            state = self.process_one(&chunk.bits, chunk.index, state)?;
            log::debug!(
                "chunk {} at bit {} folded into {} cluster size(s)",
                chunk.index,
                chunk.position_bits,
                state.len()
            );
            sink.chunk_done(&ChunkReport {
                chunk_index: chunk.index,
                position_bits: chunk.position_bits,
                state: &state,
            })?;
        }

        Ok(RunOutcome {
            state,
            cancelled: false,
        })
    }

    fn size_stats<S: Copy + Into<f64>>(&self, chunk: &[S], t: usize) -> SizeStats {
        let sum = cluster::compute(chunk, t);
        let (first_avg, last_avg) = if self.boundary_aware {
            cluster::edge_means(chunk, t)
        } else {
            (0.0, 0.0)
        };
        SizeStats {
            t,
            sum,
            first_avg,
            last_avg,
        }
    }

    /// Statistics for every cluster size, in ascending size order.
    fn chunk_stats<S: Copy + Into<f64> + Sync>(&self, chunk: &[S]) -> Vec<SizeStats> {
        if self.workers <= 1 || self.cluster_sizes.len() <= 1 {
            return self
                .cluster_sizes
                .iter()
                .map(|&t| self.size_stats(chunk, t))
                .collect();
        }

        let per_worker = self.cluster_sizes.len().div_ceil(self.workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = self
                .cluster_sizes
                .chunks(per_worker)
                .map(|sizes| {
                    s.spawn(move || {
                        sizes
                            .iter()
                            .map(|&t| self.size_stats(chunk, t))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(stats) => stats,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryChunkSource;
    use crate::variance::normalize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Records every report it sees.
    #[derive(Default)]
    struct Recorder {
        reports: Vec<(usize, u64, Vec<(usize, f64)>)>,
    }

    impl ReportSink for Recorder {
        fn chunk_done(&mut self, report: &ChunkReport<'_>) -> Result<()> {
            self.reports.push((
                report.chunk_index,
                report.position_bits,
                report.state.variances(),
            ));
            Ok(())
        }
    }

    /// Straightforward single-pass Allan variance over the whole sequence.
    fn single_pass(bits: &[u8], t: usize) -> f64 {
        let avgs: Vec<f64> = bits
            .chunks_exact(t)
            .map(|c| c.iter().map(|&b| b as f64).sum::<f64>() / t as f64)
            .collect();
        let sum: f64 = avgs.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        normalize(sum, avgs.len())
    }

    fn random_bits(rng: &mut StdRng, n: usize) -> Vec<u8> {
        (0..n).map(|_| rng.random_range(0..2u8)).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-10 * (1.0 + a.abs().max(b.abs()))
    }

    // -----------------------------------------------------------------------
    // cluster_sizes
    // -----------------------------------------------------------------------

    #[test]
    fn test_cluster_sizes_powers_of_two_below_half() {
        assert_eq!(cluster_sizes(8, 0), vec![1, 2]);
        assert_eq!(cluster_sizes(9, 0), vec![1, 2, 4]);
        assert_eq!(cluster_sizes(64, 0), vec![1, 2, 4, 8, 16]);
        assert_eq!(cluster_sizes(64, 3), vec![8, 16]);
        assert_eq!(cluster_sizes(8_000_000, 0).last(), Some(&2_097_152));
    }

    #[test]
    fn test_cluster_sizes_leave_two_clusters() {
        for n in 1..300 {
            for t in cluster_sizes(n, 0) {
                assert!(n / t >= 2, "n={n} T={t}");
            }
        }
    }

    #[test]
    fn test_cluster_sizes_empty() {
        assert!(cluster_sizes(0, 0).is_empty());
        assert!(cluster_sizes(2, 0).is_empty());
        assert!(cluster_sizes(16, 3).is_empty());
        assert!(cluster_sizes(16, 200).is_empty());
    }

    // -----------------------------------------------------------------------
    // process_one
    // -----------------------------------------------------------------------

    #[test]
    fn test_step_chunk_variance() {
        let est = StreamingEstimator::new(8, vec![4], false);
        let state = est
            .process_one(&[0u8, 0, 0, 0, 1, 1, 1, 1], 0, est.initial_state())
            .unwrap();
        let entry = state.get(4).unwrap();
        assert!(approx(entry.estimate.variance, 0.5));
        assert_eq!(entry.estimate.clusters, 2);
        assert_eq!(state.chunks(), 1);
    }

    #[test]
    fn test_independent_mode_replaces() {
        let mut rng = StdRng::seed_from_u64(11);
        let est = StreamingEstimator::new(256, cluster_sizes(256, 0), false);
        let a = random_bits(&mut rng, 256);
        let b = random_bits(&mut rng, 256);

        let state = est.process_one(&a, 0, est.initial_state()).unwrap();
        let state = est.process_one(&b, 1, state).unwrap();
        let alone = est.process_one(&b, 0, est.initial_state()).unwrap();

        for (t, entry) in state.iter() {
            let expected = alone.get(t).unwrap();
            assert_eq!(entry.estimate, expected.estimate, "T={t}");
            assert_eq!(entry.estimate.clusters, 256 / t);
        }
    }

    #[test]
    fn test_boundary_aware_two_chunks_match_single_pass() {
        let mut rng = StdRng::seed_from_u64(0xA11A);
        for _ in 0..50 {
            let chunk_len = 64 * rng.random_range(1..9usize);
            let bits = random_bits(&mut rng, 2 * chunk_len);
            let est = StreamingEstimator::new(chunk_len, cluster_sizes(chunk_len, 0), true);

            let state = est
                .process_one(&bits[..chunk_len], 0, est.initial_state())
                .unwrap();
            let state = est.process_one(&bits[chunk_len..], 1, state).unwrap();

            for (t, entry) in state.iter() {
                if chunk_len % t != 0 {
                    continue;
                }
                let expected = single_pass(&bits, t);
                assert!(
                    approx(entry.estimate.variance, expected),
                    "chunk_len={chunk_len} T={t}: {} vs {expected}",
                    entry.estimate.variance
                );
                assert_eq!(entry.estimate.clusters, 2 * chunk_len / t);
            }
        }
    }

    #[test]
    fn test_boundary_aware_many_chunks_match_single_pass() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let chunk_len = 128;
            let n_chunks = rng.random_range(2..8usize);
            let bits = random_bits(&mut rng, n_chunks * chunk_len);
            let est = StreamingEstimator::new(chunk_len, cluster_sizes(chunk_len, 0), true);

            let mut state = est.initial_state();
            let mut last_clusters = 0;
            for (i, chunk) in bits.chunks_exact(chunk_len).enumerate() {
                state = est.process_one(chunk, i, state).unwrap();
                let clusters = state.get(1).unwrap().estimate.clusters;
                assert!(clusters > last_clusters);
                last_clusters = clusters;
            }

            for (t, entry) in state.iter() {
                assert!(approx(entry.estimate.variance, single_pass(&bits, t)), "T={t}");
            }
        }
    }

    #[test]
    fn test_wrong_length_chunk_is_rejected() {
        let est = StreamingEstimator::new(16, cluster_sizes(16, 0), true);
        let state = est.process_one(&[1u8; 16], 0, est.initial_state()).unwrap();
        let before = state.clone();
        let err = est.process_one(&[1u8; 5], 1, state.clone()).unwrap_err();
        assert!(matches!(
            err,
            AllanError::ShortChunk {
                chunk_index: 1,
                expected: 16,
                got: 5
            }
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_threads_match_sequential() {
        let mut rng = StdRng::seed_from_u64(5);
        let bits = random_bits(&mut rng, 4 * 1024);
        let sizes = cluster_sizes(1024, 0);
        let seq = StreamingEstimator::new(1024, sizes.clone(), true);
        let par = StreamingEstimator::new(1024, sizes, true).with_workers(3);

        let mut a = seq.initial_state();
        let mut b = par.initial_state();
        for (i, chunk) in bits.chunks_exact(1024).enumerate() {
            a = seq.process_one(chunk, i, a).unwrap();
            b = par.process_one(chunk, i, b).unwrap();
        }
        assert_eq!(a, b);
    }

    // -----------------------------------------------------------------------
    // process
    // -----------------------------------------------------------------------

    #[test]
    fn test_process_reports_after_every_chunk() {
        let mut rng = StdRng::seed_from_u64(9);
        let bytes: Vec<u8> = (0..12).map(|_| rng.random()).collect();
        let mut source = MemoryChunkSource::from_bytes(&bytes, 4);
        let est = StreamingEstimator::new(32, cluster_sizes(32, 0), false);
        let mut sink = Recorder::default();

        let outcome = est.process(&mut source, &mut sink).unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.state.chunks(), 3);
        assert_eq!(sink.reports.len(), 3);
        assert_eq!(
            sink.reports.iter().map(|r| r.1).collect::<Vec<_>>(),
            vec![0, 32, 64]
        );
        let ts: Vec<usize> = sink.reports[0].2.iter().map(|(t, _)| *t).collect();
        assert_eq!(ts, vec![1, 2, 4, 8]);
        assert_eq!(sink.reports[2].2, outcome.state.variances());
    }

    #[test]
    fn test_process_stop_keeps_partial_state() {
        let mut source = MemoryChunkSource::new(vec![1u8; 64], 16);
        let est = StreamingEstimator::new(16, cluster_sizes(16, 0), true);
        let mut sink = Recorder::default();
        let stop = AtomicBool::new(true);

        let outcome = est.process_until(&mut source, &mut sink, &stop).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.state.chunks(), 0);
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn test_process_empty_cluster_sizes() {
        let mut source = MemoryChunkSource::new(vec![1u8; 8], 2);
        let est = StreamingEstimator::new(2, cluster_sizes(2, 0), false);
        let mut sink = Recorder::default();

        let outcome = est.process(&mut source, &mut sink).unwrap();
        assert!(outcome.state.is_empty());
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn test_variances_never_negative() {
        let mut rng = StdRng::seed_from_u64(77);
        let bits = random_bits(&mut rng, 5 * 200);
        let est = StreamingEstimator::new(200, cluster_sizes(200, 0), true);
        let mut state = est.initial_state();
        for (i, chunk) in bits.chunks_exact(200).enumerate() {
            state = est.process_one(chunk, i, state).unwrap();
            assert!(state.variances().iter().all(|(_, v)| *v >= 0.0));
        }
    }
}
