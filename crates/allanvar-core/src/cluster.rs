//! Per-chunk cluster statistics.
//!
//! A chunk of `N` samples is truncated to `K * T` samples (`K = N / T`),
//! split into `K` contiguous clusters of `T` samples, and reduced to the sum
//! of squared differences between consecutive cluster means. Trailing
//! samples that do not fill a whole cluster are dropped.

/// Result of clustering one chunk at one cluster size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSum {
    /// `sum_{k=0}^{K-2} (avg[k+1] - avg[k])^2`; zero when `K < 2`.
    pub sum_sq_diff: f64,
    /// Number of whole clusters, `floor(N / T)`.
    pub clusters: usize,
}

/// Arithmetic mean of a slice of samples. Empty slices average to 0.
pub fn mean<S: Copy + Into<f64>>(samples: &[S]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples.iter().map(|&s| s.into()).sum();
    total / samples.len() as f64
}

/// Cluster `chunk` at size `t` and sum the squared first differences of the
/// cluster means.
///
/// Never fails: a chunk shorter than `2 * t` (or `t == 0`) yields a zero sum
/// together with the number of whole clusters it did contain, so callers can
/// decide what a degenerate cluster count means for them.
pub fn compute<S: Copy + Into<f64>>(chunk: &[S], t: usize) -> ClusterSum {
    if t == 0 {
        return ClusterSum {
            sum_sq_diff: 0.0,
            clusters: 0,
        };
    }
    let clusters = chunk.len() / t;
    let truncated = &chunk[..clusters * t];

    let mut sum_sq_diff = 0.0;
    let mut prev: Option<f64> = None;
    for cluster in truncated.chunks_exact(t) {
        let avg = mean(cluster);
        if let Some(p) = prev {
            let d = avg - p;
            sum_sq_diff += d * d;
        }
        prev = Some(avg);
    }

    ClusterSum {
        sum_sq_diff,
        clusters,
    }
}

/// Mean of the first `t` samples and of the last `t` samples of a chunk.
///
/// These are the seam values the boundary-aware merge needs. The tail window
/// is taken from the very end of the chunk, not from the last whole cluster.
pub fn edge_means<S: Copy + Into<f64>>(chunk: &[S], t: usize) -> (f64, f64) {
    let t = t.min(chunk.len());
    (mean(&chunk[..t]), mean(&chunk[chunk.len() - t..]))
}
