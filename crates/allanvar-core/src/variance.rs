//! Normalising and merging partial non-overlapping Allan variance estimates.

use serde::{Deserialize, Serialize};

/// A non-overlapping Allan variance computed over `clusters` clusters.
///
/// `clusters` is the weight used when two estimates are merged.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialEstimate {
    pub variance: f64,
    pub clusters: usize,
}

impl PartialEstimate {
    /// The empty estimate `(0, 0)`; merging with it changes nothing.
    pub const EMPTY: Self = Self {
        variance: 0.0,
        clusters: 0,
    };

    pub fn new(variance: f64, clusters: usize) -> Self {
        Self { variance, clusters }
    }

    /// Estimate for a raw squared-difference sum over `clusters` clusters.
    pub fn from_sum(sum_sq_diff: f64, clusters: usize) -> Self {
        Self::new(normalize(sum_sq_diff, clusters), clusters)
    }

    /// Recover the squared-difference sum this estimate was normalised from.
    pub fn sum_sq_diff(&self) -> f64 {
        2.0 * self.clusters.saturating_sub(1) as f64 * self.variance
    }

    pub fn is_empty(&self) -> bool {
        self.clusters == 0
    }
}

/// `sum / (2 (K - 1))`.
///
/// Fewer than two clusters have no consecutive difference, so the variance is
/// defined as 0 for `K <= 1`.
pub fn normalize(sum_sq_diff: f64, clusters: usize) -> f64 {
    if clusters <= 1 {
        return 0.0;
    }
    sum_sq_diff / (2.0 * (clusters - 1) as f64)
}

/// Combine two estimates over adjacent segments into one.
///
/// `boundary_correction` is the squared difference between the last cluster
/// mean of `first` and the first cluster mean of `second`, the one term
/// neither segment's own sum contains. With it the result equals a single
/// pass over the concatenation; with 0 it is a weighted average.
///
/// The merged weight is `K1 + K2`. Merges with boundary correction are only
/// exact when applied in arrival order.
pub fn merge(
    first: PartialEstimate,
    second: PartialEstimate,
    boundary_correction: f64,
) -> PartialEstimate {
    let clusters = first.clusters + second.clusters;
    let denom = 2.0 * clusters.saturating_sub(1) as f64;
    let variance = if denom > 0.0 {
        (first.sum_sq_diff() + second.sum_sq_diff() + boundary_correction) / denom
    } else {
        0.0
    };
    PartialEstimate { variance, clusters }
}
