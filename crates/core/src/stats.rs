//! Score statistics
//!
//! Summary statistics over a query's final score list, consumed by the
//! answerability guardrail and surfaced in audit records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Percentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScoreStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std_dev: f64,
    pub count: usize,
    pub percentiles: Percentiles,
}

impl ScoreStats {
    /// Compute statistics over a score list. Percentiles use linear
    /// interpolation on the ascending sort; the empty list yields the zero
    /// stats.
    pub fn compute(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let count = scores.len();
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = sorted.iter().sum();
        let mean = sum / count as f64;
        let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            mean,
            max: sorted[count - 1],
            min: sorted[0],
            std_dev: variance.sqrt(),
            count,
            percentiles: Percentiles {
                p25: percentile(&sorted, 0.25),
                p50: percentile(&sorted, 0.50),
                p75: percentile(&sorted, 0.75),
                p90: percentile(&sorted, 0.90),
            },
        }
    }

    /// Compact form for audit records.
    pub fn summary(&self) -> String {
        format!(
            "n={} mean={:.3} max={:.3} min={:.3} std={:.3}",
            self.count, self.mean, self.max, self.min, self.std_dev
        )
    }
}

/// Linear-interpolated percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scores() {
        let stats = ScoreStats::compute(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn test_single_score_zero_stddev() {
        let stats = ScoreStats::compute(&[0.7]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.percentiles.p50, 0.7);
        assert_eq!(stats.percentiles.p90, 0.7);
    }

    #[test]
    fn test_basic_stats() {
        let stats = ScoreStats::compute(&[0.2, 0.4, 0.6, 0.8]);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert_eq!(stats.max, 0.8);
        assert_eq!(stats.min, 0.2);
        // Population std dev of {0.2, 0.4, 0.6, 0.8}
        assert!((stats.std_dev - 0.22360679774997896).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolation() {
        let stats = ScoreStats::compute(&[0.0, 1.0]);
        assert!((stats.percentiles.p25 - 0.25).abs() < 1e-12);
        assert!((stats.percentiles.p50 - 0.5).abs() < 1e-12);
        assert!((stats.percentiles.p90 - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_unsorted_input() {
        let stats = ScoreStats::compute(&[0.9, 0.1, 0.5]);
        assert_eq!(stats.min, 0.1);
        assert_eq!(stats.max, 0.9);
        assert_eq!(stats.percentiles.p50, 0.5);
    }
}
