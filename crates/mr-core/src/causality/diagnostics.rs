//! Descriptive pair diagnostics reported next to the tests.

use mr_common::Segment;
use mr_math::descriptive::pearson;
use serde::{Deserialize, Serialize};

use super::align::valid_rows;

/// `counts[s][t]`: rows where the source is in `s` and the target in `t`.
pub fn co_occurrence(
    source: &[usize],
    target: &[usize],
    k_source: usize,
    k_target: usize,
) -> Vec<Vec<u64>> {
    let mut counts = vec![vec![0u64; k_target]; k_source];
    for (&s, &t) in source.iter().zip(target) {
        if s < k_source && t < k_target {
            counts[s][t] += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCorrelation {
    pub source_column: String,
    pub target_column: String,
    /// `-L..=L`; positive means the target trails the source.
    pub lags: Vec<i64>,
    /// NaN where either side is constant over the aligned rows.
    pub values: Vec<f64>,
}

/// `corr(target[t], source[t - lag])` for every lag in `-max_lag..=max_lag`,
/// over rows whose partner lies in the same segment.
pub fn lagged_cross_correlation(
    source: &[f64],
    target: &[f64],
    segments: &[Segment],
    max_lag: usize,
) -> (Vec<i64>, Vec<f64>) {
    let max = max_lag as i64;
    let lags: Vec<i64> = (-max..=max).collect();
    let values = lags
        .iter()
        .map(|&lag| {
            let depth = lag.unsigned_abs() as usize;
            let rows = valid_rows(segments, depth);
            let (a, b): (Vec<f64>, Vec<f64>) = if lag >= 0 {
                rows.iter().map(|&t| (target[t], source[t - depth])).unzip()
            } else {
                rows.iter().map(|&t| (target[t - depth], source[t])).unzip()
            };
            pearson(&a, &b)
        })
        .collect();
    (lags, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_common::segments_from_lengths;

    #[test]
    fn co_occurrence_counts() {
        let c = co_occurrence(&[0, 0, 1, 1], &[1, 1, 0, 1], 2, 2);
        assert_eq!(c, vec![vec![0, 2], vec![1, 1]]);
    }

    #[test]
    fn peak_at_the_planted_lag() {
        let source: Vec<f64> = (0..200).map(|i| ((i * 37) % 11) as f64).collect();
        let mut target = vec![0.0; 200];
        for t in 2..200 {
            target[t] = source[t - 2];
        }
        let (lags, values) =
            lagged_cross_correlation(&source, &target, &segments_from_lengths(&[200]), 3);
        assert_eq!(lags, vec![-3, -2, -1, 0, 1, 2, 3]);
        assert!((values[5] - 1.0).abs() < 1e-12);
        assert!(values[1] < 0.9);
    }
}
