//! Regime run lengths.

use mr_common::Segment;
use mr_math::descriptive::{mean, median};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDuration {
    pub regime: usize,
    pub runs: usize,
    /// `None` when the regime never occurs.
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

/// Maximal constant-label runs, as `(label, length)`, never spanning a
/// segment boundary.
pub fn label_runs(labels: &[usize], segments: &[Segment]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    for seg in segments {
        let slice = &labels[seg.range()];
        let mut iter = slice.iter();
        let Some(&first) = iter.next() else {
            continue;
        };
        let (mut current, mut len) = (first, 1usize);
        for &l in iter {
            if l == current {
                len += 1;
            } else {
                runs.push((current, len));
                current = l;
                len = 1;
            }
        }
        runs.push((current, len));
    }
    runs
}

/// Mean and median run length for each of `n_states` regimes.
pub fn regime_durations(
    labels: &[usize],
    segments: &[Segment],
    n_states: usize,
) -> Vec<RegimeDuration> {
    let mut lengths: Vec<Vec<f64>> = vec![Vec::new(); n_states];
    for (label, len) in label_runs(labels, segments) {
        if label < n_states {
            lengths[label].push(len as f64);
        }
    }
    lengths
        .into_iter()
        .enumerate()
        .map(|(regime, l)| RegimeDuration {
            regime,
            runs: l.len(),
            mean: (!l.is_empty()).then(|| mean(&l)),
            median: (!l.is_empty()).then(|| median(&l)),
        })
        .collect()
}
