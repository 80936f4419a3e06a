//! Matching fitted state indices to a reference labeling.
//!
//! HMM states are only identified up to permutation, so comparing a decoded
//! sequence against known regimes needs the relabeling that maximizes
//! agreement.

use serde::{Deserialize, Serialize};

/// Above this many states the search falls back to greedy matching.
const EXHAUSTIVE_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAlignment {
    /// `mapping[predicted] = reference`.
    pub mapping: Vec<usize>,
    /// Fraction of positions that agree after relabeling.
    pub accuracy: f64,
}

impl LabelAlignment {
    pub fn apply(&self, labels: &[usize]) -> Vec<usize> {
        labels.iter().map(|&l| self.mapping[l]).collect()
    }
}

/// Best relabeling of `predicted` onto `reference`, both over `k` states.
///
/// Sequences must have equal length and labels below `k`.
pub fn align_labels(reference: &[usize], predicted: &[usize], k: usize) -> LabelAlignment {
    let n = reference.len().min(predicted.len());
    let mut confusion = vec![0usize; k * k];
    for (&r, &p) in reference.iter().zip(predicted) {
        if r < k && p < k {
            confusion[p * k + r] += 1;
        }
    }
    let mapping = if k <= EXHAUSTIVE_LIMIT {
        exhaustive(&confusion, k)
    } else {
        greedy(&confusion, k)
    };
    let agree: usize = mapping
        .iter()
        .enumerate()
        .map(|(p, &r)| confusion[p * k + r])
        .sum();
    LabelAlignment {
        mapping,
        accuracy: if n == 0 { 0.0 } else { agree as f64 / n as f64 },
    }
}

fn exhaustive(confusion: &[usize], k: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..k).collect();
    let mut best = perm.clone();
    let mut best_score = score(confusion, k, &perm);
    // Heap's algorithm, iterative.
    let mut c = vec![0usize; k];
    let mut i = 0;
    while i < k {
        if c[i] < i {
            if i % 2 == 0 {
                perm.swap(0, i);
            } else {
                perm.swap(c[i], i);
            }
            let s = score(confusion, k, &perm);
            if s > best_score {
                best_score = s;
                best.clone_from(&perm);
            }
            c[i] += 1;
            i = 0;
        } else {
            c[i] = 0;
            i += 1;
        }
    }
    best
}

fn greedy(confusion: &[usize], k: usize) -> Vec<usize> {
    let mut cells: Vec<(usize, usize, usize)> = (0..k)
        .flat_map(|p| (0..k).map(move |r| (confusion[p * k + r], p, r)))
        .collect();
    cells.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    let mut mapping = vec![usize::MAX; k];
    let mut taken = vec![false; k];
    for (_, p, r) in cells {
        if mapping[p] == usize::MAX && !taken[r] {
            mapping[p] = r;
            taken[r] = true;
        }
    }
    mapping
}

fn score(confusion: &[usize], k: usize, perm: &[usize]) -> usize {
    perm.iter()
        .enumerate()
        .map(|(p, &r)| confusion[p * k + r])
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_a_pure_permutation() {
        let reference = vec![0, 0, 1, 1, 2, 2, 0];
        let predicted = vec![2, 2, 0, 0, 1, 1, 2];
        let a = align_labels(&reference, &predicted, 3);
        assert_eq!(a.mapping, vec![1, 2, 0]);
        assert_eq!(a.accuracy, 1.0);
        assert_eq!(a.apply(&predicted), reference);
    }

    #[test]
    fn partial_agreement() {
        let reference = vec![0, 0, 0, 1, 1, 1];
        let predicted = vec![1, 1, 0, 0, 0, 0];
        let a = align_labels(&reference, &predicted, 2);
        assert_eq!(a.mapping, vec![1, 0]);
        assert!((a.accuracy - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn greedy_path_for_many_states() {
        let k = 10;
        let reference: Vec<usize> = (0..100).map(|i| i % k).collect();
        let predicted: Vec<usize> = reference.iter().map(|r| (r + 3) % k).collect();
        let a = align_labels(&reference, &predicted, k);
        assert_eq!(a.accuracy, 1.0);
    }
}
