//! Shared fixtures for the integration tests: known-parameter HMMs and
//! label series with planted dependence.

#![allow(dead_code)]

use mr_common::{CovarianceType, PosteriorMatrix, RegimeSequence};
use mr_core::causality::RegimeSeries;
use mr_core::hmm::{FitOptions, GaussianHmm};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const TWO_STATE_TRANSITIONS: [[f64; 2]; 2] = [[0.95, 0.05], [0.10, 0.90]];
pub const TWO_STATE_MEANS: [[f64; 2]; 2] = [[-2.0, 0.0], [3.0, 2.5]];

/// Two well separated states over two features with a known transition
/// matrix.
pub fn two_state_model() -> GaussianHmm {
    GaussianHmm::new(
        CovarianceType::Full,
        TWO_STATE_MEANS.iter().map(|m| m.to_vec()).collect(),
        vec![
            DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]),
            DMatrix::from_row_slice(2, 2, &[0.8, -0.2, -0.2, 0.6]),
        ],
        vec![0.6, 0.4],
        TWO_STATE_TRANSITIONS.concat(),
    )
    .expect("valid two-state model")
}

/// Three states over five features, unit variances.
pub fn three_state_model() -> GaussianHmm {
    let means = vec![
        vec![0.0, 0.0, 0.0, 0.0, 0.0],
        vec![3.0, -3.0, 3.0, -3.0, 3.0],
        vec![-3.0, 3.0, 0.0, 3.0, -3.0],
    ];
    GaussianHmm::new(
        CovarianceType::Full,
        means,
        vec![DMatrix::identity(5, 5); 3],
        vec![1.0 / 3.0; 3],
        vec![0.96, 0.02, 0.02, 0.03, 0.94, 0.03, 0.02, 0.03, 0.95],
    )
    .expect("valid three-state model")
}

pub fn fit_options(states: usize, seed: u64) -> FitOptions {
    FitOptions {
        n_states: states,
        n_iter: 200,
        tolerance: 1e-4,
        seed,
        ..FitOptions::default()
    }
}

/// I.i.d. uniform labels.
pub fn uniform_labels(n: usize, k: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(0..k)).collect()
}

/// A target that copies `source[t - lag]` with probability `strength` and
/// is uniform noise otherwise.
pub fn lagged_copy(source: &[usize], k: usize, lag: usize, strength: f64, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..source.len())
        .map(|t| {
            if t >= lag && rng.random::<f64>() < strength {
                source[t - lag]
            } else {
                rng.random_range(0..k)
            }
        })
        .collect()
}

/// Series whose posteriors put `confidence` on the hard label and spread
/// the rest evenly.
pub fn series_from_labels(
    label: &str,
    labels: &[usize],
    k: usize,
    confidence: f64,
) -> RegimeSeries {
    let rest = if k > 1 { (1.0 - confidence) / (k - 1) as f64 } else { 0.0 };
    let mut values = Vec::with_capacity(labels.len() * k);
    for &l in labels {
        for s in 0..k {
            values.push(if k == 1 {
                1.0
            } else if s == l {
                confidence
            } else {
                rest
            });
        }
    }
    RegimeSeries::new(
        label,
        RegimeSequence::new(k, labels.to_vec()).expect("labels below k"),
        PosteriorMatrix::new(k, values).expect("rows sum to one"),
    )
    .expect("consistent series")
}

/// Maximum absolute elementwise difference.
pub fn max_abs_diff(a: &[Vec<f64>], b: &[Vec<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .flat_map(|(x, y)| x.iter().zip(y).map(|(p, q)| (p - q).abs()))
        .fold(0.0, f64::max)
}
