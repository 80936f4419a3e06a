//! Property-based tests for model and test invariants.

mod support;

use mr_common::segments_from_lengths;
use mr_core::causality::{cmi_permutation_test, markov_lrt};
use mr_core::hmm::{GaussianHmm, HmmError};
use mr_core::pipeline::synthetic_model;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn fitted_transition_rows_are_stochastic(
        seed in any::<u64>(),
        rows in 80usize..300,
        states in 2usize..4,
    ) {
        let truth = synthetic_model(states, 2).unwrap();
        let (data, _) = truth.sample(rows, seed).unwrap();
        let options = support::fit_options(states, seed);
        match GaussianHmm::fit(&data, &options) {
            Ok((model, report)) => {
                prop_assert!(report.is_monotone());
                for row in model.transition_matrix() {
                    prop_assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
                    prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                }
                prop_assert!((model.startprob().iter().sum::<f64>() - 1.0).abs() < 1e-9);
                let posteriors = model.predict_proba(&data).unwrap();
                for row in posteriors.rows() {
                    prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                }
            }
            // A short run may leave a state without support; that must be
            // reported, never papered over.
            Err(e) => prop_assert!(matches!(
                e,
                HmmError::EmptyState { .. } | HmmError::SingularCovariance { .. }
            ), "unexpected error: {:?}", e),
        }
    }

    #[test]
    fn cmi_p_value_is_a_probability(
        target in prop::collection::vec(0usize..3, 20..200),
        seed in any::<u64>(),
        lag in 1usize..4,
    ) {
        let source: Vec<usize> = target.iter().rev().copied().collect();
        let segs = segments_from_lengths(&[target.len()]);
        if let Ok(result) = cmi_permutation_test(&target, &source, &segs, lag, 50, seed) {
            prop_assert!((0.0..=1.0).contains(&result.p_value));
            prop_assert!(result.observed >= -1e-12);
        }
    }

    #[test]
    fn lrt_p_value_is_a_probability(
        target in prop::collection::vec(0usize..3, 20..200),
        lag in 1usize..4,
    ) {
        let source: Vec<usize> = target.iter().map(|&t| (t + 1) % 3).rev().collect();
        let segs = segments_from_lengths(&[target.len()]);
        let outcome = markov_lrt(&target, &source, 3, 3, &segs, lag);
        if let Some(p) = outcome.p_value() {
            prop_assert!((0.0..=1.0).contains(&p));
            prop_assert!(outcome.statistic().unwrap() >= -1e-9);
        }
    }
}
