//! Gaussian hidden Markov model over segmented feature matrices.
//!
//! # Model
//!
//! - K latent regimes, fixed a priori
//! - Emissions `x_t | s_t = k ~ N(μ_k, Σ_k)` with full or diagonal `Σ_k`
//! - First-order transitions `A[i][j] = P(s_t = j | s_{t-1} = i)`
//! - Every segment restarts from the initial distribution `π`
//!
//! Fitting is Baum–Welch. The E-step runs independently per segment on the
//! rayon pool and reduces sufficient statistics; the M-step is sequential.
//! Log-likelihood must not decrease between iterations: a decrease is a
//! failure, never a warning.

pub mod algorithms;
pub mod align;
pub mod emission;
pub mod init;
pub mod model;

pub use align::{align_labels, LabelAlignment};
pub use emission::GaussianEmission;
pub use model::{model_selection, FitOptions, FitReport, GaussianHmm};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HmmError {
    #[error("covariance of state {state} is singular")]
    SingularCovariance { state: usize },

    #[error("state {state} received no posterior mass at iteration {iteration}")]
    EmptyState { state: usize, iteration: usize },

    #[error("log-likelihood decreased at iteration {iteration}: {previous} -> {current}")]
    LikelihoodDecreased {
        iteration: usize,
        previous: f64,
        current: f64,
    },

    #[error("log-likelihood is not finite at iteration {iteration}")]
    NonFiniteLikelihood { iteration: usize },

    #[error("{rows} rows cannot support {states} states")]
    InsufficientData { rows: usize, states: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("observation at row {row} has zero probability under every state")]
    ImpossibleObservation { row: usize },

    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, HmmError>;

impl From<HmmError> for mr_common::Error {
    fn from(err: HmmError) -> Self {
        use mr_common::Error;
        match err {
            HmmError::SingularCovariance { state } => Error::SingularCovariance { state },
            HmmError::LikelihoodDecreased {
                iteration,
                previous,
                current,
            } => Error::LikelihoodDecreased {
                iteration,
                previous,
                current,
            },
            HmmError::DimensionMismatch { expected, actual } => Error::InconsistentWidth {
                expected,
                actual,
                segment: 0,
            },
            HmmError::InsufficientData { .. } => Error::InvalidData(err.to_string()),
            HmmError::InvalidParameters(msg) => Error::SchemaValidation(msg),
            other => Error::Numerical(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerical_failures_keep_their_category() {
        let e: mr_common::Error = HmmError::EmptyState {
            state: 1,
            iteration: 3,
        }
        .into();
        assert_eq!(e.category(), mr_common::ErrorCategory::Numerical);
        let e: mr_common::Error = HmmError::SingularCovariance { state: 2 }.into();
        assert_eq!(e.code(), 30);
        let e: mr_common::Error = HmmError::NonFiniteLikelihood { iteration: 4 }.into();
        assert_eq!(e.category(), mr_common::ErrorCategory::Numerical);
        assert!(e.to_string().contains("not finite at iteration 4"));
    }
}
