//! Lead/lag evidence between two instruments' regime series.
//!
//! Three independent tests, each evaluated per direction and lag:
//! - Granger F test on posterior columns ([`granger`])
//! - Nested Markov likelihood-ratio test on hard labels ([`markov`])
//! - Conditional mutual information with a permutation null ([`cmi`])
//!
//! A cell that cannot be computed is kept as [`mr_common::CellOutcome::Skipped`]
//! and the grid carries on. Only malformed inputs are errors.

pub mod align;
pub mod cmi;
pub mod diagnostics;
pub mod engine;
pub mod granger;
pub mod markov;

pub use align::{intersect_timestamps, segments_of_selection, valid_rows, AlignedPair, RegimeSeries};
pub use cmi::{cmi_permutation_test, CmiResult};
pub use diagnostics::{co_occurrence, lagged_cross_correlation, CrossCorrelation};
pub use engine::{CausalReport, CausalSignificanceEngine, PairDiagnostics, LABEL_COLUMN};
pub use granger::granger_test;
pub use markov::markov_lrt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CausalError {
    #[error("source has {source_rows} rows but target has {target_rows}")]
    LengthMismatch { source_rows: usize, target_rows: usize },

    #[error("series '{series}' has {labels} labels but {posterior_rows} posterior rows")]
    ShapeMismatch {
        series: String,
        labels: usize,
        posterior_rows: usize,
    },

    #[error("no rows to test")]
    Empty,

    #[error("invalid segments: {0}")]
    InvalidSegments(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl From<CausalError> for mr_common::Error {
    fn from(err: CausalError) -> Self {
        match err {
            CausalError::LengthMismatch {
                source_rows,
                target_rows,
            } => mr_common::Error::LengthMismatch {
                what: "source vs target rows".into(),
                left: source_rows,
                right: target_rows,
            },
            CausalError::ThreadPool(msg) => mr_common::Error::Config(msg),
            other => mr_common::Error::InvalidData(other.to_string()),
        }
    }
}
