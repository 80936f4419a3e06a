//! Microregime common types, IDs, and errors.
//!
//! This crate provides the in-memory data model shared by every stage of
//! the pipeline:
//! - Feature matrices partitioned into independent segments
//! - Regime label sequences and posterior matrices
//! - Versioned Gaussian HMM parameters and model summaries
//! - Causal test results with explicit skipped cells
//! - The unified error type with stable codes

pub mod causal;
pub mod error;
pub mod id;
pub mod matrix;
pub mod output;
pub mod projection;
pub mod raw;
pub mod regime;

pub use causal::{
    compare_results, sort_results, CausalTestKind, CausalTestResult, CellOutcome, Direction,
    SkipReason,
};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::RunId;
pub use matrix::{segments_from_lengths, FeatureMatrix, Segment};
pub use output::OutputFormat;
pub use projection::Projection;
pub use raw::{ColumnData, RawColumn, RawTable};
pub use regime::{
    CovarianceType, ModelSummary, PosteriorMatrix, RegimeModelParameters, RegimeSequence,
    PARAMETERS_FORMAT_VERSION,
};
