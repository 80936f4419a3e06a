//! Error types for microregime.
//!
//! Every error carries:
//! - A stable numeric code for machine parsing
//! - A category used to pick the process exit code
//! - A recoverability hint for automation
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON through [`StructuredError`]:
//! ```json
//! {
//!   "code": 30,
//!   "category": "numerical",
//!   "message": "covariance of state 2 is singular",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for microregime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected configuration; nothing was computed.
    Config,
    /// Malformed or inconsistent input data.
    Data,
    /// A computation could not produce a valid value.
    Numerical,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for microregime.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Data errors (20-29)
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("inconsistent feature width: expected {expected}, got {actual} (segment {segment})")]
    InconsistentWidth {
        expected: usize,
        actual: usize,
        segment: usize,
    },

    #[error("timestamps must strictly increase within a segment (segment {segment}, row {row})")]
    NonIncreasingTimestamp { segment: usize, row: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("length mismatch: {what} ({left} vs {right})")]
    LengthMismatch {
        what: String,
        left: usize,
        right: usize,
    },

    // Numerical errors (30-39)
    #[error("covariance of state {state} is singular")]
    SingularCovariance { state: usize },

    #[error("log-likelihood decreased at iteration {iteration}: {previous} -> {current}")]
    LikelihoodDecreased {
        iteration: usize,
        previous: f64,
        current: f64,
    },

    #[error("numerical failure: {0}")]
    Numerical(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact error: {0}")]
    Artifact(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Data errors
    /// - 30-39: Numerical errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::Unsupported(_) => 11,
            Error::SchemaValidation(_) => 12,
            Error::MissingColumn(_) => 20,
            Error::InconsistentWidth { .. } => 21,
            Error::NonIncreasingTimestamp { .. } => 22,
            Error::InvalidData(_) => 23,
            Error::LengthMismatch { .. } => 24,
            Error::SingularCovariance { .. } => 30,
            Error::LikelihoodDecreased { .. } => 31,
            Error::Numerical(_) => 32,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Artifact(_) => 62,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Unsupported(_) | Error::SchemaValidation(_) => {
                ErrorCategory::Config
            }

            Error::MissingColumn(_)
            | Error::InconsistentWidth { .. }
            | Error::NonIncreasingTimestamp { .. }
            | Error::InvalidData(_)
            | Error::LengthMismatch { .. } => ErrorCategory::Data,

            Error::SingularCovariance { .. }
            | Error::LikelihoodDecreased { .. }
            | Error::Numerical(_) => ErrorCategory::Numerical,

            Error::Io(_) | Error::Json(_) | Error::Artifact(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether rerunning with different inputs or settings may succeed.
    ///
    /// A likelihood decrease points at a numerical bug, not at the input,
    /// so it is the one numerical failure that is not recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::Unsupported(_) | Error::SchemaValidation(_) => true,

            Error::MissingColumn(_)
            | Error::InconsistentWidth { .. }
            | Error::NonIncreasingTimestamp { .. }
            | Error::InvalidData(_)
            | Error::LengthMismatch { .. } => true,

            Error::SingularCovariance { .. } => true,
            Error::LikelihoodDecreased { .. } => false,
            Error::Numerical(_) => true,

            Error::Io(_) | Error::Json(_) => true,
            Error::Artifact(_) => false,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Config => "Configuration Error",
            ErrorCategory::Data => "Input Data Error",
            ErrorCategory::Numerical => "Numerical Failure",
            ErrorCategory::Io => "I/O Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}
