//! Exit codes for the `mr` CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: configuration and argument errors (nothing was computed)
//! - 20-29: input data errors
//! - 30-39: numerical failures (fit could not produce a valid model)
//! - 40-49: I/O and artifact errors
//! - 50+: internal errors (bugs, should be reported)

use mr_common::{Error, ErrorCategory};

/// Exit codes for `mr` operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,

    /// Configuration rejected before any computation
    ConfigError = 10,

    /// Invalid command-line arguments
    ArgsError = 11,

    /// Missing columns, inconsistent widths, bad timestamps
    DataError = 20,

    /// Singular covariance, likelihood decrease, empty state
    NumericalFailure = 30,

    /// File, bundle or table I/O failed
    IoError = 40,

    /// Internal error (bug - please report)
    InternalError = 50,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Errors the user can resolve by changing input or settings.
    pub fn is_user_error(self) -> bool {
        (10..30).contains(&self.as_i32())
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::DataError => "ERR_DATA",
            ExitCode::NumericalFailure => "ERR_NUMERICAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }

    pub fn from_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Data => ExitCode::DataError,
            ErrorCategory::Numerical => ExitCode::NumericalFailure,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        ExitCode::from_category(err.category())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
