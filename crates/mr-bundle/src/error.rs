//! Error types for bundle operations.

use thiserror::Error;

/// Errors that can occur while writing or reading a model bundle.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Checksum verification failed
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Missing required file in bundle
    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("unsupported bundle version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("corrupted manifest: {0}")]
    CorruptedManifest(String),

    /// Archive entry not listed in the manifest
    #[error("file not found in bundle: {0}")]
    FileNotFound(String),

    /// Parameters failed validation after decoding
    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),
}

impl BundleError {
    pub fn code(&self) -> u32 {
        match self {
            BundleError::Io(_) | BundleError::Zip(_) => 60,
            BundleError::Json(_) => 61,
            BundleError::ChecksumMismatch { .. } => 63,
            BundleError::MissingFile(_) | BundleError::FileNotFound(_) => 64,
            BundleError::UnsupportedVersion { .. } => 65,
            BundleError::CorruptedManifest(_) => 66,
            BundleError::InvalidParameters(_) => 67,
        }
    }
}

impl From<BundleError> for mr_common::Error {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Io(e) => mr_common::Error::Io(e),
            BundleError::Json(e) => mr_common::Error::Json(e),
            other => mr_common::Error::Artifact(other.to_string()),
        }
    }
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
