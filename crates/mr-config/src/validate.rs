//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::pipeline::{MeanInit, PipelineConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 13,
            ValidationError::SemanticError(_) => 14,
            ValidationError::InvalidValue { .. } => 15,
            ValidationError::VersionMismatch { .. } => 16,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for mr_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::IoError(msg) => {
                mr_common::Error::Io(std::io::Error::other(msg))
            }
            ValidationError::VersionMismatch { .. } => {
                mr_common::Error::SchemaValidation(err.to_string())
            }
            other => mr_common::Error::Config(other.to_string()),
        }
    }
}

/// Validate a pipeline configuration semantically.
///
/// Runs once, before any data is touched.
pub fn validate_pipeline(cfg: &PipelineConfig) -> ValidationResult<()> {
    check_schema_version(&cfg.schema_version)?;

    let f = &cfg.features;
    if let Some(frac) = f.pca_variance {
        if !(frac > 0.0 && frac <= 1.0) {
            return Err(ValidationError::invalid(
                "features.pca_variance",
                format!("Must be in (0, 1], got {frac}"),
            ));
        }
    }
    if f.long_prefix.is_empty() || f.short_prefix.is_empty() {
        return Err(ValidationError::invalid(
            "features.long_prefix",
            "long and short prefixes must be non-empty",
        ));
    }
    if f.long_prefix == f.short_prefix {
        return Err(ValidationError::invalid(
            "features.short_prefix",
            "long and short prefixes must differ",
        ));
    }
    if f.timestamp_column.is_empty() {
        return Err(ValidationError::invalid(
            "features.timestamp_column",
            "Must be non-empty",
        ));
    }

    let m = &cfg.model;
    if m.n_states == 0 {
        return Err(ValidationError::invalid("model.n_states", "Must be at least 1"));
    }
    if m.n_iter == 0 {
        return Err(ValidationError::invalid("model.n_iter", "Must be at least 1"));
    }
    if !(m.tolerance > 0.0 && m.tolerance.is_finite()) {
        return Err(ValidationError::invalid(
            "model.tolerance",
            format!("Must be positive and finite, got {}", m.tolerance),
        ));
    }
    if !(m.covariance_floor >= 0.0 && m.covariance_floor.is_finite()) {
        return Err(ValidationError::invalid(
            "model.covariance_floor",
            format!("Must be non-negative, got {}", m.covariance_floor),
        ));
    }
    match (m.mean_init, &m.warm_start) {
        (MeanInit::WarmStart, None) => {
            return Err(ValidationError::SemanticError(
                "mean_init = \"warm_start\" requires model.warm_start".into(),
            ));
        }
        (init, Some(_)) if init != MeanInit::WarmStart => {
            return Err(ValidationError::SemanticError(
                "model.warm_start is only used with mean_init = \"warm_start\"".into(),
            ));
        }
        _ => {}
    }

    if matches!(cfg.quality.silhouette_sample_size, Some(n) if n < 2) {
        return Err(ValidationError::invalid(
            "quality.silhouette_sample_size",
            "Must be at least 2 when set",
        ));
    }

    let c = &cfg.causality;
    for (field, lag) in [
        ("causality.max_lag", c.max_lag),
        ("causality.markov_max_lag", c.markov_max_lag),
        ("causality.cmi_max_lag", c.cmi_max_lag),
    ] {
        if lag == 0 {
            return Err(ValidationError::invalid(field, "Must be at least 1"));
        }
    }
    if c.permutations == 0 {
        return Err(ValidationError::invalid(
            "causality.permutations",
            "Must be at least 1",
        ));
    }
    if let Some(0) = c.workers {
        return Err(ValidationError::invalid(
            "causality.workers",
            "Must be at least 1 when set",
        ));
    }
    if !(c.granger || c.markov_lrt || c.cmi) {
        return Err(ValidationError::SemanticError(
            "at least one causality test must be enabled".into(),
        ));
    }

    Ok(())
}

/// Only the major component has to match.
fn check_schema_version(actual: &str) -> ValidationResult<()> {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    if major(actual) != major(crate::CONFIG_SCHEMA_VERSION) || actual.is_empty() {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
