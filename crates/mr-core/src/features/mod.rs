//! Feature assembly: raw tables in, segmented feature matrices out.
//!
//! - Column selection against the configured drop list
//! - Long/short/average combination of horizon variants
//! - Segment detection from an optional grouping column
//! - Standardize-then-PCA projection retaining a variance fraction

pub mod builder;
pub mod pca;

pub use builder::{BuiltFeatures, FeatureMatrixBuilder};
pub use pca::{fit_projection, StandardScaler};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("column '{column}' is not numeric and is not in the drop list")]
    UnsupportedColumnType { column: String },

    #[error("column '{column}' has no matching '{expected}' column")]
    UnpairedColumn { column: String, expected: String },

    #[error("no feature columns remain after selection")]
    NoFeatureColumns,

    #[error("no rows remain after dropping {dropped} rows with missing values")]
    NoRows { dropped: usize },

    #[error("timestamp column '{column}' must hold integer nanoseconds")]
    InvalidTimestamps { column: String },

    #[error("cannot fit projection: {0}")]
    DegenerateProjection(String),

    #[error(transparent)]
    Matrix(#[from] mr_common::Error),
}

pub type Result<T> = std::result::Result<T, FeatureError>;

impl From<FeatureError> for mr_common::Error {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::Matrix(inner) => inner,
            FeatureError::MissingColumn(col) => mr_common::Error::MissingColumn(col),
            FeatureError::DegenerateProjection(msg) => mr_common::Error::Numerical(msg),
            other => mr_common::Error::InvalidData(other.to_string()),
        }
    }
}
