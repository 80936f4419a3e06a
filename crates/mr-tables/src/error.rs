use thiserror::Error;

/// Errors from table reading and writing.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),

    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    #[error("output already exists: {0}")]
    AlreadyExists(String),

    #[error("nothing to write")]
    EmptyBuffer,

    #[error(transparent)]
    Data(#[from] mr_common::Error),
}

impl From<TableError> for mr_common::Error {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io(e) => mr_common::Error::Io(e),
            TableError::Data(e) => e,
            TableError::UnsupportedColumnType { .. } | TableError::LengthMismatch(_) => {
                mr_common::Error::InvalidData(err.to_string())
            }
            other => mr_common::Error::Artifact(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
