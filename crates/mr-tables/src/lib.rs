//! Microregime table storage.
//!
//! This crate provides:
//! - Arrow schema definitions for the output tables
//! - Record batch builders for decoded series, model runs and causal results
//! - Batched, partitioned Parquet writer with compression
//! - CSV/Parquet readers for input feature tables
//! - CSV export and terminal rendering

pub mod error;
pub mod export;
pub mod reader;
pub mod records;
pub mod schema;
pub mod writer;

pub use arrow::array::RecordBatch;
pub use error::{Result, TableError};
pub use export::{raw_to_batch, render, write_csv};
pub use reader::{read_csv_batches, read_parquet_batches, read_table, TableFormat};
pub use records::{causality_results_batch, model_runs_batch, ModelRunRecord, RegimeRows};
pub use schema::{
    causality_results_schema, model_runs_schema, posterior_column, regime_rows_schema, TableName,
};
pub use writer::{default_tables_dir, list_table_files, write_table, BatchedWriter, WriterConfig};

/// Schema version for output tables.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default rows buffered before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
