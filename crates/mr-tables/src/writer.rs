//! Batched, partitioned Parquet writer.
//!
//! Each run writes one file per table under
//! `<base>/table=<name>/date=<YYYY-MM-DD>/<name>_<run_id>.parquet`. Files are
//! written to a `.tmp` sibling and renamed into place on close, so readers
//! never observe a partial file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use tracing::info;

use crate::error::{Result, TableError};
use crate::schema::TableName;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Root directory of the table tree.
    pub base_dir: PathBuf,
    pub compression: Compression,
    /// Maximum rows per row group.
    pub row_group_rows: usize,
    /// Rows to buffer before flushing.
    pub batch_size: usize,
    /// Run that owns the output files.
    pub run_id: String,
}

impl WriterConfig {
    pub fn new(base_dir: PathBuf, run_id: impl Into<String>) -> Self {
        WriterConfig {
            base_dir,
            compression: Compression::ZSTD(ZstdLevel::try_new(3).unwrap_or_default()),
            row_group_rows: 128 * 1024,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            run_id: run_id.into(),
        }
    }

    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_row_group_rows(mut self, rows: usize) -> Self {
        self.row_group_rows = rows;
        self
    }
}

/// Batched writer for a single table file.
pub struct BatchedWriter {
    table: TableName,
    schema: Arc<Schema>,
    config: WriterConfig,
    buffer: Vec<RecordBatch>,
    rows_buffered: usize,
    rows_written: usize,
    output_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    writer: Option<ArrowWriter<File>>,
}

impl BatchedWriter {
    pub fn new(table: TableName, schema: Arc<Schema>, config: WriterConfig) -> Self {
        BatchedWriter {
            table,
            schema,
            config,
            buffer: Vec::new(),
            rows_buffered: 0,
            rows_written: 0,
            output_path: None,
            temp_path: None,
            writer: None,
        }
    }

    /// Buffers a batch, flushing once `batch_size` rows are pending.
    pub fn write(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema().fields() != self.schema.fields() {
            return Err(TableError::Arrow(arrow::error::ArrowError::SchemaError(format!(
                "batch does not match the {} schema",
                self.table
            ))));
        }
        self.rows_buffered += batch.num_rows();
        self.buffer.push(batch);
        if self.rows_buffered >= self.config.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.writer.is_none() {
            self.init_writer()?;
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for batch in self.buffer.drain(..) {
            writer.write(&batch)?;
            self.rows_written += batch.num_rows();
        }
        self.rows_buffered = 0;
        Ok(())
    }

    /// Finalizes the file and moves it into place.
    pub fn close(mut self) -> Result<PathBuf> {
        if self.writer.is_none() && self.buffer.is_empty() {
            return Err(TableError::EmptyBuffer);
        }
        self.flush()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        let (Some(temp_path), Some(output_path)) = (self.temp_path.take(), self.output_path.take())
        else {
            return Err(TableError::EmptyBuffer);
        };
        fs::rename(&temp_path, &output_path)?;

        info!(
            event = "table.written",
            table = %self.table,
            rows = self.rows_written,
            path = %output_path.display(),
            "table written"
        );
        Ok(output_path)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    fn init_writer(&mut self) -> Result<()> {
        let output_path = self.build_output_path();
        if output_path.exists() {
            return Err(TableError::AlreadyExists(output_path.display().to_string()));
        }
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = output_path.with_extension("parquet.tmp");
        let file = File::create(&temp_path)?;

        let props = WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_rows)
            .set_dictionary_enabled(true)
            .build();

        self.writer = Some(ArrowWriter::try_new(file, self.schema.clone(), Some(props))?);
        self.temp_path = Some(temp_path);
        self.output_path = Some(output_path);
        Ok(())
    }

    fn build_output_path(&self) -> PathBuf {
        let today = chrono::Utc::now().format("%Y-%m-%d");
        self.config
            .base_dir
            .join(format!("table={}", self.table.as_str()))
            .join(format!("date={today}"))
            .join(format!("{}_{}.parquet", self.table.as_str(), self.config.run_id))
    }
}

impl Drop for BatchedWriter {
    fn drop(&mut self) {
        // A writer dropped without close() leaves no partial output behind.
        if let Some(temp) = self.temp_path.take() {
            self.writer.take();
            let _ = fs::remove_file(temp);
        }
    }
}

/// Writes one batch as a complete table file for `run_id`.
pub fn write_table(
    base_dir: &Path,
    table: TableName,
    run_id: &str,
    batch: RecordBatch,
) -> Result<PathBuf> {
    let config = WriterConfig::new(base_dir.to_path_buf(), run_id)
        .with_row_group_rows(table.row_group_rows());
    let mut writer = BatchedWriter::new(table, batch.schema(), config);
    writer.write(batch)?;
    writer.close()
}

/// Every finished Parquet file of `table` under `base_dir`, sorted by path.
pub fn list_table_files(base_dir: &Path, table: TableName) -> Result<Vec<PathBuf>> {
    let root = base_dir.join(format!("table={}", table.as_str()));
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    for partition in fs::read_dir(&root)? {
        let partition = partition?.path();
        if !partition.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&partition)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "parquet") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Default table directory under the XDG data dir.
pub fn default_tables_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("microregime")
        .join("tables")
}
