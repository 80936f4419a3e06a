//! Reading feature tables (CSV or Parquet) into [`RawTable`]s.

use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute::{cast, concat_batches};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Float64Type, Int64Type, SchemaRef};
use mr_common::{ColumnData, RawColumn, RawTable};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::error::{Result, TableError};

/// Input formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "parquet" | "pq" => Ok(TableFormat::Parquet),
            _ => Err(TableError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Reads a whole CSV or Parquet file.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let (schema, batches) = match TableFormat::from_path(path)? {
        TableFormat::Csv => read_csv_batches(path)?,
        TableFormat::Parquet => read_parquet_batches(path)?,
    };
    let table = batches_to_raw(&schema, &batches)?;
    debug!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.columns().len(),
        "feature table read"
    );
    Ok(table)
}

/// All record batches of a CSV file, with column types inferred from the
/// full file.
pub fn read_csv_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let mut file = File::open(path)?;
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    file.rewind()?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(file)?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// All record batches of a Parquet file.
pub fn read_parquet_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Flattens batches into typed columns.
pub fn batches_to_raw(schema: &SchemaRef, batches: &[RecordBatch]) -> Result<RawTable> {
    let batch = concat_batches(schema, batches)?;
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| {
            Ok(RawColumn::new(field.name().clone(), column_data(field.name(), array)?))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RawTable::new(columns)?)
}

fn column_data(name: &str, array: &ArrayRef) -> Result<ColumnData> {
    use DataType::*;
    match array.data_type() {
        Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 | Timestamp(_, _) => {
            let ints = cast(array, &Int64)?;
            let ints = ints.as_primitive::<Int64Type>();
            if ints.null_count() == 0 {
                Ok(ColumnData::Int(ints.values().to_vec()))
            } else {
                Ok(ColumnData::Float(
                    ints.iter().map(|v| v.map_or(f64::NAN, |x| x as f64)).collect(),
                ))
            }
        }
        Float16 | Float32 | Float64 | Boolean => {
            let floats = cast(array, &Float64)?;
            let floats = floats.as_primitive::<Float64Type>();
            Ok(ColumnData::Float(
                floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
            ))
        }
        Utf8 | LargeUtf8 | Dictionary(_, _) => {
            let text = cast(array, &Utf8)?;
            let text = text.as_string::<i32>();
            Ok(ColumnData::Text(
                text.iter().map(|v| v.unwrap_or_default().to_string()).collect(),
            ))
        }
        other => Err(TableError::UnsupportedColumnType {
            column: name.to_string(),
            data_type: other.to_string(),
        }),
    }
}
