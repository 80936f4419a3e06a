//! Untyped column tables as read from disk, before feature selection.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Floating point values; nulls are NaN.
    Float(Vec<f64>),
    /// Integers without nulls (timestamps, session ids).
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnData::Text(_))
    }

    /// Numeric view; integers widen to `f64`.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            ColumnData::Float(v) => Some(v.clone()),
            ColumnData::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ColumnData::Text(_) => None,
        }
    }

    /// A key per row such that equal keys mean equal values, used to find
    /// runs of a grouping column.
    pub fn group_keys(&self) -> Vec<String> {
        match self {
            ColumnData::Float(v) => v.iter().map(|x| x.to_bits().to_string()).collect(),
            ColumnData::Int(v) => v.iter().map(|x| x.to_string()).collect(),
            ColumnData::Text(v) => v.clone(),
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Int(v) => ColumnData::Int(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub data: ColumnData,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    n_rows: usize,
    columns: Vec<RawColumn>,
}

impl RawTable {
    pub fn new(columns: Vec<RawColumn>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |c| c.data.len());
        for col in &columns {
            if col.data.len() != n_rows {
                return Err(Error::LengthMismatch {
                    what: format!("column '{}'", col.name),
                    left: n_rows,
                    right: col.data.len(),
                });
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::InvalidData(format!("duplicate column '{}'", col.name)));
            }
        }
        Ok(Self { n_rows, columns })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`column`](Self::column), but a missing column is an error.
    pub fn require(&self, name: &str) -> Result<&RawColumn> {
        self.column(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Keeps only the rows whose `column` equals `value` as text.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<RawTable> {
        let keys = match &self.require(column)?.data {
            ColumnData::Text(v) => v.clone(),
            other => other.group_keys(),
        };
        let rows: Vec<usize> = keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.as_str() == value)
            .map(|(i, _)| i)
            .collect();
        Ok(self.select_rows(&rows))
    }

    pub fn select_rows(&self, rows: &[usize]) -> RawTable {
        RawTable {
            n_rows: rows.len(),
            columns: self
                .columns
                .iter()
                .map(|c| RawColumn::new(c.name.clone(), c.data.select(rows)))
                .collect(),
        }
    }
}
