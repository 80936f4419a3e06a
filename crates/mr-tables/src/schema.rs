//! Arrow schema definitions for the output tables.
//!
//! Tables defined:
//! - `regime_rows`: one row per observation with its regime and posteriors
//! - `model_runs`: one row per fitted model with fit and quality metrics
//! - `causality_results`: one row per causal test cell

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

/// Table names for output storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    RegimeRows,
    ModelRuns,
    CausalityResults,
}

impl TableName {
    pub const ALL: [TableName; 3] = [
        TableName::RegimeRows,
        TableName::ModelRuns,
        TableName::CausalityResults,
    ];

    /// Get the string name for directory layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::RegimeRows => "regime_rows",
            TableName::ModelRuns => "model_runs",
            TableName::CausalityResults => "causality_results",
        }
    }

    /// Default maximum rows per row group.
    pub fn row_group_rows(&self) -> usize {
        match self {
            TableName::RegimeRows => 128 * 1024,
            TableName::ModelRuns => 1024,
            TableName::CausalityResults => 16 * 1024,
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn timestamp_field(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        nullable,
    )
}

fn string_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

fn f64_field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Float64, nullable)
}

/// Column name of the posterior probability of `state`.
pub fn posterior_column(state: usize) -> String {
    format!("posterior_{state}")
}

/// Schema for `regime_rows`. The feature and posterior columns depend on the
/// model, so the schema is built per run.
pub fn regime_rows_schema(feature_names: &[String], n_states: usize) -> Schema {
    let mut fields = vec![
        string_field("run_id", false),
        Field::new("timestamp_ns", DataType::Int64, false),
        Field::new("segment", DataType::UInt32, false),
        string_field("instrument", true),
    ];
    fields.extend(feature_names.iter().map(|name| f64_field(name, false)));
    fields.push(Field::new("regime", DataType::UInt32, false));
    fields.extend((0..n_states).map(|k| f64_field(&posterior_column(k), false)));
    Schema::new(fields)
}

/// Schema for `model_runs`. Quality metrics are nullable: a metric that
/// failed to compute is stored as null, never as a sentinel.
pub fn model_runs_schema() -> Schema {
    Schema::new(vec![
        string_field("run_id", false),
        timestamp_field("created_at", false),
        string_field("instrument", true),
        Field::new("regime_count", DataType::UInt32, false),
        string_field("covariance_type", false),
        Field::new("n_samples", DataType::UInt64, false),
        Field::new("n_features", DataType::UInt32, false),
        f64_field("log_likelihood", false),
        f64_field("aic", false),
        f64_field("bic", false),
        Field::new("converged", DataType::Boolean, false),
        Field::new("iterations", DataType::UInt32, false),
        f64_field("silhouette", true),
        f64_field("davies_bouldin", true),
        f64_field("calinski_harabasz", true),
    ])
}

/// Schema for `causality_results`.
pub fn causality_results_schema() -> Schema {
    Schema::new(vec![
        string_field("run_id", false),
        string_field("test", false),
        string_field("direction", false),
        string_field("source", false),
        string_field("target", false),
        string_field("source_column", false),
        string_field("target_column", false),
        Field::new("lag", DataType::UInt32, false),
        f64_field("statistic", true),
        f64_field("p_value", true),
        f64_field("df", true),
        string_field("status", false),
        string_field("reason", true),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_rows_schema_tracks_model_shape() {
        let schema = regime_rows_schema(&["pc1".into(), "pc2".into()], 3);
        assert_eq!(schema.fields().len(), 4 + 2 + 1 + 3);
        assert!(schema.field_with_name("pc2").is_ok());
        assert!(schema.field_with_name("posterior_2").is_ok());
        assert!(schema.field_with_name("posterior_3").is_err());
    }

    #[test]
    fn metric_columns_are_nullable() {
        let schema = model_runs_schema();
        for name in ["silhouette", "davies_bouldin", "calinski_harabasz"] {
            assert!(schema.field_with_name(name).unwrap().is_nullable());
        }
        assert!(!schema.field_with_name("bic").unwrap().is_nullable());
    }

    #[test]
    fn table_names() {
        let names: Vec<_> = TableName::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, ["regime_rows", "model_runs", "causality_results"]);
    }
}
