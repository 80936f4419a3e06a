//! Conversion of in-memory results into record batches.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray, UInt32Array, UInt64Array,
};
use chrono::{DateTime, Utc};
use mr_common::{CausalTestResult, CellOutcome, FeatureMatrix, PosteriorMatrix, RegimeSequence};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::schema::{causality_results_schema, model_runs_schema, regime_rows_schema};

/// Decoded series ready for the `regime_rows` table.
pub struct RegimeRows<'a> {
    pub run_id: &'a str,
    pub instrument: Option<&'a str>,
    pub features: &'a FeatureMatrix,
    pub labels: &'a RegimeSequence,
    pub posteriors: &'a PosteriorMatrix,
}

impl RegimeRows<'_> {
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let n = self.features.n_rows();
        if self.labels.len() != n || self.posteriors.n_rows() != n {
            return Err(TableError::LengthMismatch(format!(
                "{n} feature rows, {} labels, {} posterior rows",
                self.labels.len(),
                self.posteriors.n_rows()
            )));
        }
        let n_states = self.posteriors.n_states();
        let schema = regime_rows_schema(self.features.feature_names(), n_states);

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![self.run_id; n])),
            Arc::new(Int64Array::from(self.features.timestamps().to_vec())),
            Arc::new(UInt32Array::from_iter_values(
                self.features.segment_ids().into_iter().map(|s| s as u32),
            )),
            Arc::new(StringArray::from(vec![self.instrument; n])),
        ];
        for j in 0..self.features.n_features() {
            columns.push(Arc::new(Float64Array::from(self.features.column(j))));
        }
        columns.push(Arc::new(UInt32Array::from_iter_values(
            self.labels.labels().iter().map(|&k| k as u32),
        )));
        for k in 0..n_states {
            columns.push(Arc::new(Float64Array::from(self.posteriors.column(k))));
        }

        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }
}

/// One fitted model, as stored in `model_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub instrument: Option<String>,
    pub regime_count: usize,
    pub covariance_type: String,
    pub n_samples: usize,
    pub n_features: usize,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub converged: bool,
    pub iterations: usize,
    pub silhouette: Option<f64>,
    pub davies_bouldin: Option<f64>,
    pub calinski_harabasz: Option<f64>,
}

pub fn model_runs_batch(records: &[ModelRunRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.run_id.as_str()))),
        Arc::new(
            TimestampMicrosecondArray::from_iter_values(
                records.iter().map(|r| r.created_at.timestamp_micros()),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.instrument.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.regime_count as u32))),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.covariance_type.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(records.iter().map(|r| r.n_samples as u64))),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.n_features as u32))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.log_likelihood))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.aic))),
        Arc::new(Float64Array::from_iter_values(records.iter().map(|r| r.bic))),
        Arc::new(BooleanArray::from(records.iter().map(|r| r.converged).collect::<Vec<_>>())),
        Arc::new(UInt32Array::from_iter_values(records.iter().map(|r| r.iterations as u32))),
        Arc::new(Float64Array::from(records.iter().map(|r| r.silhouette).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(records.iter().map(|r| r.davies_bouldin).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.calinski_harabasz).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(Arc::new(model_runs_schema()), columns)?)
}

pub fn causality_results_batch(run_id: &str, results: &[CausalTestResult]) -> Result<RecordBatch> {
    let n = results.len();
    let strings = |f: fn(&CausalTestResult) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(results.iter().map(f)))
    };
    let computed = |f: fn(&CellOutcome) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(
            results.iter().map(|r| f(&r.outcome)).collect::<Vec<_>>(),
        ))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![run_id; n])),
        strings(|r| r.test.as_str()),
        strings(|r| r.direction.as_str()),
        strings(|r| r.source.as_str()),
        strings(|r| r.target.as_str()),
        strings(|r| r.source_column.as_str()),
        strings(|r| r.target_column.as_str()),
        Arc::new(UInt32Array::from_iter_values(results.iter().map(|r| r.lag as u32))),
        computed(|o| o.statistic()),
        computed(|o| o.p_value()),
        computed(|o| match o {
            CellOutcome::Computed { df, .. } => *df,
            CellOutcome::Skipped { .. } => None,
        }),
        strings(|r| match r.outcome {
            CellOutcome::Computed { .. } => "computed",
            CellOutcome::Skipped { .. } => "skipped",
        }),
        Arc::new(StringArray::from(
            results
                .iter()
                .map(|r| match &r.outcome {
                    CellOutcome::Skipped { reason, .. } => Some(reason.as_str()),
                    CellOutcome::Computed { .. } => None,
                })
                .collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(Arc::new(causality_results_schema()), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Float64Type;
    use mr_common::{CausalTestKind, Direction, SkipReason};

    fn result(lag: usize, outcome: CellOutcome) -> CausalTestResult {
        CausalTestResult {
            test: CausalTestKind::MarkovLrt,
            direction: Direction::SourceToTarget,
            source: "ES".into(),
            target: "NQ".into(),
            source_column: "regime".into(),
            target_column: "regime".into(),
            lag,
            outcome,
        }
    }

    #[test]
    fn regime_rows_batch_has_one_column_per_feature_and_state() {
        let features = FeatureMatrix::new(
            vec!["pc1".into()],
            vec![10, 20, 5],
            vec![0.5, -0.5, 1.0],
            &[2, 1],
        )
        .unwrap();
        let labels = RegimeSequence::new(2, vec![0, 1, 1]).unwrap();
        let posteriors = PosteriorMatrix::new(2, vec![0.9, 0.1, 0.2, 0.8, 0.0, 1.0]).unwrap();
        let batch = RegimeRows {
            run_id: "run-1",
            instrument: Some("ES"),
            features: &features,
            labels: &labels,
            posteriors: &posteriors,
        }
        .to_batch()
        .unwrap();

        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 4 + 1 + 1 + 2);
        let seg = batch.column_by_name("segment").unwrap();
        let seg = seg.as_primitive::<arrow::datatypes::UInt32Type>();
        assert_eq!(seg.values().to_vec(), vec![0, 0, 1]);
        let p1 = batch.column_by_name("posterior_1").unwrap();
        assert_eq!(p1.as_primitive::<Float64Type>().value(1), 0.8);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let features =
            FeatureMatrix::single_segment(vec!["x".into()], vec![1, 2], vec![0.0, 1.0]).unwrap();
        let labels = RegimeSequence::new(2, vec![0]).unwrap();
        let posteriors = PosteriorMatrix::new(2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let err = RegimeRows {
            run_id: "run-1",
            instrument: None,
            features: &features,
            labels: &labels,
            posteriors: &posteriors,
        }
        .to_batch()
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch(_)));
    }

    #[test]
    fn skipped_cells_have_null_statistics_and_a_reason() {
        let batch = causality_results_batch(
            "run-1",
            &[
                result(1, CellOutcome::Computed { statistic: 12.0, p_value: 0.01, df: Some(4.0) }),
                result(2, CellOutcome::skipped(SkipReason::DegenerateTable, "one state")),
            ],
        )
        .unwrap();
        let p = batch.column_by_name("p_value").unwrap();
        assert!(p.is_valid(0));
        assert!(p.is_null(1));
        let reason = batch.column_by_name("reason").unwrap();
        let reason = reason.as_string::<i32>();
        assert!(reason.is_null(0));
        assert_eq!(reason.value(1), "degenerate_table");
    }

    #[test]
    fn failed_metrics_are_null() {
        let record = ModelRunRecord {
            run_id: "run-1".into(),
            created_at: Utc::now(),
            instrument: None,
            regime_count: 1,
            covariance_type: "full".into(),
            n_samples: 100,
            n_features: 2,
            log_likelihood: -10.0,
            aic: 30.0,
            bic: 40.0,
            converged: true,
            iterations: 3,
            silhouette: None,
            davies_bouldin: None,
            calinski_harabasz: None,
        };
        let batch = model_runs_batch(&[record]).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(batch.column_by_name("silhouette").unwrap().is_null(0));
    }
}
