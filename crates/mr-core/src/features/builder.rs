//! Column selection, horizon combination and segmentation.

use std::collections::HashSet;

use mr_common::{ColumnData, FeatureMatrix, Projection, RawTable};
use mr_config::{CombinationMode, FeatureConfig};
use tracing::{debug, info, warn};

use super::pca::fit_projection;
use super::{FeatureError, Result};
use crate::logging::event_names;

const AVERAGE_PREFIX: &str = "avg_";

/// Output of one assembly pass.
#[derive(Debug, Clone)]
pub struct BuiltFeatures {
    /// Matrix handed to the model (projected when a projection is set).
    pub matrix: FeatureMatrix,
    /// Combined columns before projection, used for diagnostics.
    pub combined: FeatureMatrix,
    pub projection: Option<Projection>,
    /// Rows removed because a kept feature was missing.
    pub dropped_rows: usize,
    /// Instrument label when every input row carries the same one.
    pub instrument: Option<String>,
}

/// Turns raw per-timestep tables into a [`FeatureMatrix`].
#[derive(Debug, Clone)]
pub struct FeatureMatrixBuilder {
    config: FeatureConfig,
}

/// A combination step: copy one raw column, or average two.
#[derive(Debug, Clone, PartialEq)]
enum ColumnPlan {
    Copy(String),
    Average { long: String, short: String },
}

impl FeatureMatrixBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Assembles the matrix and, when configured, fits the projection on
    /// the full batch.
    pub fn build(&self, tables: &[RawTable]) -> Result<BuiltFeatures> {
        let (combined, dropped_rows, instrument) = self.combine(tables)?;
        let projection = match self.config.pca_variance {
            Some(fraction) => {
                let proj = fit_projection(&combined, fraction)?;
                info!(
                    event = event_names::PCA_FITTED,
                    components = proj.n_components(),
                    input_features = combined.n_features(),
                    fraction,
                    "projection fitted"
                );
                Some(proj)
            }
            None => None,
        };
        let matrix = match &projection {
            Some(p) => p.transform(&combined)?,
            None => combined.clone(),
        };
        Ok(BuiltFeatures {
            matrix,
            combined,
            projection,
            dropped_rows,
            instrument,
        })
    }

    /// Assembles the matrix and applies a previously fitted projection
    /// instead of fitting a new one.
    pub fn build_with(
        &self,
        tables: &[RawTable],
        projection: Option<&Projection>,
    ) -> Result<BuiltFeatures> {
        let (combined, dropped_rows, instrument) = self.combine(tables)?;
        let matrix = match projection {
            Some(p) => p.transform(&combined)?,
            None => combined.clone(),
        };
        Ok(BuiltFeatures {
            matrix,
            combined,
            projection: projection.cloned(),
            dropped_rows,
            instrument,
        })
    }

    /// Selection and combination without projection. Each table keeps its
    /// own segments; tables must agree on the resulting columns.
    pub fn combine(&self, tables: &[RawTable]) -> Result<(FeatureMatrix, usize, Option<String>)> {
        let mut parts = Vec::with_capacity(tables.len());
        let mut dropped = 0;
        let mut instruments: HashSet<String> = HashSet::new();
        for table in tables {
            let (matrix, d) = self.combine_one(table)?;
            dropped += d;
            parts.push(matrix);
            if let Some(col) = table.column(&self.config.instrument_column) {
                instruments.extend(col.data.group_keys());
            }
        }
        let matrix = FeatureMatrix::concat(parts)?;
        if dropped > 0 {
            warn!(
                event = event_names::FEATURES_ROWS_DROPPED,
                dropped,
                "rows with missing feature values dropped"
            );
        }
        info!(
            event = event_names::FEATURES_BUILT,
            rows = matrix.n_rows(),
            features = matrix.n_features(),
            segments = matrix.segments().len(),
            mode = %self.config.combination,
            "feature matrix assembled"
        );
        let instrument = if instruments.len() == 1 {
            instruments.into_iter().next()
        } else {
            None
        };
        Ok((matrix, dropped, instrument))
    }

    fn combine_one(&self, table: &RawTable) -> Result<(FeatureMatrix, usize)> {
        let cfg = &self.config;
        let ts_col = table
            .column(&cfg.timestamp_column)
            .ok_or_else(|| FeatureError::MissingColumn(cfg.timestamp_column.clone()))?;
        let timestamps = timestamps_of(&cfg.timestamp_column, &ts_col.data)?;

        let segment_keys = match &cfg.segment_column {
            Some(name) => Some(
                table
                    .column(name)
                    .ok_or_else(|| FeatureError::MissingColumn(name.clone()))?
                    .data
                    .group_keys(),
            ),
            None => None,
        };

        let plan = self.plan(table)?;
        let columns: Vec<(String, Vec<f64>)> = plan
            .iter()
            .map(|step| self.materialize(table, step))
            .collect::<Result<_>>()?;

        let n = table.n_rows();
        let width = columns.len();
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let mut values = Vec::with_capacity(n * width);
        let mut kept_ts = Vec::with_capacity(n);
        let mut lengths: Vec<usize> = Vec::new();
        let mut current_key: Option<&str> = None;
        let mut dropped = 0;
        for row in 0..n {
            if columns.iter().any(|(_, col)| col[row].is_nan()) {
                dropped += 1;
                continue;
            }
            let key = segment_keys.as_ref().map(|k| k[row].as_str());
            if lengths.is_empty() || key != current_key {
                lengths.push(0);
            }
            if let Some(len) = lengths.last_mut() {
                *len += 1;
            }
            current_key = key;
            kept_ts.push(timestamps[row]);
            values.extend(columns.iter().map(|(_, col)| col[row]));
        }
        if kept_ts.is_empty() {
            return Err(FeatureError::NoRows { dropped });
        }
        debug!(rows = kept_ts.len(), dropped, segments = lengths.len(), "table combined");
        Ok((FeatureMatrix::new(names, kept_ts, values, &lengths)?, dropped))
    }

    /// Decides which output columns to produce, in table order.
    fn plan(&self, table: &RawTable) -> Result<Vec<ColumnPlan>> {
        let cfg = &self.config;
        let mut reserved: HashSet<&str> = cfg.drop_columns.iter().map(String::as_str).collect();
        reserved.insert(cfg.timestamp_column.as_str());
        reserved.insert(cfg.instrument_column.as_str());
        if let Some(seg) = &cfg.segment_column {
            reserved.insert(seg.as_str());
        }

        let mut candidates: Vec<&str> = Vec::new();
        for col in table.columns() {
            if reserved.contains(col.name.as_str()) {
                continue;
            }
            if !col.data.is_numeric() {
                return Err(FeatureError::UnsupportedColumnType {
                    column: col.name.clone(),
                });
            }
            candidates.push(&col.name);
        }
        let present: HashSet<&str> = candidates.iter().copied().collect();

        let (long, short) = (cfg.long_prefix.as_str(), cfg.short_prefix.as_str());
        let mut plan = Vec::new();
        for &name in &candidates {
            let step = match cfg.combination {
                CombinationMode::LongShort => Some(ColumnPlan::Copy(name.to_string())),
                CombinationMode::Long => {
                    (!name.starts_with(short)).then(|| ColumnPlan::Copy(name.to_string()))
                }
                CombinationMode::Average => {
                    if let Some(suffix) = name.strip_prefix(long) {
                        let partner = format!("{short}{suffix}");
                        if !present.contains(partner.as_str()) {
                            return Err(FeatureError::UnpairedColumn {
                                column: name.to_string(),
                                expected: partner,
                            });
                        }
                        Some(ColumnPlan::Average {
                            long: name.to_string(),
                            short: partner,
                        })
                    } else if let Some(suffix) = name.strip_prefix(short) {
                        let partner = format!("{long}{suffix}");
                        if !present.contains(partner.as_str()) {
                            return Err(FeatureError::UnpairedColumn {
                                column: name.to_string(),
                                expected: partner,
                            });
                        }
                        None
                    } else {
                        Some(ColumnPlan::Copy(name.to_string()))
                    }
                }
            };
            plan.extend(step);
        }
        if plan.is_empty() {
            return Err(FeatureError::NoFeatureColumns);
        }
        Ok(plan)
    }

    fn materialize(&self, table: &RawTable, step: &ColumnPlan) -> Result<(String, Vec<f64>)> {
        let numeric = |name: &str| -> Result<Vec<f64>> {
            let col = table
                .column(name)
                .ok_or_else(|| FeatureError::MissingColumn(name.to_string()))?;
            col.data.to_f64().ok_or_else(|| FeatureError::UnsupportedColumnType {
                column: name.to_string(),
            })
        };
        match step {
            ColumnPlan::Copy(name) => Ok((name.clone(), numeric(name)?)),
            ColumnPlan::Average { long, short } => {
                let (a, b) = (numeric(long)?, numeric(short)?);
                let suffix = &long[self.config.long_prefix.len()..];
                let avg = a.iter().zip(&b).map(|(x, y)| 0.5 * (x + y)).collect();
                Ok((format!("{AVERAGE_PREFIX}{suffix}"), avg))
            }
        }
    }
}

fn timestamps_of(name: &str, data: &ColumnData) -> Result<Vec<i64>> {
    match data {
        ColumnData::Int(v) => Ok(v.clone()),
        ColumnData::Float(v) if v.iter().all(|x| x.is_finite() && x.fract() == 0.0) => {
            Ok(v.iter().map(|&x| x as i64).collect())
        }
        _ => Err(FeatureError::InvalidTimestamps {
            column: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_common::RawColumn;

    fn table(columns: Vec<(&str, ColumnData)>) -> RawTable {
        RawTable::new(
            columns
                .into_iter()
                .map(|(n, d)| RawColumn::new(n, d))
                .collect(),
        )
        .unwrap()
    }

    fn config(mode: CombinationMode) -> FeatureConfig {
        FeatureConfig {
            combination: mode,
            pca_variance: None,
            ..FeatureConfig::default()
        }
    }

    fn sample() -> RawTable {
        table(vec![
            ("timestamp_ns", ColumnData::Int(vec![10, 20, 30, 40])),
            ("instrument", ColumnData::Text(vec!["ES".into(); 4])),
            ("midprice", ColumnData::Float(vec![1.0; 4])),
            ("long_vol", ColumnData::Float(vec![1.0, 2.0, 3.0, 4.0])),
            ("short_vol", ColumnData::Float(vec![3.0, 4.0, 5.0, 6.0])),
            ("spread", ColumnData::Float(vec![0.1, 0.2, 0.3, 0.4])),
        ])
    }

    #[test]
    fn long_mode_drops_short_variants_and_drop_list() {
        let b = FeatureMatrixBuilder::new(config(CombinationMode::Long));
        let built = b.build(&[sample()]).unwrap();
        assert_eq!(built.matrix.feature_names(), &["long_vol", "spread"]);
        assert_eq!(built.instrument.as_deref(), Some("ES"));
        assert!(built.projection.is_none());
    }

    #[test]
    fn average_mode_pairs_variants() {
        let b = FeatureMatrixBuilder::new(config(CombinationMode::Average));
        let built = b.build(&[sample()]).unwrap();
        assert_eq!(built.matrix.feature_names(), &["avg_vol", "spread"]);
        assert_eq!(built.matrix.column(0), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn long_short_mode_keeps_both() {
        let b = FeatureMatrixBuilder::new(config(CombinationMode::LongShort));
        let built = b.build(&[sample()]).unwrap();
        assert_eq!(built.matrix.n_features(), 3);
    }

    #[test]
    fn average_mode_rejects_unpaired_columns() {
        let t = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2])),
            ("long_vol", ColumnData::Float(vec![1.0, 2.0])),
        ]);
        let err = FeatureMatrixBuilder::new(config(CombinationMode::Average))
            .build(&[t])
            .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::UnpairedColumn { ref expected, .. } if expected == "short_vol"
        ));
    }

    #[test]
    fn absent_drop_columns_are_ignored_but_timestamp_is_required() {
        let t = table(vec![("x", ColumnData::Float(vec![1.0, 2.0]))]);
        let err = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[t])
            .unwrap_err();
        assert!(matches!(err, FeatureError::MissingColumn(ref c) if c == "timestamp_ns"));
    }

    #[test]
    fn text_feature_column_is_rejected() {
        let t = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2])),
            ("venue", ColumnData::Text(vec!["a".into(), "b".into()])),
        ]);
        let err = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[t])
            .unwrap_err();
        assert!(matches!(err, FeatureError::UnsupportedColumnType { .. }));
    }

    #[test]
    fn nan_rows_are_dropped_and_counted() {
        let t = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2, 3])),
            ("x", ColumnData::Float(vec![1.0, f64::NAN, 3.0])),
        ]);
        let built = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[t])
            .unwrap();
        assert_eq!(built.dropped_rows, 1);
        assert_eq!(built.matrix.timestamps(), &[1, 3]);
        assert_eq!(built.matrix.segments().len(), 1);
    }

    #[test]
    fn segment_column_splits_runs() {
        let t = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2, 3, 1, 2])),
            ("session", ColumnData::Int(vec![7, 7, 7, 8, 8])),
            ("x", ColumnData::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0])),
        ]);
        let mut cfg = config(CombinationMode::Long);
        cfg.segment_column = Some("session".into());
        let built = FeatureMatrixBuilder::new(cfg).build(&[t]).unwrap();
        let lens: Vec<usize> = built.matrix.segments().iter().map(|s| s.len).collect();
        assert_eq!(lens, vec![3, 2]);
        assert_eq!(built.matrix.feature_names(), &["x"]);
    }

    #[test]
    fn tables_with_different_widths_fail_fast() {
        let a = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2])),
            ("x", ColumnData::Float(vec![1.0, 2.0])),
        ]);
        let b = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![1, 2])),
            ("x", ColumnData::Float(vec![1.0, 2.0])),
            ("y", ColumnData::Float(vec![1.0, 2.0])),
        ]);
        let err = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[a, b])
            .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::Matrix(mr_common::Error::InconsistentWidth { .. })
        ));
    }

    #[test]
    fn each_table_is_its_own_segment() {
        let a = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![5, 6])),
            ("x", ColumnData::Float(vec![1.0, 2.0])),
        ]);
        let built = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[a.clone(), a])
            .unwrap();
        assert_eq!(built.matrix.segments().len(), 2);
    }

    #[test]
    fn decreasing_timestamps_are_rejected() {
        let t = table(vec![
            ("timestamp_ns", ColumnData::Int(vec![3, 2])),
            ("x", ColumnData::Float(vec![1.0, 2.0])),
        ]);
        let err = FeatureMatrixBuilder::new(config(CombinationMode::Long))
            .build(&[t])
            .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::Matrix(mr_common::Error::NonIncreasingTimestamp { .. })
        ));
    }

    #[test]
    fn stored_projection_is_reapplied() {
        let mut cfg = config(CombinationMode::LongShort);
        cfg.pca_variance = Some(0.9);
        let b = FeatureMatrixBuilder::new(cfg);
        let fitted = b.build(&[sample()]).unwrap();
        let proj = fitted.projection.clone().unwrap();
        let again = b.build_with(&[sample()], Some(&proj)).unwrap();
        assert_eq!(again.matrix, fitted.matrix);
    }
}
