//! End-to-end runs: fit one instrument, or test two fitted instruments
//! against each other.
//!
//! The in-memory steps (`fit_tables`, `decode_tables`, `align`) are usable
//! on their own; `fit` and `causality` add input loading and artifact
//! output around them.

use std::path::{Path, PathBuf};

use chrono::Utc;
use mr_bundle::{BundleError, ModelBundle};
use mr_common::{
    ColumnData, FeatureMatrix, ModelSummary, PosteriorMatrix, RawColumn, RawTable,
    RegimeSequence, RunId,
};
use mr_config::{ConfigSnapshot, FeatureConfig, PipelineConfig};
use mr_tables::{
    causality_results_batch, model_runs_batch, raw_to_batch, read_table, write_csv, write_table,
    ModelRunRecord, RecordBatch, RegimeRows, TableError, TableName,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::causality::{
    intersect_timestamps, segments_of_selection, AlignedPair, CausalError, CausalReport,
    CausalSignificanceEngine, RegimeSeries,
};
use crate::features::{BuiltFeatures, FeatureError, FeatureMatrixBuilder};
use crate::hmm::{FitOptions, FitReport, GaussianHmm, HmmError};
use crate::logging::{event_names, LogContext, Stage};
use crate::quality::{ModelQualityEvaluator, QualityError, QualityReport};

/// Subdirectory of the output directory holding the Parquet tables.
pub const TABLES_DIR: &str = "tables";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Features(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] HmmError),

    #[error(transparent)]
    Quality(#[from] QualityError),

    #[error(transparent)]
    Causal(#[from] CausalError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Data(#[from] mr_common::Error),

    #[error("model expects features {expected:?} but the input provides {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("instrument '{0}' has no rows in the input")]
    UnknownInstrument(String),

    #[error("'{source_label}' and '{target_label}' share no timestamps")]
    NoOverlap {
        source_label: String,
        target_label: String,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PipelineError> for mr_common::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Features(e) => e.into(),
            PipelineError::Model(e) => e.into(),
            PipelineError::Quality(e) => e.into(),
            PipelineError::Causal(e) => e.into(),
            PipelineError::Bundle(e) => e.into(),
            PipelineError::Table(e) => e.into(),
            PipelineError::Data(e) => e,
            other => mr_common::Error::InvalidData(other.to_string()),
        }
    }
}

/// A fitted model with everything derived from its training data.
#[derive(Debug, Clone)]
pub struct FittedRegimes {
    pub model: GaussianHmm,
    pub report: FitReport,
    pub features: BuiltFeatures,
    pub labels: RegimeSequence,
    pub posteriors: PosteriorMatrix,
    /// Log-probability of the Viterbi path.
    pub viterbi_log_prob: f64,
    pub quality: QualityReport,
    pub summary: ModelSummary,
}

/// One instrument decoded by a stored model.
#[derive(Debug, Clone)]
pub struct DecodedSeries {
    pub matrix: FeatureMatrix,
    pub series: RegimeSeries,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    pub inputs: Vec<PathBuf>,
    /// Keep only rows whose instrument column equals this value.
    pub instrument: Option<String>,
    pub out_dir: PathBuf,
    /// Also export the decoded rows as CSV here.
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitOutcome {
    pub run_id: RunId,
    pub instrument: Option<String>,
    pub bundle_path: PathBuf,
    pub table_paths: Vec<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub summary: ModelSummary,
    pub fit: FitReport,
    pub quality: QualityReport,
    pub occupancy: Vec<usize>,
    pub transition_matrix: Vec<Vec<f64>>,
    pub viterbi_log_prob: f64,
    pub dropped_rows: usize,
    /// Principal components kept, when features were projected.
    pub components: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CausalityRequest {
    pub source_bundle: PathBuf,
    pub source_input: PathBuf,
    pub target_bundle: PathBuf,
    pub target_input: PathBuf,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalityOutcome {
    pub report: CausalReport,
    pub table_path: PathBuf,
    pub source_rows: usize,
    pub target_rows: usize,
}

/// Runs pipeline stages under one run id and configuration.
#[derive(Debug, Clone)]
pub struct RegimePipeline {
    config: PipelineConfig,
    snapshot: Option<ConfigSnapshot>,
    run_id: RunId,
    ctx: LogContext,
}

impl RegimePipeline {
    pub fn new(config: PipelineConfig, run_id: RunId) -> Self {
        let ctx = LogContext::new(run_id.as_str());
        Self {
            config,
            snapshot: None,
            run_id,
            ctx,
        }
    }

    /// Snapshot embedded in written bundles.
    pub fn with_snapshot(mut self, snapshot: ConfigSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Builds features, fits (or refines `warm`), decodes and evaluates.
    pub fn fit_tables(
        &self,
        tables: &[RawTable],
        warm: Option<&ModelBundle>,
    ) -> Result<FittedRegimes> {
        let builder = FeatureMatrixBuilder::new(self.config.features.clone());
        let features = {
            let _span = self.ctx.stage_span(Stage::Features).entered();
            match warm {
                Some(bundle) => builder.build_with(tables, bundle.projection.as_ref())?,
                None => builder.build(tables)?,
            }
        };

        let options = FitOptions::from_config(&self.config.model, self.config.seed);
        let (model, report) = {
            let _span = self.ctx.stage_span(Stage::Fit).entered();
            match warm {
                Some(bundle) => {
                    check_inputs(bundle, &features.combined)?;
                    GaussianHmm::from_params(&bundle.parameters)?
                        .refine(&features.matrix, &options)?
                }
                None => GaussianHmm::fit(&features.matrix, &options)?,
            }
        };

        let (labels, viterbi_log_prob, posteriors) = {
            let _span = self.ctx.stage_span(Stage::Decode).entered();
            let (labels, log_prob) = model.decode(&features.matrix)?;
            (labels, log_prob, model.predict_proba(&features.matrix)?)
        };

        let quality = {
            let _span = self.ctx.stage_span(Stage::Quality).entered();
            ModelQualityEvaluator::new(self.config.quality.clone(), self.config.seed).evaluate(
                &features.matrix,
                Some(&features.combined),
                &labels,
            )?
        };
        let summary = model.summary(&features.matrix, &report);

        Ok(FittedRegimes {
            model,
            report,
            features,
            labels,
            posteriors,
            viterbi_log_prob,
            quality,
            summary,
        })
    }

    /// Decodes new tables with a stored model, rebuilding features the way
    /// the model's own run did.
    pub fn decode_tables(
        &self,
        bundle: &ModelBundle,
        tables: &[RawTable],
        label: &str,
    ) -> Result<DecodedSeries> {
        let feature_config = bundle_features(bundle, &self.config.features);
        let features = {
            let _span = self.ctx.stage_span(Stage::Features).entered();
            FeatureMatrixBuilder::new(feature_config)
                .build_with(tables, bundle.projection.as_ref())?
        };
        check_inputs(bundle, &features.combined)?;

        let _span = self.ctx.stage_span(Stage::Decode).entered();
        let model = GaussianHmm::from_params(&bundle.parameters)?;
        let (labels, _) = model.decode(&features.matrix)?;
        let posteriors = model.predict_proba(&features.matrix)?;
        Ok(DecodedSeries {
            series: RegimeSeries::new(label, labels, posteriors)?,
            matrix: features.matrix,
        })
    }

    /// Inner join on timestamps; segments follow the source side.
    pub fn align(&self, source: &DecodedSeries, target: &DecodedSeries) -> Result<AlignedPair> {
        let (src_rows, tgt_rows) =
            shared_rows(source.matrix.timestamps(), target.matrix.timestamps());
        if src_rows.is_empty() {
            return Err(PipelineError::NoOverlap {
                source_label: source.series.label.clone(),
                target_label: target.series.label.clone(),
            });
        }
        let segments = segments_of_selection(&src_rows, &source.matrix.segment_ids());
        let pair = AlignedPair::new(
            source.series.select(&src_rows),
            target.series.select(&tgt_rows),
            segments,
        )?;
        info!(
            event = event_names::SERIES_ALIGNED,
            source = %source.series.label,
            target = %target.series.label,
            source_rows = source.matrix.n_rows(),
            target_rows = target.matrix.n_rows(),
            rows = pair.len(),
            segments = pair.segments.len(),
            "series aligned"
        );
        Ok(pair)
    }

    /// `mr fit`: load, fit, evaluate and write the bundle and tables.
    pub fn fit(&self, request: &FitRequest) -> Result<FitOutcome> {
        info!(
            event = event_names::RUN_STARTED,
            run_id = %self.run_id,
            command = "fit",
            inputs = request.inputs.len(),
            "run started"
        );
        let tables = {
            let _span = self.ctx.stage_span(Stage::Load).entered();
            load_inputs(
                &request.inputs,
                request.instrument.as_deref(),
                &self.config.features,
            )?
        };
        let warm = match &self.config.model.warm_start {
            Some(path) => Some(ModelBundle::load(path)?),
            None => None,
        };
        let fitted = self.fit_tables(&tables, warm.as_ref())?;
        let instrument = request
            .instrument
            .clone()
            .or_else(|| fitted.features.instrument.clone());

        let _span = self.ctx.stage_span(Stage::Export).entered();
        let bundle = ModelBundle {
            run_id: self.run_id.to_string(),
            parameters: fitted.model.to_params(),
            summary: fitted.summary.clone(),
            projection: fitted.features.projection.clone(),
            config: self.snapshot.clone(),
        };
        let bundle_path = request.out_dir.join(format!("{}.mrb", self.run_id));
        let manifest = bundle.save(&bundle_path)?;
        info!(
            event = event_names::BUNDLE_WRITTEN,
            path = %bundle_path.display(),
            files = manifest.file_count(),
            bytes = manifest.total_bytes(),
            "model bundle written"
        );

        let rows = RegimeRows {
            run_id: self.run_id.as_str(),
            instrument: instrument.as_deref(),
            features: &fitted.features.combined,
            labels: &fitted.labels,
            posteriors: &fitted.posteriors,
        }
        .to_batch()?;
        let tables_dir = request.out_dir.join(TABLES_DIR);
        let mut table_paths = Vec::with_capacity(2);

        let csv_path = match &request.csv {
            Some(path) => {
                write_csv(path, &rows)?;
                info!(
                    event = event_names::CSV_WRITTEN,
                    path = %path.display(),
                    "regime rows exported"
                );
                Some(path.clone())
            }
            None => None,
        };

        table_paths.push(self.write(&tables_dir, TableName::RegimeRows, rows)?);
        let record = ModelRunRecord {
            run_id: self.run_id.to_string(),
            created_at: Utc::now(),
            instrument: instrument.clone(),
            regime_count: fitted.summary.n_states,
            covariance_type: fitted.summary.covariance_type.to_string(),
            n_samples: fitted.summary.n_samples,
            n_features: fitted.summary.n_features,
            log_likelihood: fitted.summary.log_likelihood,
            aic: fitted.summary.aic,
            bic: fitted.summary.bic,
            converged: fitted.summary.converged,
            iterations: fitted.summary.iterations,
            silhouette: fitted.quality.silhouette.value(),
            davies_bouldin: fitted.quality.davies_bouldin.value(),
            calinski_harabasz: fitted.quality.calinski_harabasz.value(),
        };
        table_paths.push(self.write(
            &tables_dir,
            TableName::ModelRuns,
            model_runs_batch(&[record])?,
        )?);

        info!(
            event = event_names::RUN_FINISHED,
            run_id = %self.run_id,
            log_likelihood = fitted.summary.log_likelihood,
            bic = fitted.summary.bic,
            "run finished"
        );
        Ok(FitOutcome {
            run_id: self.run_id.clone(),
            instrument,
            bundle_path,
            table_paths,
            csv_path,
            occupancy: fitted.labels.occupancy(),
            transition_matrix: fitted.model.transition_matrix(),
            viterbi_log_prob: fitted.viterbi_log_prob,
            dropped_rows: fitted.features.dropped_rows,
            components: fitted.features.projection.as_ref().map(|p| p.n_components()),
            summary: fitted.summary,
            fit: fitted.report,
            quality: fitted.quality,
        })
    }

    /// `mr causality`: decode both instruments, align and run every test.
    pub fn causality(&self, request: &CausalityRequest) -> Result<CausalityOutcome> {
        info!(
            event = event_names::RUN_STARTED,
            run_id = %self.run_id,
            command = "causality",
            "run started"
        );
        let (source_bundle, target_bundle, source_table, target_table) = {
            let _span = self.ctx.stage_span(Stage::Load).entered();
            (
                ModelBundle::load(&request.source_bundle)?,
                ModelBundle::load(&request.target_bundle)?,
                load_table(&request.source_input)?,
                load_table(&request.target_input)?,
            )
        };

        let source_label = series_label(&source_table, &source_bundle, &request.source_input);
        let target_label = series_label(&target_table, &target_bundle, &request.target_input);
        let source = self.decode_tables(&source_bundle, &[source_table], &source_label)?;
        let target = self.decode_tables(&target_bundle, &[target_table], &target_label)?;
        let pair = self.align(&source, &target)?;

        let report = {
            let _span = self.ctx.stage_span(Stage::Causality).entered();
            CausalSignificanceEngine::new(self.config.causality.clone()).run(&pair, &self.run_id)?
        };

        let table_path = {
            let _span = self.ctx.stage_span(Stage::Export).entered();
            let batch = causality_results_batch(self.run_id.as_str(), &report.results)?;
            self.write(
                &request.out_dir.join(TABLES_DIR),
                TableName::CausalityResults,
                batch,
            )?
        };
        info!(
            event = event_names::RUN_FINISHED,
            run_id = %self.run_id,
            cells = report.results.len(),
            skipped = report.skipped(),
            "run finished"
        );
        Ok(CausalityOutcome {
            source_rows: source.matrix.n_rows(),
            target_rows: target.matrix.n_rows(),
            report,
            table_path,
        })
    }

    fn write(
        &self,
        base: &Path,
        table: TableName,
        batch: RecordBatch,
    ) -> Result<PathBuf> {
        let rows = batch.num_rows();
        let path = write_table(base, table, self.run_id.as_str(), batch)?;
        info!(
            event = event_names::TABLE_WRITTEN,
            table = table.as_str(),
            rows,
            path = %path.display(),
            "table written"
        );
        Ok(path)
    }
}

fn load_table(path: &Path) -> Result<RawTable> {
    let table = read_table(path)?;
    info!(
        event = event_names::INPUT_LOADED,
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.columns().len(),
        "input loaded"
    );
    Ok(table)
}

/// Reads every input and keeps the requested instrument's rows.
pub fn load_inputs(
    paths: &[PathBuf],
    instrument: Option<&str>,
    features: &FeatureConfig,
) -> Result<Vec<RawTable>> {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        let table = load_table(path)?;
        let table = match instrument {
            Some(name) => table.filter_eq(&features.instrument_column, name)?,
            None => table,
        };
        tables.push(table);
    }
    if let Some(name) = instrument {
        if tables.iter().all(|t| t.n_rows() == 0) {
            return Err(PipelineError::UnknownInstrument(name.to_string()));
        }
    }
    Ok(tables)
}

/// Feature settings a bundle was fitted with, falling back to `current`.
fn bundle_features(bundle: &ModelBundle, current: &FeatureConfig) -> FeatureConfig {
    match &bundle.config {
        Some(snapshot) if snapshot.is_consistent() => snapshot.config.features.clone(),
        Some(_) => {
            warn!(
                bundle = %bundle.run_id,
                "embedded configuration does not match its hash; using current feature settings"
            );
            current.clone()
        }
        None => current.clone(),
    }
}

fn check_inputs(bundle: &ModelBundle, combined: &FeatureMatrix) -> Result<()> {
    let expected = bundle.input_feature_names();
    if expected != combined.feature_names() {
        return Err(PipelineError::FeatureMismatch {
            expected: expected.to_vec(),
            actual: combined.feature_names().to_vec(),
        });
    }
    Ok(())
}

/// Instrument name in the table, else the input file stem, else the bundle's
/// run id.
fn series_label(table: &RawTable, bundle: &ModelBundle, input: &Path) -> String {
    let instrument = bundle_features(bundle, &FeatureConfig::default()).instrument_column;
    if let Some(col) = table.column(&instrument) {
        let keys = col.data.group_keys();
        if let [only] = keys.as_slice() {
            return only.clone();
        }
    }
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| bundle.run_id.clone())
}

/// Positions sharing a timestamp, ordered by the left side. Inputs need not
/// be globally sorted across segments.
pub fn shared_rows(left: &[i64], right: &[i64]) -> (Vec<usize>, Vec<usize>) {
    let order = |ts: &[i64]| {
        let mut idx: Vec<usize> = (0..ts.len()).collect();
        idx.sort_by_key(|&i| (ts[i], i));
        idx
    };
    let (lo, ro) = (order(left), order(right));
    let ls: Vec<i64> = lo.iter().map(|&i| left[i]).collect();
    let rs: Vec<i64> = ro.iter().map(|&i| right[i]).collect();
    let (li, ri) = intersect_timestamps(&ls, &rs);
    let mut pairs: Vec<(usize, usize)> =
        li.iter().zip(&ri).map(|(&i, &j)| (lo[i], ro[j])).collect();
    pairs.sort_unstable();
    pairs.into_iter().unzip()
}

/// A sticky K-state model with well separated unit-variance states, used by
/// `mr simulate` and the benchmarks.
pub fn synthetic_model(n_states: usize, n_features: usize) -> Result<GaussianHmm> {
    if n_states == 0 || n_features == 0 {
        return Err(HmmError::InvalidParameters(
            "state and feature counts must be positive".into(),
        )
        .into());
    }
    let means = (0..n_states)
        .map(|k| {
            (0..n_features)
                .map(|j| if (k + j) % 2 == 0 { 3.0 * k as f64 } else { -3.0 * k as f64 })
                .collect()
        })
        .collect();
    let identity = nalgebra::DMatrix::identity(n_features, n_features);
    let stay = if n_states == 1 { 1.0 } else { 0.95 };
    let leave = if n_states == 1 { 0.0 } else { 0.05 / (n_states - 1) as f64 };
    let transmat = (0..n_states * n_states)
        .map(|i| if i / n_states == i % n_states { stay } else { leave })
        .collect();
    Ok(GaussianHmm::new(
        mr_common::CovarianceType::Full,
        means,
        vec![identity; n_states],
        vec![1.0 / n_states as f64; n_states],
        transmat,
    )?)
}

/// Synthetic feature table: a timestamp column plus one float column per
/// feature. Also returns the generating labels.
pub fn simulate_table(
    model: &GaussianHmm,
    rows: usize,
    seed: u64,
    timestamp_column: &str,
) -> Result<(RawTable, RegimeSequence)> {
    let (matrix, labels) = model.sample(rows, seed)?;
    let mut columns = vec![RawColumn::new(
        timestamp_column,
        ColumnData::Int(matrix.timestamps().to_vec()),
    )];
    for (j, name) in matrix.feature_names().iter().enumerate() {
        columns.push(RawColumn::new(name.clone(), ColumnData::Float(matrix.column(j))));
    }
    Ok((RawTable::new(columns)?, labels))
}

/// Writes a raw table as CSV.
pub fn write_raw_csv(path: &Path, table: &RawTable) -> Result<()> {
    write_csv(path, &raw_to_batch(table)?)?;
    info!(
        event = event_names::CSV_WRITTEN,
        path = %path.display(),
        rows = table.n_rows(),
        "table exported"
    );
    Ok(())
}
