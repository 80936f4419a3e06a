//! Read-only diagnostics over a fitted regime labeling.
//!
//! Separation scores are computed on the standardized model input; variance
//! ranking and feature diagnostics use the combined features before any
//! projection. A metric that cannot be computed is reported as
//! [`MetricOutcome::Failed`] next to the metrics that could.

pub mod diagnostics;
pub mod durations;
pub mod metrics;

pub use diagnostics::{
    feature_diagnostics, regime_profiles, variance_ranking, FeatureDiagnostics, FeatureVariance,
    RegimeProfile,
};
pub use durations::{label_runs, regime_durations, RegimeDuration};
pub use metrics::{calinski_harabasz, davies_bouldin, silhouette};

use mr_common::{FeatureMatrix, RegimeSequence};
use mr_config::QualityConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::StandardScaler;
use crate::logging::event_names;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityError {
    #[error("{present} distinct regime(s) present; separation needs at least 2")]
    SingleRegime { present: usize },

    #[error("regime {label} has a single member")]
    SingletonRegime { label: usize },

    #[error("every row sits on its regime centroid; within-regime dispersion is zero")]
    ZeroDispersion,

    #[error("{labels} labels for {rows} feature rows")]
    LengthMismatch { rows: usize, labels: usize },
}

impl From<QualityError> for mr_common::Error {
    fn from(err: QualityError) -> Self {
        match err {
            QualityError::LengthMismatch { rows, labels } => mr_common::Error::LengthMismatch {
                what: "labels vs feature rows".into(),
                left: labels,
                right: rows,
            },
            other => mr_common::Error::Numerical(other.to_string()),
        }
    }
}

/// A metric value, or why it could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome {
    Computed { value: f64 },
    Failed { error: String },
}

impl MetricOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricOutcome::Computed { value } => Some(*value),
            MetricOutcome::Failed { .. } => None,
        }
    }
}

impl From<Result<f64, QualityError>> for MetricOutcome {
    fn from(result: Result<f64, QualityError>) -> Self {
        match result {
            Ok(value) => MetricOutcome::Computed { value },
            Err(e) => MetricOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub silhouette: MetricOutcome,
    pub davies_bouldin: MetricOutcome,
    pub calinski_harabasz: MetricOutcome,
    pub durations: Vec<RegimeDuration>,
    pub variance_ranking: Vec<FeatureVariance>,
    pub feature_diagnostics: Vec<FeatureDiagnostics>,
    pub regimes: Vec<RegimeProfile>,
}

pub struct ModelQualityEvaluator {
    config: QualityConfig,
    seed: u64,
}

impl ModelQualityEvaluator {
    /// `seed` drives the silhouette subsample.
    pub fn new(config: QualityConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Evaluates `labels` against the model input. `combined` is the feature
    /// set before projection; it defaults to the model input.
    pub fn evaluate(
        &self,
        model_input: &FeatureMatrix,
        combined: Option<&FeatureMatrix>,
        labels: &RegimeSequence,
    ) -> Result<QualityReport, QualityError> {
        let combined = combined.unwrap_or(model_input);
        for rows in [model_input.n_rows(), combined.n_rows()] {
            if rows != labels.len() {
                return Err(QualityError::LengthMismatch {
                    rows,
                    labels: labels.len(),
                });
            }
        }

        let f = model_input.n_features();
        let scaled = StandardScaler::fit(model_input).transform_values(model_input);
        let l = labels.labels();
        let report = QualityReport {
            silhouette: silhouette(&scaled, f, l, self.config.silhouette_sample_size, self.seed)
                .into(),
            davies_bouldin: davies_bouldin(&scaled, f, l).into(),
            calinski_harabasz: calinski_harabasz(&scaled, f, l).into(),
            durations: regime_durations(l, model_input.segments(), labels.n_states()),
            variance_ranking: variance_ranking(combined),
            feature_diagnostics: feature_diagnostics(combined),
            regimes: regime_profiles(combined, l, labels.n_states()),
        };

        for (name, outcome) in [
            ("silhouette", &report.silhouette),
            ("davies_bouldin", &report.davies_bouldin),
            ("calinski_harabasz", &report.calinski_harabasz),
        ] {
            if let MetricOutcome::Failed { error } = outcome {
                warn!(
                    event = event_names::QUALITY_METRIC_FAILED,
                    metric = name,
                    %error,
                    "quality metric unavailable"
                );
            }
        }
        info!(
            event = event_names::QUALITY_COMPUTED,
            silhouette = report.silhouette.value(),
            davies_bouldin = report.davies_bouldin.value(),
            calinski_harabasz = report.calinski_harabasz.value(),
            "quality metrics computed"
        );
        Ok(report)
    }
}
