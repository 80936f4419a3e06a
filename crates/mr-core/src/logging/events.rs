//! Structured event vocabulary.
//!
//! Every event carries the run id, the pipeline stage and a stable event
//! name, so JSONL logs can be filtered without parsing messages.

use serde::{Deserialize, Serialize};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading input tables and bundles.
    Load,
    /// Column selection, combination and projection.
    Features,
    /// EM fitting.
    Fit,
    /// Viterbi and posterior decoding.
    Decode,
    /// Cluster and duration diagnostics.
    Quality,
    /// Cross-series tests.
    Causality,
    /// Bundles, tables and CSV output.
    Export,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Features => "features",
            Stage::Fit => "fit",
            Stage::Decode => "decode",
            Stage::Quality => "quality",
            Stage::Causality => "causality",
            Stage::Export => "export",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const INPUT_LOADED: &str = "input.loaded";

    // Features
    pub const FEATURES_BUILT: &str = "features.built";
    pub const FEATURES_ROWS_DROPPED: &str = "features.rows_dropped";
    pub const PCA_FITTED: &str = "pca.fitted";

    // Fit
    pub const HMM_INITIALIZED: &str = "hmm.initialized";
    pub const HMM_ITERATION: &str = "hmm.iteration";
    pub const HMM_CONVERGED: &str = "hmm.converged";
    pub const HMM_NOT_CONVERGED: &str = "hmm.not_converged";
    pub const HMM_FIT_FAILED: &str = "hmm.fit_failed";

    pub const QUALITY_COMPUTED: &str = "quality.computed";
    pub const QUALITY_METRIC_FAILED: &str = "quality.metric_failed";

    // Causality
    pub const SERIES_ALIGNED: &str = "causality.series_aligned";
    pub const CAUSALITY_CELL_SKIPPED: &str = "causality.cell_skipped";
    pub const CAUSALITY_COMPLETED: &str = "causality.completed";

    // Export
    pub const BUNDLE_WRITTEN: &str = "bundle.written";
    pub const TABLE_WRITTEN: &str = "table.written";
    pub const CSV_WRITTEN: &str = "csv.written";
}

/// Correlation fields shared by every event of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
    /// Instrument or series label, when the run concerns one.
    pub series: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            series: None,
        }
    }

    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    /// Span covering one stage of the run.
    pub fn stage_span(&self, stage: Stage) -> tracing::Span {
        tracing::info_span!(
            "stage",
            run_id = %self.run_id,
            series = self.series.as_deref().unwrap_or("-"),
            stage = %stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_serialization() {
        assert_eq!(serde_json::to_string(&Stage::Fit).unwrap(), "\"fit\"");
        assert_eq!(
            serde_json::to_string(&Stage::Causality).unwrap(),
            "\"causality\""
        );
        assert_eq!(Stage::Export.to_string(), "export");
    }

    #[test]
    fn test_event_names_are_dotted() {
        for name in [
            event_names::RUN_STARTED,
            event_names::HMM_CONVERGED,
            event_names::CAUSALITY_CELL_SKIPPED,
        ] {
            assert!(name.contains('.'), "{name}");
        }
    }

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("run-0123456789ab").with_series("ES");
        assert_eq!(ctx.run_id, "run-0123456789ab");
        assert_eq!(ctx.series.as_deref(), Some("ES"));
    }
}
