//! Typed pipeline configuration.
//!
//! Every section rejects unknown keys so that a misspelled option fails at
//! load time instead of silently falling back to a default.

use mr_common::CovarianceType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::validate::ValidationError;

/// Columns removed before modeling: identifiers, raw prices and signals
/// already represented by their long/short engineered variants.
pub const DEFAULT_DROP_COLUMNS: &[&str] = &[
    "timestamp_ns",
    "instrument",
    "price_gap",
    "midprice",
    "log_spread",
    "log_return",
    "tick_direction_entropy",
    "ewm_volatility",
    "reversal_rate",
    "ofi",
    "depth_imbalance",
    "liquidity_stress",
    "lob_slope",
    "order_arrival_rate",
    "market_depth",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Seed for EM initialization and silhouette sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub causality: CausalityConfig,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_seed() -> u64 {
    45
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            seed: default_seed(),
            features: FeatureConfig::default(),
            model: ModelConfig::default(),
            quality: QualityConfig::default(),
            causality: CausalityConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ValidationError> {
        toml::from_str(s).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(s).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self).map_err(|e| ValidationError::ParseError(e.to_string()))
    }
}

/// How long- and short-horizon variants of a signal are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMode {
    /// Keep only the long-horizon variant.
    #[default]
    Long,
    /// Replace each long/short pair by its mean.
    Average,
    /// Keep both variants side by side.
    LongShort,
}

impl CombinationMode {
    /// Resolves the legacy pair of boolean switches, rejecting the
    /// contradictory combination.
    pub fn from_flags(average: bool, long_short: bool) -> Result<Self, ValidationError> {
        match (average, long_short) {
            (true, true) => Err(ValidationError::InvalidValue {
                field: "features.combination".into(),
                message: "average and long_short are mutually exclusive".into(),
            }),
            (true, false) => Ok(CombinationMode::Average),
            (false, true) => Ok(CombinationMode::LongShort),
            (false, false) => Ok(CombinationMode::Long),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombinationMode::Long => "long",
            CombinationMode::Average => "average",
            CombinationMode::LongShort => "long_short",
        }
    }
}

impl fmt::Display for CombinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinationMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(CombinationMode::Long),
            "average" | "avg" => Ok(CombinationMode::Average),
            "long_short" | "long-short" => Ok(CombinationMode::LongShort),
            other => Err(ValidationError::InvalidValue {
                field: "features.combination".into(),
                message: format!("unknown mode '{other}' (expected long, average, long_short)"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,

    #[serde(default)]
    pub combination: CombinationMode,

    #[serde(default = "default_long_prefix")]
    pub long_prefix: String,

    #[serde(default = "default_short_prefix")]
    pub short_prefix: String,

    /// Cumulative explained-variance fraction kept by PCA; `None` disables
    /// the projection.
    #[serde(default = "default_pca_variance")]
    pub pca_variance: Option<f64>,

    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    #[serde(default = "default_instrument_column")]
    pub instrument_column: String,

    /// Column whose value changes mark independent segments.
    #[serde(default)]
    pub segment_column: Option<String>,
}

fn default_drop_columns() -> Vec<String> {
    DEFAULT_DROP_COLUMNS.iter().map(|s| s.to_string()).collect()
}

fn default_long_prefix() -> String {
    "long_".to_string()
}

fn default_short_prefix() -> String {
    "short_".to_string()
}

fn default_pca_variance() -> Option<f64> {
    Some(0.99)
}

fn default_timestamp_column() -> String {
    "timestamp_ns".to_string()
}

fn default_instrument_column() -> String {
    "instrument".to_string()
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            drop_columns: default_drop_columns(),
            combination: CombinationMode::default(),
            long_prefix: default_long_prefix(),
            short_prefix: default_short_prefix(),
            pca_variance: default_pca_variance(),
            timestamp_column: default_timestamp_column(),
            instrument_column: default_instrument_column(),
            segment_column: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransitionInit {
    #[default]
    Uniform,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeanInit {
    /// Seeded k-means++ followed by Lloyd refinement.
    #[default]
    Kmeans,
    /// Means of equal-size blocks of rows sorted along the first feature.
    Stratified,
    /// Start from a previously fit model; no randomized re-initialization.
    WarmStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default = "default_n_states")]
    pub n_states: usize,

    #[serde(default)]
    pub covariance_type: CovarianceType,

    /// EM iteration cap.
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,

    /// Stop once the log-likelihood gain drops below this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default)]
    pub transition_init: TransitionInit,

    #[serde(default)]
    pub mean_init: MeanInit,

    /// Model bundle providing initial parameters for `warm_start`.
    #[serde(default)]
    pub warm_start: Option<PathBuf>,

    /// Added to covariance diagonals after every M-step, as a multiple of
    /// each feature's variance over the batch.
    #[serde(default = "default_covariance_floor")]
    pub covariance_floor: f64,
}

fn default_n_states() -> usize {
    3
}

fn default_n_iter() -> usize {
    400
}

fn default_tolerance() -> f64 {
    1e-2
}

fn default_covariance_floor() -> f64 {
    1e-6
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_states: default_n_states(),
            covariance_type: CovarianceType::Full,
            n_iter: default_n_iter(),
            tolerance: default_tolerance(),
            transition_init: TransitionInit::default(),
            mean_init: MeanInit::default(),
            warm_start: None,
            covariance_floor: default_covariance_floor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QualityConfig {
    /// Rows sampled for the silhouette score; `None` uses every row.
    #[serde(default = "default_silhouette_sample_size")]
    pub silhouette_sample_size: Option<usize>,
}

fn default_silhouette_sample_size() -> Option<usize> {
    Some(20_000)
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            silhouette_sample_size: default_silhouette_sample_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CausalityConfig {
    /// Largest lag scanned by the Granger test.
    #[serde(default = "default_max_lag")]
    pub max_lag: usize,

    #[serde(default = "default_markov_max_lag")]
    pub markov_max_lag: usize,

    #[serde(default = "default_cmi_max_lag")]
    pub cmi_max_lag: usize,

    #[serde(default = "default_permutations")]
    pub permutations: usize,

    #[serde(default = "default_cmi_seed")]
    pub cmi_seed: u64,

    /// Dedicated worker threads; `None` uses the global rayon pool.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_true")]
    pub granger: bool,

    #[serde(default = "default_true")]
    pub markov_lrt: bool,

    #[serde(default = "default_true")]
    pub cmi: bool,
}

fn default_max_lag() -> usize {
    10
}

fn default_markov_max_lag() -> usize {
    10
}

fn default_cmi_max_lag() -> usize {
    5
}

fn default_permutations() -> usize {
    1000
}

fn default_cmi_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

impl Default for CausalityConfig {
    fn default() -> Self {
        Self {
            max_lag: default_max_lag(),
            markov_max_lag: default_markov_max_lag(),
            cmi_max_lag: default_cmi_max_lag(),
            permutations: default_permutations(),
            cmi_seed: default_cmi_seed(),
            workers: None,
            granger: true,
            markov_lrt: true,
            cmi: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.model.n_states, 3);
        assert_eq!(cfg.model.n_iter, 400);
        assert_eq!(cfg.features.pca_variance, Some(0.99));
        assert_eq!(cfg.causality.permutations, 1000);
        assert!(cfg.features.drop_columns.iter().any(|c| c == "midprice"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            concat!(
                "[model]\nn_states = 5\ncovariance_type = \"diag\"\n",
                "[features]\ncombination = \"average\"\n",
            ),
        )
        .unwrap();
        assert_eq!(cfg.model.n_states, 5);
        assert_eq!(cfg.model.covariance_type, CovarianceType::Diagonal);
        assert_eq!(cfg.model.n_iter, 400);
        assert_eq!(cfg.features.combination, CombinationMode::Average);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PipelineConfig::from_toml_str("[model]\nstates = 4\n").is_err());
        assert!(PipelineConfig::from_json_str(r#"{"bogus": 1}"#).is_err());
    }

    #[test]
    fn unsupported_covariance_type_is_rejected_at_load() {
        let err = PipelineConfig::from_toml_str("[model]\ncovariance_type = \"spherical\"\n")
            .unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn combination_flags_are_mutually_exclusive() {
        assert!(CombinationMode::from_flags(true, true).is_err());
        assert_eq!(
            CombinationMode::from_flags(false, true).unwrap(),
            CombinationMode::LongShort
        );
        assert_eq!(
            "avg".parse::<CombinationMode>().unwrap(),
            CombinationMode::Average
        );
        assert!("both".parse::<CombinationMode>().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let mut cfg = PipelineConfig::default();
        cfg.causality.workers = Some(4);
        cfg.features.segment_column = Some("session".into());
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
