//! Configuration presets.
//!
//! - Default: the reference settings
//! - Quick: short EM runs and small permutation counts for exploration
//! - Thorough: long EM runs, tight tolerance, large permutation counts

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::PipelineConfig;

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    Default,
    Quick,
    Thorough,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] =
        &[PresetName::Default, PresetName::Quick, PresetName::Thorough];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Default => "default",
            PresetName::Quick => "quick",
            PresetName::Thorough => "thorough",
        }
    }

    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "default" => Some(PresetName::Default),
            "quick" | "fast" => Some(PresetName::Quick),
            "thorough" | "full" => Some(PresetName::Thorough),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Default => "Reference settings: 400 EM iterations, 1000 permutations",
            PresetName::Quick => "Exploration: 50 EM iterations, 200 permutations, lags up to 5",
            PresetName::Thorough => {
                "Publication: 1000 EM iterations, tolerance 1e-4, 5000 permutations"
            }
        }
    }

    /// Builds the preset configuration.
    pub fn config(&self) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        match self {
            PresetName::Default => {}
            PresetName::Quick => {
                cfg.model.n_iter = 50;
                cfg.causality.permutations = 200;
                cfg.causality.max_lag = 5;
                cfg.causality.markov_max_lag = 5;
                cfg.quality.silhouette_sample_size = Some(5_000);
            }
            PresetName::Thorough => {
                cfg.model.n_iter = 1_000;
                cfg.model.tolerance = 1e-4;
                cfg.causality.permutations = 5_000;
            }
        }
        cfg
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| {
            let names: Vec<&str> = PresetName::ALL.iter().map(|p| p.as_str()).collect();
            format!("unknown preset '{s}' (available: {})", names.join(", "))
        })
    }
}
