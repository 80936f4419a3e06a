//! Configuration snapshots for reproducibility.
//!
//! A snapshot freezes the fully resolved configuration of a run so that a
//! model bundle records exactly which settings produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineConfig;
use crate::resolve::ConfigSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub timestamp: DateTime<Utc>,
    pub schema_version: String,
    /// Path the configuration was read from, if any.
    #[serde(default)]
    pub path: Option<String>,
    pub source: String,
    /// SHA-256 of the canonical JSON encoding of `config`.
    pub config_hash: String,
    pub config: PipelineConfig,
}

impl ConfigSnapshot {
    pub fn new(config: &PipelineConfig, source: &ConfigSource, path: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: path.map(str::to_string),
            source: source.to_string(),
            config_hash: hash_config(config),
            config: config.clone(),
        }
    }

    /// True when the embedded configuration still matches its hash.
    pub fn is_consistent(&self) -> bool {
        hash_config(&self.config) == self.config_hash
    }
}

/// Hash of the canonical JSON encoding of a configuration.
pub fn hash_config(config: &PipelineConfig) -> String {
    // Struct fields serialize in declaration order, so the encoding is stable.
    let canonical = serde_json::to_string(config).unwrap_or_default();
    hash_content(&canonical)
}

/// Compute SHA-256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = PipelineConfig::default();
        let mut b = PipelineConfig::default();
        assert_eq!(hash_config(&a), hash_config(&b));
        b.model.n_states = 4;
        assert_ne!(hash_config(&a), hash_config(&b));
        assert_eq!(hash_config(&a).len(), 64);
    }

    #[test]
    fn snapshot_detects_tampering() {
        let mut snap = ConfigSnapshot::new(
            &PipelineConfig::default(),
            &ConfigSource::BuiltinDefault,
            None,
        );
        assert!(snap.is_consistent());
        assert_eq!(snap.source, "builtin default");
        snap.config.seed = 7;
        assert!(!snap.is_consistent());
    }

    #[test]
    fn snapshot_round_trips_json() {
        let snap = ConfigSnapshot::new(
            &PipelineConfig::default(),
            &ConfigSource::CliArgument,
            Some("cfg.toml"),
        );
        let json = serde_json::to_string(&snap).unwrap();
        let back: ConfigSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
