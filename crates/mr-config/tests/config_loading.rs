//! Configuration loading tests against real files.
//!
//! Covers:
//! - Explicit file loading with validation
//! - Preset determinism
//! - Snapshot hashing of the resolved configuration

use mr_config::preset::PresetName;
use mr_config::resolve::ConfigSource;
use mr_config::{load_config, CombinationMode, ValidationError};
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn explicit_file_is_loaded_and_validated() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "microregime.toml",
        r#"
seed = 11

[features]
combination = "average"
pca_variance = 0.95

[model]
n_states = 4
n_iter = 120

[causality]
permutations = 250
workers = 2
"#,
    );
    let loaded = load_config(Some(&path), None).expect("load");
    assert_eq!(loaded.source, ConfigSource::CliArgument);
    assert_eq!(loaded.config.seed, 11);
    assert_eq!(loaded.config.features.combination, CombinationMode::Average);
    assert_eq!(loaded.config.model.n_states, 4);
    assert_eq!(loaded.config.causality.workers, Some(2));
    assert_eq!(loaded.config.causality.max_lag, 10);
}

#[test]
fn semantically_invalid_file_is_rejected_before_use() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "bad.toml", "[causality]\npermutations = 0\n");
    let err = load_config(Some(&path), None).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::InvalidValue { ref field, .. } if field == "causality.permutations"
    ));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "broken.json", "{ not json");
    let err = load_config(Some(&path), None).unwrap_err();
    assert!(matches!(err, ValidationError::ParseError(_)));
}

#[test]
fn preset_snapshot_hash_is_reproducible() {
    let a = load_config(None, Some(PresetName::Thorough)).unwrap();
    let b = load_config(None, Some(PresetName::Thorough)).unwrap();
    let (sa, sb) = (a.snapshot(), b.snapshot());
    assert_eq!(sa.config_hash, sb.config_hash);
    assert!(sa.is_consistent());
    assert_eq!(a.config.causality.permutations, 5_000);
}
