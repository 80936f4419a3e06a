//! Loading, environment overrides and validation in one pass.

use std::path::{Path, PathBuf};

use mr_common::CovarianceType;
use tracing::debug;

use crate::pipeline::{CombinationMode, PipelineConfig};
use crate::preset::PresetName;
use crate::resolve::{resolve_config, ConfigSource};
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_pipeline, ValidationError, ValidationResult};

pub const ENV_REGIME_COUNT: &str = "MR_REGIME_COUNT";
pub const ENV_COMBINATION: &str = "MR_COMBINATION";
pub const ENV_SEED: &str = "MR_SEED";
pub const ENV_COVARIANCE_TYPE: &str = "MR_COVARIANCE_TYPE";

/// A validated configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    pub fn snapshot(&self) -> ConfigSnapshot {
        let path = self.path.as_ref().map(|p| p.display().to_string());
        ConfigSnapshot::new(&self.config, &self.source, path.as_deref())
    }
}

/// Parses a configuration file; `.json` is read as JSON, anything else as
/// TOML.
pub fn load_file(path: &Path) -> ValidationResult<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ValidationError::IoError(format!("{}: {e}", path.display())))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        PipelineConfig::from_json_str(&content)
    } else {
        PipelineConfig::from_toml_str(&content)
    }
}

/// Resolves, loads, applies environment overrides and validates.
///
/// An explicit preset and an explicit config file are mutually exclusive.
pub fn load_config(
    cli_path: Option<&Path>,
    preset: Option<PresetName>,
) -> ValidationResult<LoadedConfig> {
    let (mut config, source, path) = match (cli_path, preset) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::SemanticError(
                "--config and --preset are mutually exclusive".into(),
            ));
        }
        (None, Some(p)) => (p.config(), ConfigSource::BuiltinDefault, None),
        (cli, None) => {
            let resolved = resolve_config(cli);
            match resolved.path {
                Some(path) => (load_file(&path)?, resolved.source, Some(path)),
                None => (PipelineConfig::default(), resolved.source, None),
            }
        }
    };
    apply_env_overrides(&mut config)?;
    validate_pipeline(&config)?;
    debug!(source = %source, path = ?path, "configuration loaded");
    Ok(LoadedConfig {
        config,
        source,
        path,
    })
}

/// Applies `MR_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut PipelineConfig) -> ValidationResult<()> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Applies overrides from an injectable lookup. Malformed values are
/// configuration errors, never ignored.
pub fn apply_overrides(
    config: &mut PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ValidationResult<()> {
    if let Some(raw) = lookup(ENV_REGIME_COUNT) {
        config.model.n_states = raw.trim().parse().map_err(|_| ValidationError::InvalidValue {
            field: ENV_REGIME_COUNT.into(),
            message: format!("expected a positive integer, got '{raw}'"),
        })?;
    }
    if let Some(raw) = lookup(ENV_COMBINATION) {
        config.features.combination = raw.parse::<CombinationMode>()?;
    }
    if let Some(raw) = lookup(ENV_SEED) {
        config.seed = raw.trim().parse().map_err(|_| ValidationError::InvalidValue {
            field: ENV_SEED.into(),
            message: format!("expected an unsigned integer, got '{raw}'"),
        })?;
    }
    if let Some(raw) = lookup(ENV_COVARIANCE_TYPE) {
        config.model.covariance_type = raw
            .parse::<CovarianceType>()
            .map_err(|e| ValidationError::InvalidValue {
                field: ENV_COVARIANCE_TYPE.into(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_typed() {
        let mut cfg = PipelineConfig::default();
        apply_overrides(&mut cfg, |k| match k {
            ENV_REGIME_COUNT => Some("5".into()),
            ENV_COMBINATION => Some("long_short".into()),
            ENV_SEED => Some("7".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.model.n_states, 5);
        assert_eq!(cfg.features.combination, CombinationMode::LongShort);
        assert_eq!(cfg.seed, 7);
    }

    #[test]
    fn malformed_override_is_an_error() {
        let mut cfg = PipelineConfig::default();
        let err = apply_overrides(&mut cfg, |k| {
            (k == ENV_REGIME_COUNT).then(|| "three".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn unsupported_covariance_override_is_rejected() {
        let mut cfg = PipelineConfig::default();
        let err = apply_overrides(&mut cfg, |k| {
            (k == ENV_COVARIANCE_TYPE).then(|| "spherical".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("unsupported configuration"));
    }

    #[test]
    fn json_and_toml_files_load() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("c.toml");
        std::fs::write(&toml_path, "seed = 9\n[model]\nn_states = 2\n").unwrap();
        let json_path = dir.path().join("c.json");
        std::fs::write(&json_path, r#"{"seed": 9, "model": {"n_states": 2}}"#).unwrap();
        assert_eq!(load_file(&toml_path).unwrap(), load_file(&json_path).unwrap());
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let err = load_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ValidationError::IoError(_)));
    }

    #[test]
    fn config_and_preset_conflict() {
        let err = load_config(Some(Path::new("x.toml")), Some(PresetName::Quick)).unwrap_err();
        assert!(matches!(err, ValidationError::SemanticError(_)));
    }
}
