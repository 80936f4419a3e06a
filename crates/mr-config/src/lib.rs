//! Microregime configuration loading and validation.
//!
//! This crate provides:
//! - The typed [`PipelineConfig`] replacing loose string-keyed settings
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Typed environment overrides
//! - Named presets
//! - Semantic validation, run once before any computation
//! - Config snapshots embedded in model bundles

pub mod load;
pub mod pipeline;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use load::{apply_env_overrides, apply_overrides, load_config, load_file, LoadedConfig};
pub use pipeline::{
    CausalityConfig, CombinationMode, FeatureConfig, MeanInit, ModelConfig, PipelineConfig,
    QualityConfig, TransitionInit, DEFAULT_DROP_COLUMNS,
};
pub use preset::PresetName;
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_pipeline, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
