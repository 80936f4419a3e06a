//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → `MR_CONFIG` → `MR_CONFIG_DIR` → XDG
//! config dir → `/etc/microregime` → built-in defaults.

use std::path::{Path, PathBuf};

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/microregime/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved configuration file location.
#[derive(Debug, Clone, Default)]
pub struct ConfigPath {
    /// `None` when falling back to built-in defaults.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

pub const ENV_CONFIG_PATH: &str = "MR_CONFIG";
pub const ENV_CONFIG_DIR: &str = "MR_CONFIG_DIR";

const CONFIG_FILENAME: &str = "microregime.toml";
const APP_NAME: &str = "microregime";

/// Resolve the configuration path from the process environment.
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    resolve_config_with(cli_path, |key| std::env::var(key).ok())
}

/// Resolution against an injectable environment.
///
/// An explicit CLI path is returned even when it does not exist, so that
/// loading reports the missing file instead of silently using defaults.
pub fn resolve_config_with(
    cli_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> ConfigPath {
    if let Some(path) = cli_path {
        return ConfigPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Some(env_path) = env(ENV_CONFIG_PATH) {
        return ConfigPath {
            path: Some(PathBuf::from(env_path)),
            source: ConfigSource::Environment,
        };
    }

    if let Some(dir) = env(ENV_CONFIG_DIR) {
        let path = PathBuf::from(dir).join(CONFIG_FILENAME);
        if path.exists() {
            return ConfigPath {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return ConfigPath {
                path: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    let system = system_config_dir().join(CONFIG_FILENAME);
    if system.exists() {
        return ConfigPath {
            path: Some(system),
            source: ConfigSource::SystemConfig,
        };
    }

    ConfigPath::default()
}

/// Get the XDG config directory for microregime.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(format!("{}", ConfigSource::BuiltinDefault), "builtin default");
    }

    #[test]
    fn cli_wins_over_environment() {
        let env = env_from(&[(ENV_CONFIG_PATH, "/tmp/env.toml".into())]);
        let resolved = resolve_config_with(Some(Path::new("/tmp/cli.toml")), env);
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path.unwrap(), PathBuf::from("/tmp/cli.toml"));
    }

    #[test]
    fn config_dir_is_used_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "").unwrap();
        let env = env_from(&[(ENV_CONFIG_DIR, dir.path().display().to_string())]);
        let resolved = resolve_config_with(None, env);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.unwrap(), dir.path().join(CONFIG_FILENAME));
    }

    #[test]
    fn empty_config_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_from(&[(ENV_CONFIG_DIR, dir.path().display().to_string())]);
        let resolved = resolve_config_with(None, env);
        assert_ne!(resolved.path, Some(dir.path().join(CONFIG_FILENAME)));
    }
}
