//! Engine host configuration.
//!
//! Read from `NODEFLOW_CONFIG_PATH` when set, otherwise from
//! `<config dir>/nodeflow/engine.json`. A missing file yields the defaults.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::{config_dir, data_dir};
use nodeflow_util::{ENCRYPTION_KEY_ENV_VAR, expand_home, resolve_path};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV_VAR: &str = "NODEFLOW_CONFIG_PATH";

const APP_DIR: &str = "nodeflow";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// JSON lines file receiving execution log entries.
    pub execution_log_path: PathBuf,
    /// JSON array of encrypted integration records.
    pub credentials_path: PathBuf,
    /// Environment variable holding the hex encryption key.
    pub encryption_key_env: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_log_path: data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("executions.jsonl"),
            credentials_path: config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("integrations.json"),
            encryption_key_env: ENCRYPTION_KEY_ENV_VAR.to_string(),
        }
    }
}

impl EngineConfig {
    /// Expands `~` and anchors relative paths at the directory holding the config file.
    fn resolve_paths(mut self, config_path: &Path) -> Self {
        let base = config_path.parent().filter(|parent| !parent.as_os_str().is_empty());
        self.execution_log_path = resolve_path(&self.execution_log_path, base);
        self.credentials_path = resolve_path(&self.credentials_path, base);
        self
    }
}

/// Returns the configuration file location.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV_VAR)
        && !path.trim().is_empty()
    {
        return expand_home(Path::new(path.trim()));
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR).join("engine.json")
}

/// Loads configuration from the default location.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads configuration from `path`, falling back to defaults when it does not exist.
pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: EngineConfig = serde_json::from_str(&content).map_err(|error| ConfigError::Parse {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    Ok(config.resolve_paths(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/nodeflow/engine.json";
        temp_env::with_var(CONFIG_PATH_ENV_VAR, Some(override_path), || {
            assert_eq!(default_config_path(), expand_home(Path::new(override_path)));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = load_config_from_path(&temp_dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.encryption_key_env, "NODEFLOW_ENCRYPTION_KEY");
    }

    #[test]
    fn partial_files_merge_with_defaults_and_expand_home() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{"executionLogPath": "~/logs/runs.jsonl", "encryptionKeyEnv": "MY_KEY"}"#).expect("write");

        let config = load_config_from_path(&path).expect("config");
        assert_eq!(config.execution_log_path, expand_home(Path::new("~/logs/runs.jsonl")));
        assert_eq!(config.encryption_key_env, "MY_KEY");
        assert_eq!(config.credentials_path, EngineConfig::default().credentials_path);
    }

    #[test]
    fn relative_paths_resolve_next_to_the_config_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{"credentialsPath": "secrets/integrations.json"}"#).expect("write");

        let config = load_config_from_path(&path).expect("config");
        assert_eq!(config.credentials_path, temp_dir.path().join("secrets/integrations.json"));
    }

    #[test]
    fn malformed_files_are_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, "{not json").expect("write");
        assert!(matches!(load_config_from_path(&path), Err(ConfigError::Parse { .. })));
    }
}
