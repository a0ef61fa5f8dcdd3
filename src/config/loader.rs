// src/config/loader.rs
//! Layered configuration loader: defaults, TOML files, then `EXO_` environment overrides

use crate::config::{constants::paths, ExperimentConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loader that merges files over built-in defaults
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
    current_config: ExperimentConfig,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Configuration parse error: {0}")]
    ParseError(String),
    #[error("Configuration validation errors: {}", .0.join("; "))]
    ValidationError(Vec<String>),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl ConfigLoader {
    /// Create a loader over the default search paths
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Create loader with custom paths, later paths taking precedence
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: paths::ENV_PREFIX.to_string(),
            current_config: ExperimentConfig::default(),
        }
    }

    /// Use a different environment prefix (mainly for tests)
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    /// Load and validate the experiment configuration
    pub fn load(&mut self) -> Result<ExperimentConfig, ConfigError> {
        let config = self.load_and_merge_configs()?;
        config.validate_consistency().map_err(ConfigError::ValidationError)?;

        info!(
            trials = config.total_trials(),
            conditions = config.conditions.len(),
            live_prediction = config.experiment.live_prediction,
            "Configuration loaded"
        );
        self.current_config = config.clone();
        Ok(config)
    }

    /// Last successfully loaded configuration
    pub fn current_config(&self) -> &ExperimentConfig {
        &self.current_config
    }

    /// Validate a single configuration file without loading it
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut merged = toml::Value::try_from(ExperimentConfig::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let file_config = self.load_config_file(path)?;
        merge_toml_values(&mut merged, file_config);

        let config: ExperimentConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
        config.validate_consistency().map_err(ConfigError::ValidationError)
    }

    /// Export current configuration to file
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(&self.current_config)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn load_and_merge_configs(&self) -> Result<ExperimentConfig, ConfigError> {
        let mut merged_config = toml::Value::try_from(ExperimentConfig::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        for config_path in &self.config_paths {
            match self.load_config_file(config_path) {
                Ok(file_config) => {
                    debug!(path = %config_path.display(), "Merging configuration file");
                    merge_toml_values(&mut merged_config, file_config);
                }
                // Missing optional files are skipped
                Err(ConfigError::FileNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        self.apply_environment_overrides(&mut merged_config);

        merged_config
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))
    }

    fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<toml::Value, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: toml::Value = toml::from_str(&content)?;

        Ok(config)
    }

    /// `EXO_TIMING_TRIAL_TIMEOUT_S=4` sets `timing.trial_timeout_s`
    fn apply_environment_overrides(&self, config: &mut toml::Value) {
        for (key, value) in std::env::vars() {
            let Some(stripped) = key.strip_prefix(&self.env_prefix) else {
                continue;
            };
            let lowered = stripped.to_lowercase();
            let Some((section, field)) = lowered.split_once('_') else {
                continue;
            };

            if let toml::Value::Table(root) = config {
                if let Some(toml::Value::Table(table)) = root.get_mut(section) {
                    debug!(section, field, "Applying environment override");
                    table.insert(field.to_string(), parse_env_value(&value));
                }
            }
        }
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        // Arrays (e.g. the condition list) replace rather than merge
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_load_defaults_without_files() {
        let mut loader = ConfigLoader::with_paths(vec![PathBuf::from("/nonexistent/exo.toml")])
            .with_env_prefix("EXO_TEST_NONE_");
        let config = loader.load().unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn test_later_files_take_precedence() {
        let base = write_config(
            r#"
[timing]
trial_timeout_s = 4.0
tick_rate_hz = 50
"#,
        );
        let local = write_config(
            r#"
[timing]
trial_timeout_s = 6.0

[[conditions]]
assist_mode = "oppose"
trials = 4
profile = "sinusoidal"
magnitude = 1.5
"#,
        );

        let mut loader = ConfigLoader::with_paths(vec![
            base.path().to_path_buf(),
            local.path().to_path_buf(),
        ])
        .with_env_prefix("EXO_TEST_NONE_");
        let config = loader.load().unwrap();

        assert_eq!(config.timing.trial_timeout_s, 6.0);
        assert_eq!(config.timing.tick_rate_hz, 50);
        assert_eq!(config.conditions.len(), 1);
        assert_eq!(config.conditions[0].profile, "sinusoidal");
    }

    #[test]
    fn test_invalid_config_validation() {
        let loader = ConfigLoader::with_paths(vec![]);
        let temp_file = write_config(
            r#"
[timing]
imagination_range_s = [3.0, 1.0]
"#,
        );

        match loader.validate_config_file(temp_file.path()) {
            Err(ConfigError::ValidationError(errors)) => {
                assert!(errors[0].contains("imagination_range_s"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_is_reported() {
        let temp_file = write_config("[timing\ntrial_timeout_s = ");
        let mut loader = ConfigLoader::with_paths(vec![temp_file.path().to_path_buf()])
            .with_env_prefix("EXO_TEST_NONE_");
        assert!(matches!(loader.load(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        unsafe {
            std::env::set_var("EXO_ENVTEST_TIMING_TRIAL_TIMEOUT_S", "3.5");
            std::env::set_var("EXO_ENVTEST_EXPERIMENT_LIVE_PREDICTION", "true");
        }

        let mut loader = ConfigLoader::with_paths(vec![]).with_env_prefix("EXO_ENVTEST_");
        let config = loader.load();

        unsafe {
            std::env::remove_var("EXO_ENVTEST_TIMING_TRIAL_TIMEOUT_S");
            std::env::remove_var("EXO_ENVTEST_EXPERIMENT_LIVE_PREDICTION");
        }

        let config = config.unwrap();
        assert_eq!(config.timing.trial_timeout_s, 3.5);
        assert!(config.experiment.live_prediction);
    }

    #[test]
    fn test_config_export() {
        let mut loader = ConfigLoader::with_paths(vec![]).with_env_prefix("EXO_TEST_NONE_");
        loader.load().unwrap();
        let temp_file = NamedTempFile::new().unwrap();

        loader.export_config(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("[timing]"));
        assert!(content.contains("[[conditions]]"));
    }
}
