//! # Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, and configuration merging: a single
//! `vigil-config.yaml` carries the base settings plus optional
//! `development:` / `test:` / `production:` sections that override the base
//! for the active environment.

use super::error::{ConfigResult, ConfigurationError};
use super::VigilConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENVIRONMENT_SECTIONS: &[&str] = &["development", "test", "production"];

/// Loaded and validated configuration plus the environment it was built for
#[derive(Debug)]
pub struct ConfigManager {
    config: VigilConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// This is useful for testing without modifying global environment
    /// variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            sources = config.sources.len(),
            max_concurrent = config.scheduler.max_concurrent_sources,
            "✅ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an in-code configuration, validating it the same way file
    /// loading does. Used by embedding applications and tests.
    pub fn from_config(config: VigilConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::new(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var("VIGIL_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Get default configuration directory
    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("VIGIL_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let possible_names = vec!["vigil-config.yaml", "vigil-config.yml"];
        let mut searched_paths = Vec::new();

        for name in possible_names {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Safely read a configuration file with a size limit
    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Configuration file too large ({}MB > {}MB limit)",
                    metadata.len() / (1024 * 1024),
                    MAX_CONFIG_FILE_SIZE / (1024 * 1024)
                ),
            ));
        }

        if !metadata.is_file() {
            return Err(ConfigurationError::invalid_value(
                "file_type",
                "directory or special file".to_string(),
                "Configuration path must point to a regular file",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<VigilConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        // Apply environment-specific overrides
        if let Some(env_overrides) = yaml_data.get(environment).cloned() {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        // Remove environment sections so they never deserialize as settings
        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(*section);
            }
        }

        let config: VigilConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                // Non-mapping values override completely; this includes the
                // source list, which replaces rather than appends
                *base_ref = override_val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, content: &str) {
        let mut file = std::fs::File::create(dir.join("vigil-config.yaml")).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_missing_config_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result.unwrap_err(),
            ConfigurationError::FileNotFound { .. }
        ));
    }

    #[test]
    fn test_environment_override_merging() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
scheduler:
  max_concurrent_sources: 10
  run_timeout_seconds: 120
sources:
  - name: fr-bulk
test:
  scheduler:
    run_timeout_seconds: 5
"#,
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        // Overridden by the test section
        assert_eq!(manager.config().scheduler.run_timeout_seconds, 5);
        // Untouched base value survives the merge
        assert_eq!(manager.config().scheduler.max_concurrent_sources, 10);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_other_environment_sections_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
scheduler:
  run_timeout_seconds: 120
production:
  scheduler:
    run_timeout_seconds: 300
"#,
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config().scheduler.run_timeout_seconds, 120);
    }

    #[test]
    fn test_invalid_config_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
resilience:
  breaker:
    failure_threshold: 0
"#,
        );

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = VigilConfig::default();
        config.health.floor_multiplier = 0.5;
        assert!(ConfigManager::from_config(config, "test").is_err());

        let manager = ConfigManager::from_config(VigilConfig::default(), "test").unwrap();
        assert_eq!(manager.environment(), "test");
    }
}
