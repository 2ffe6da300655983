//! Configuration Loader
//!
//! Environment-aware, layered configuration loading built on the `config` crate. Sources are
//! merged in this order, later sources winning:
//!
//! 1. built-in defaults ([`EngineConfig::default`])
//! 2. `config/ebms-core.{toml,yaml,json}` (or an explicit file)
//! 3. `config/ebms-core.{environment}.{toml,yaml,json}` when present
//! 4. environment variables such as `EBMS__STRICT_HEADER_VALIDATION=true` or
//!    `EBMS__RETRY__SWEEP_INTERVAL_MS=1000`

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "EBMS";

const DEFAULT_CONFIG_BASENAME: &str = "config/ebms-core";

/// Loaded engine configuration together with the environment it was loaded for
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_file(None)
    }

    /// Load configuration, reading the given file instead of the default location
    pub fn load_from_file(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_with(path, &environment, ENV_PREFIX)
    }

    /// Load configuration with an explicit environment and override prefix.
    /// This is useful for testing without touching the variables other loads read.
    pub fn load_with(
        path: Option<&Path>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = ::config::Config::try_from(&EngineConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = ::config::Config::builder().add_source(defaults);

        let config_file = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigurationError::file_not_found(path));
                }
                builder = builder.add_source(::config::File::from(path));
                Some(path.to_path_buf())
            }
            None => {
                builder = builder
                    .add_source(::config::File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
                    .add_source(
                        ::config::File::with_name(&format!(
                            "{DEFAULT_CONFIG_BASENAME}.{environment}"
                        ))
                        .required(false),
                    );
                None
            }
        };

        builder = builder.add_source(
            ::config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let source_name = config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_BASENAME.to_string());

        let config: EngineConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(source_name.clone(), e))?;

        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            source = %source_name,
            strict_header_validation = config.strict_header_validation,
            validator_set = %config.validator_set,
            global_handlers = config.event_handlers.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_file,
        }))
    }

    /// Wrap an already built configuration, e.g. one assembled in code by an embedding application
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The explicitly loaded configuration file, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Detect current environment from environment variables
    pub(crate) fn detect_environment() -> String {
        env::var("EBMS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
strict_header_validation = true

[retry]
sweep_interval_ms = 250
"#
        )
        .unwrap();

        let manager =
            ConfigManager::load_with(Some(file.path()), "test", "EBMS_LOADER_UNIT_A").unwrap();
        assert!(manager.config().strict_header_validation);
        assert_eq!(manager.config().retry.sweep_interval_ms, 250);
        // untouched sections keep their defaults
        assert_eq!(manager.config().purge.retention_days, 30);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigManager::load_with(
            Some(Path::new("/nonexistent/ebms-core.toml")),
            "test",
            "EBMS_LOADER_UNIT_B",
        );
        assert!(matches!(result, Err(ConfigurationError::FileNotFound { .. })));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[purge]\nsweep_interval_ms = 0").unwrap();

        let result = ConfigManager::load_with(Some(file.path()), "test", "EBMS_LOADER_UNIT_C");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }
}
