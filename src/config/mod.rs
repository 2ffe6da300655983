//! # Engine Configuration
//!
//! Settings of the message processing core. Values are layered by [`ConfigManager`]: built-in
//! defaults, then an optional configuration file, then `EBMS__`-prefixed environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ebms_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let strict = manager.config().strict_header_validation;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::events::EventHandlerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Identifier of the validator set used when none is configured
pub const DEFAULT_VALIDATOR_SET: &str = "default";

/// Root configuration of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Use strict header validation for every message, regardless of its P-Mode
    pub strict_header_validation: bool,
    /// Identifier of the registered header validator set
    pub validator_set: String,
    pub retry: RetryConfig,
    pub purge: PurgeConfig,
    /// Global event handlers, consulted after the leg and P-Mode level handlers
    pub event_handlers: Vec<EventHandlerConfig>,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_header_validation: false,
            validator_set: DEFAULT_VALIDATOR_SET.to_string(),
            retry: RetryConfig::default(),
            purge: PurgeConfig::default(),
            event_handlers: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// How often the reception awareness sweep looks for overdue receipts
    pub sweep_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Message units whose last state change is older than this are removed
    pub retention_days: u32,
    pub sweep_interval_ms: u64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            sweep_interval_ms: 3_600_000,
        }
    }
}

impl PurgeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit log lines as JSON instead of the human readable format
    pub json: bool,
}

impl EngineConfig {
    /// Validate configuration values that cannot be expressed in the types
    pub fn validate(&self) -> ConfigResult<()> {
        if self.validator_set.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "validator_set",
                "engine configuration",
            ));
        }

        if self.retry.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.sweep_interval_ms",
                "0",
                "sweep interval must be greater than 0",
            ));
        }

        if self.purge.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "purge.sweep_interval_ms",
                "0",
                "sweep interval must be greater than 0",
            ));
        }

        for (index, handler) in self.event_handlers.iter().enumerate() {
            if handler.factory.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    format!("event_handlers[{index}].factory"),
                    "event handler configuration",
                ));
            }
        }

        Ok(())
    }
}
