//! Configuration parsing and validation for stricture
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (endpoint, poll interval, retry policy)
//! - A declarative schedule: default assumption, daily window,
//!   day-of-week sets and date-specific overrides
//! - Validation with clear error messages
//!
//! A schedule on its own can also be given as a JSON dictionary.

mod schedule;
mod schema;
mod validation;

pub use schedule::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    // Validate
    let errors = validate_config(&raw);
    if !errors.is_empty() {
        debug!(count = errors.len(), "Configuration failed validation");
        return Err(ConfigError::ValidationFailed { errors });
    }

    Config::from_raw(raw)
}

/// Parse and validate a schedule from its JSON dictionary form
pub fn parse_schedule_json(content: &str) -> ConfigResult<ScheduleConfig> {
    let raw: RawSchedule = serde_json::from_str(content)?;
    ScheduleConfig::try_from(raw)
}

/// Build a schedule from an already-parsed JSON value
pub fn schedule_from_value(value: serde_json::Value) -> ConfigResult<ScheduleConfig> {
    let raw: RawSchedule = serde_json::from_value(value)?;
    ScheduleConfig::try_from(raw)
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;
