//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{DispatcherConfig, RouteConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Startup errors. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Routes file parse error: {0}")]
    RoutesParse(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("shard count must be at least 1, got {0}")]
    InvalidShardCount(usize),

    #[error("route '{route}' uses unknown sharder kind '{kind}'")]
    UnknownSharderKind { route: String, kind: String },

    #[error("invalid '{kind}' sharder settings: {reason}")]
    InvalidSharder { kind: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DispatcherConfig, ConfigError> {
    let config = read_config(path)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration from a TOML file, leaving validation to the caller.
///
/// Used when command line overrides are applied before validating.
pub fn read_config(path: &Path) -> Result<DispatcherConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration text without validating it.
pub fn parse_config(content: &str) -> Result<DispatcherConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load a JSON routes file: an array of `{Name, Pattern, Kind, Sharder}` objects.
pub fn load_routes(path: &Path) -> Result<Vec<RouteConfig>, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
