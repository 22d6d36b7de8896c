//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, capacities > 0)
//! - Validate addresses and URLs
//! - Detect duplicate route names and patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Sharder kinds are checked later, when the registry builds each route

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::DispatcherConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("at least one shard must be configured")]
    NoShards,

    #[error("shard {index} has invalid address '{address}'")]
    ShardAddress { index: usize, address: String },

    #[error("no routes configured")]
    NoRoutes,

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("duplicate route name '{0}'")]
    DuplicateRouteName(String),

    #[error("route '{route}' pattern '{pattern}' must be a literal path: start with '/', no '{{' or '}}', no segment starting with ':' or '*'")]
    InvalidPattern { route: String, pattern: String },

    #[error("duplicate route pattern '{0}'")]
    DuplicatePattern(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} has invalid URL '{url}'")]
    Url { field: &'static str, url: String },
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.shards.is_empty() {
        errors.push(ValidationError::NoShards);
    }
    for (index, shard) in config.shards.iter().enumerate() {
        if parse_backend_url(&shard.address).is_err() {
            errors.push(ValidationError::ShardAddress {
                index,
                address: shard.address.clone(),
            });
        }
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }
    let mut names = HashSet::new();
    let mut patterns = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(i));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRouteName(route.name.clone()));
        }

        if !is_literal_pattern(&route.pattern) {
            errors.push(ValidationError::InvalidPattern {
                route: route.name.clone(),
                pattern: route.pattern.clone(),
            });
        } else if !patterns.insert(route.pattern.as_str()) {
            errors.push(ValidationError::DuplicatePattern(route.pattern.clone()));
        }
    }

    let positive = [
        ("listener.max_body_bytes", config.listener.max_body_bytes as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.backend_secs", config.timeouts.backend_secs),
        ("reporter.queue_capacity", config.reporter.queue_capacity as u64),
        ("reporter.workers", config.reporter.workers as u64),
        ("reporter.post_timeout_secs", config.reporter.post_timeout_secs),
        ("monitor.interval_secs", config.monitor.interval_secs),
        ("monitor.queue_capacity", config.monitor.queue_capacity as u64),
        ("monitor.workers", config.monitor.workers as u64),
        ("mirror.max_in_flight", config.mirror.max_in_flight as u64),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let urls = [
        ("reporter.url", &config.reporter.url),
        ("monitor.url", &config.monitor.url),
        ("mirror.url", &config.mirror.url),
    ];
    for (field, url) in urls {
        if let Some(url) = url {
            if parse_backend_url(url).is_err() {
                errors.push(ValidationError::Url {
                    field,
                    url: url.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Patterns are mounted as literal paths, so anything the router would read
/// as a capture or wildcard is refused here rather than at mount time.
fn is_literal_pattern(pattern: &str) -> bool {
    pattern.starts_with('/')
        && !pattern.contains(['{', '}'])
        && !pattern.split('/').any(|segment| segment.starts_with([':', '*']))
}

/// Parse a backend address. Bare "host:port" values are treated as plain HTTP.
pub fn parse_backend_url(address: &str) -> Result<Url, url::ParseError> {
    let url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{}", address))?
    };

    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(url::ParseError::EmptyHost),
    }
}
