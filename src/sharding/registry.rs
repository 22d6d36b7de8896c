//! Sharder registry.
//!
//! # Responsibilities
//! - Map sharder kind names to constructors
//! - Decode a route's sharder blob in two phases: the kind picks the
//!   constructor, the constructor decodes the blob into its typed settings
//!
//! # Design Decisions
//! - Closed set of built-in kinds, extensible by registering more constructors
//! - Unknown kinds are a fatal startup error

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::{ConfigError, RouteConfig};
use crate::sharding::content_field::{ContentFieldConfig, ContentFieldSharder};
use crate::sharding::Sharder;

/// Builds a sharder from its settings blob.
pub type SharderConstructor = fn(&Value) -> Result<Arc<dyn Sharder>, String>;

/// Kind name of the built-in content-field sharder.
pub const CONTENT_FIELD: &str = "content-field";

/// Alias accepted for route files written for the original dispatcher.
pub const JSON_ALIAS: &str = "json";

/// Map from sharder kind name to constructor.
#[derive(Clone)]
pub struct SharderRegistry {
    constructors: BTreeMap<String, SharderConstructor>,
}

impl SharderRegistry {
    /// Create a registry with no kinds registered.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, constructor: SharderConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the sharder for a route.
    pub fn build(&self, route: &RouteConfig) -> Result<Arc<dyn Sharder>, ConfigError> {
        let constructor =
            self.constructors
                .get(&route.kind)
                .ok_or_else(|| ConfigError::UnknownSharderKind {
                    route: route.name.clone(),
                    kind: route.kind.clone(),
                })?;

        constructor(&route.sharder).map_err(|reason| ConfigError::InvalidSharder {
            kind: route.kind.clone(),
            reason,
        })
    }
}

impl Default for SharderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CONTENT_FIELD, content_field);
        registry.register(JSON_ALIAS, content_field);
        registry
    }
}

fn content_field(settings: &Value) -> Result<Arc<dyn Sharder>, String> {
    let config = ContentFieldConfig::deserialize(settings).map_err(|e| e.to_string())?;
    if config.field.is_empty() || config.field.split('.').any(str::is_empty) {
        return Err(format!("invalid field path '{}'", config.field));
    }
    Ok(Arc::new(ContentFieldSharder::from_config(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(kind: &str, sharder: Value) -> RouteConfig {
        RouteConfig {
            name: "orders".into(),
            pattern: "/orders".into(),
            kind: kind.into(),
            sharder,
        }
    }

    #[test]
    fn test_builds_content_field() {
        let registry = SharderRegistry::default();
        let sharder = registry
            .build(&route("content-field", json!({ "field": "customer_id" })))
            .unwrap();
        let key = sharder.derive_key(br#"{"customer_id":"abc"}"#).unwrap();
        assert_eq!(key.as_bytes(), br#""abc""#);
    }

    #[test]
    fn test_json_alias() {
        let registry = SharderRegistry::default();
        assert!(registry.build(&route("json", json!({ "field": "id" }))).is_ok());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["content-field", "json"]);
    }

    #[test]
    fn test_unknown_kind() {
        let registry = SharderRegistry::default();
        let err = registry.build(&route("header", json!({}))).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownSharderKind { ref kind, .. } if kind == "header"
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let registry = SharderRegistry::default();

        let missing = registry.build(&route("content-field", json!({}))).unwrap_err();
        assert!(matches!(missing, ConfigError::InvalidSharder { .. }));

        let unknown_key = registry
            .build(&route("content-field", json!({ "field": "id", "extra": 1 })))
            .unwrap_err();
        assert!(matches!(unknown_key, ConfigError::InvalidSharder { .. }));

        let empty_segment = registry
            .build(&route("content-field", json!({ "field": "a..b" })))
            .unwrap_err();
        assert!(empty_segment.to_string().contains("a..b"));
    }

    #[test]
    fn test_custom_kind() {
        fn fixed(_: &Value) -> Result<Arc<dyn Sharder>, String> {
            Ok(Arc::new(ContentFieldSharder::new("tenant")))
        }

        let mut registry = SharderRegistry::empty();
        registry.register("tenant", fixed);
        assert!(registry.build(&route("tenant", Value::Null)).is_ok());
        assert!(registry.build(&route("content-field", Value::Null)).is_err());
    }
}
