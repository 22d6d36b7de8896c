//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Shard backends, in shard index order.
    pub shards: Vec<ShardConfig>,

    /// Route definitions mapping URL patterns to sharders.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Error report delivery.
    pub reporter: ReporterConfig,

    /// Metric summary aggregation and delivery.
    pub monitor: MonitorConfig,

    /// Traffic mirroring.
    pub mirror: MirrorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered for sharding, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// A single shard backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShardConfig {
    /// Backend address, either "host:port" or a full "http://host:port" URL.
    pub address: String,
}

/// Route configuration binding a URL pattern to a sharder.
///
/// Field names also accept the capitalized form used by the JSON routes file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    #[serde(alias = "Name")]
    pub name: String,

    /// URL pattern. A trailing `/` matches the whole subtree.
    #[serde(alias = "Pattern")]
    pub pattern: String,

    /// Sharder kind (e.g. "content-field").
    #[serde(alias = "Kind")]
    pub kind: String,

    /// Sharder-specific settings, decoded by the sharder registered for `kind`.
    #[serde(alias = "Sharder", default)]
    pub sharder: serde_json::Value,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for a shard backend to produce response headers, in seconds.
    pub backend_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            backend_secs: 10,
        }
    }
}

/// Error report delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// URL where error reports are posted as JSON. Reports are dropped when unset.
    pub url: Option<String>,

    /// Bounded queue capacity; newest events are dropped when full.
    pub queue_capacity: usize,

    /// Number of workers invoking the sink.
    pub workers: usize,

    /// Timeout for a single POST to `url`, in seconds.
    pub post_timeout_secs: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            url: None,
            queue_capacity: 1024,
            workers: 2,
            post_timeout_secs: 5,
        }
    }
}

/// Metric summary aggregation and delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// URL where metric summaries are posted as JSON. Summaries are dropped when unset.
    pub url: Option<String>,

    /// Flush interval in seconds.
    pub interval_secs: u64,

    /// Bounded queue capacity for pending summaries.
    pub queue_capacity: usize,

    /// Number of workers invoking the sink.
    pub workers: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_secs: 10,
            queue_capacity: 16,
            workers: 1,
        }
    }
}

/// Traffic mirroring.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// URL where successfully sharded requests are repeated. Mirroring is off when unset.
    pub url: Option<String>,

    /// Maximum mirror requests in flight per route; extra copies are dropped.
    pub max_in_flight: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_in_flight: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: DispatcherConfig = toml::from_str(
            r#"
            [[shards]]
            address = "127.0.0.1:9001"

            [[routes]]
            name = "orders"
            pattern = "/orders"
            kind = "content-field"
            sharder = { field = "customer_id" }
            "#,
        )
        .unwrap();

        assert_eq!(config.shards.len(), 1);
        assert_eq!(config.routes[0].sharder["field"], "customer_id");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.reporter.queue_capacity, 1024);
        assert!(config.mirror.url.is_none());
    }

    #[test]
    fn test_capitalized_route_keys() {
        let routes: Vec<RouteConfig> = serde_json::from_str(
            r#"[{"Name": "orders", "Pattern": "/orders/", "Kind": "json", "Sharder": {"field": "id"}}]"#,
        )
        .unwrap();

        assert_eq!(routes[0].name, "orders");
        assert_eq!(routes[0].pattern, "/orders/");
        assert_eq!(routes[0].kind, "json");
    }
}
