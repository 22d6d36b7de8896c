//! Asynchronous error reporting.
//!
//! # Responsibilities
//! - Wrap diagnostic values into timestamped report events
//! - Hand events to the registered sink without blocking the caller
//!
//! # Design Decisions
//! - One sink per reporter; registering another replaces it
//! - Until a sink is registered, events go to a no-op sink
//! - Full queue drops the newest event (see `delivery.rs`)

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ReporterConfig;
use crate::observability::delivery::{Delivery, DeliveryStats};
use crate::observability::now_millis;
use crate::observability::sinks::{FnSink, Sink, SinkError};

/// A diagnostic value reported by an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Route that produced the event.
    pub route: String,
    /// Unix epoch milliseconds.
    pub timestamp_ms: u64,
    /// Arbitrary diagnostic payload.
    pub value: serde_json::Value,
}

/// Non-blocking channel from an endpoint to its report sink.
pub struct Reporter {
    route: Arc<str>,
    delivery: Delivery<ReportEvent>,
}

impl Reporter {
    /// Create a reporter with the no-op sink registered.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(route: Arc<str>, config: &ReporterConfig) -> Self {
        Self {
            delivery: Delivery::new("reporter", route.clone(), config.queue_capacity, config.workers),
            route,
        }
    }

    /// Register an async function as the sink.
    pub fn send_func<F, Fut>(&self, f: F)
    where
        F: Fn(ReportEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
    {
        self.delivery.set_sink(FnSink::new(f));
    }

    /// Register a sink.
    pub fn set_sink(&self, sink: impl Sink<ReportEvent>) {
        self.delivery.set_sink(sink);
    }

    /// Report a value. Returns immediately; false means the event was dropped.
    pub fn send<V: Serialize>(&self, value: V) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(route = %self.route, error = %e, "Dropping unserializable report");
                return false;
            }
        };

        self.delivery.submit(ReportEvent {
            route: self.route.to_string(),
            timestamp_ms: now_millis(),
            value,
        })
    }

    pub fn stats(&self) -> &DeliveryStats {
        self.delivery.stats()
    }

    /// Counter of dropped events; the monitor resets it at each flush.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.delivery.drop_counter()
    }

    /// Stop accepting events and wait, up to `timeout`, for queued ones to
    /// reach the sink.
    pub async fn close(&self, timeout: Duration) -> bool {
        self.delivery.close(timeout).await
    }
}
