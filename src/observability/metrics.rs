//! Prometheus metrics.
//!
//! # Metrics
//! - `dispatcher_requests_total` (counter): requests by route, shard, outcome
//! - `dispatcher_request_duration_seconds` (histogram): latency by route
//! - `dispatcher_mirror_total` (counter): mirror attempts by route, result
//! - `dispatcher_sink_dropped_total` (counter): queue overflows by route, sink
//!
//! Recording is a no-op until `init_metrics` installs the recorder, so
//! library users and tests pay nothing for it.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::monitor::{MirrorResult, Outcome};
use crate::sharding::ShardIndex;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metric_descriptions();
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "dispatcher_requests_total",
        "Total requests handled, by route, shard and outcome"
    );
    describe_histogram!(
        "dispatcher_request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    describe_counter!(
        "dispatcher_mirror_total",
        "Mirror attempts, by route and result"
    );
    describe_counter!(
        "dispatcher_sink_dropped_total",
        "Items dropped because a sink queue was full"
    );
}

/// Record a finished request.
pub fn record_request(route: &str, shard: Option<ShardIndex>, outcome: Outcome, start: Instant) {
    let shard = shard.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
    counter!(
        "dispatcher_requests_total",
        "route" => route.to_string(),
        "shard" => shard,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("dispatcher_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_mirror(route: &str, result: MirrorResult) {
    counter!(
        "dispatcher_mirror_total",
        "route" => route.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
}

pub fn record_sink_dropped(route: &str, sink: &'static str) {
    counter!(
        "dispatcher_sink_dropped_total",
        "route" => route.to_string(),
        "sink" => sink
    )
    .increment(1);
}
