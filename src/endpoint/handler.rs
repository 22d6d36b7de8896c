//! The per-route handler.
//!
//! # Request states
//! ```text
//! Received → KeyExtracted → Sharded → Forwarded | RejectedLocally → Reported
//! ```
//!
//! # Design Decisions
//! - Key extraction borrows the buffered body; the same `Bytes` is then
//!   forwarded and mirrored
//! - The mirror copy is launched after sharding and before forwarding,
//!   and is never awaited
//! - A backend 5xx is relayed unchanged but counted and reported as a
//!   backend error

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, Request};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use http_body_util::LengthLimitError;
use hyper::body::Incoming;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::validation::parse_backend_url;
use crate::config::{ConfigError, DispatcherConfig, RouteConfig};
use crate::endpoint::forward::{self, BackendClient};
use crate::endpoint::mirror::Mirror;
use crate::endpoint::RequestError;
use crate::http::request::request_id;
use crate::observability::{metrics, Monitor, Outcome, Reporter};
use crate::sharding::{ShardIndex, Sharder, SharderRegistry, Table};

/// Handles every request for one route.
pub struct Endpoint {
    name: Arc<str>,
    pattern: String,
    sharder: Arc<dyn Sharder>,
    table: Table,
    backends: Vec<Url>,
    client: BackendClient,
    reporter: Arc<Reporter>,
    monitor: Arc<Monitor>,
    mirror: Option<Mirror>,
    max_body_bytes: usize,
    backend_timeout: Duration,
}

impl Endpoint {
    /// Build the endpoint for `route`.
    ///
    /// Must be called from within a Tokio runtime: the reporter and
    /// monitor spawn their delivery workers here.
    pub fn from_route(
        route: &RouteConfig,
        config: &DispatcherConfig,
        registry: &SharderRegistry,
    ) -> Result<Self, ConfigError> {
        let sharder = registry.build(route)?;
        let backends = config
            .shards
            .iter()
            .map(|shard| backend_url(&shard.address))
            .collect::<Result<Vec<_>, _>>()?;
        let table = Table::new(backends.len())?;

        let name: Arc<str> = route.name.as_str().into();
        let client = forward::client();
        let reporter = Arc::new(Reporter::new(name.clone(), &config.reporter));
        let monitor = Arc::new(
            Monitor::new(name.clone(), table.shards(), &config.monitor)
                .with_report_drops(reporter.drop_counter()),
        );
        let backend_timeout = Duration::from_secs(config.timeouts.backend_secs);

        let mirror = match config.mirror.url.as_deref() {
            Some(url) => Some(Mirror::new(
                name.clone(),
                backend_url(url)?,
                client.clone(),
                config.mirror.max_in_flight,
                backend_timeout,
                monitor.clone(),
                reporter.clone(),
            )),
            None => None,
        };

        tracing::info!(
            route = %name,
            pattern = %route.pattern,
            kind = %route.kind,
            shards = table.shards(),
            mirror = mirror.as_ref().map(|m| m.target().as_str()).unwrap_or("-"),
            "Endpoint ready"
        );

        Ok(Self {
            name,
            pattern: route.pattern.clone(),
            sharder,
            table,
            backends,
            client,
            reporter,
            monitor,
            mirror,
            max_body_bytes: config.listener.max_body_bytes,
            backend_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Start the monitor's flush loop. It flushes once more when `stop` fires.
    pub fn start(&self, stop: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.monitor.clone().run(stop))
    }

    /// Wait, up to `timeout` each, for queued reports and summaries to reach
    /// their sinks. Call after the monitor loop has exited.
    pub async fn close(&self, timeout: Duration) {
        let (reports, summaries) = tokio::join!(self.reporter.close(timeout), self.monitor.close(timeout));
        if !(reports && summaries) {
            tracing::warn!(route = %self.name, "Undelivered reports or summaries abandoned at shutdown");
        }
    }

    /// Handle one request. Never panics; a panic while handling becomes a 500.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let id = request_id(request.headers()).map(str::to_owned);

        match AssertUnwindSafe(self.dispatch(request, start)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    route = %self.name,
                    request_id = id.as_deref().unwrap_or("-"),
                    panic = %message,
                    "Recovered from panic in request handler"
                );
                self.fail(None, RequestError::Internal(message), start, id.as_deref())
            }
        }
    }

    async fn dispatch(&self, request: Request<Body>, start: Instant) -> Response {
        let (parts, body) = request.into_parts();
        let id = request_id(&parts.headers);

        let body = match self.read_body(&parts, body).await {
            Ok(body) => body,
            Err(e) => return self.fail(None, e, start, id),
        };

        let shard = match self.sharder.shard(&body, &self.table) {
            Ok((_, shard)) => shard,
            Err(e) => return self.fail(None, e.into(), start, id),
        };
        tracing::debug!(route = %self.name, request_id = id.unwrap_or("-"), shard = %shard, "Request sharded");

        if let Some(mirror) = &self.mirror {
            mirror.replay(&parts, body.clone());
        }

        match self.forward(&parts, body, shard).await {
            Ok(response) => {
                let status = response.status();
                let outcome = if status.is_server_error() {
                    tracing::warn!(
                        route = %self.name,
                        request_id = id.unwrap_or("-"),
                        shard = %shard,
                        status = status.as_u16(),
                        "Backend responded with server error"
                    );
                    self.reporter.send(json!({
                        "request_id": id,
                        "shard": shard.get(),
                        "status": status.as_u16(),
                        "error": "backend responded with server error",
                    }));
                    Outcome::BackendError
                } else {
                    Outcome::Success
                };
                self.record(Some(shard), outcome, start);
                forward::relay(response)
            }
            Err(e) => self.fail(Some(shard), e, start, id),
        }
    }

    async fn read_body(&self, parts: &Parts, body: Body) -> Result<Bytes, RequestError> {
        let limit = self.max_body_bytes;
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(RequestError::PayloadTooLarge { limit });
        }

        axum::body::to_bytes(body, limit).await.map_err(|e| {
            let inner = e.into_inner();
            if inner.is::<LengthLimitError>() {
                RequestError::PayloadTooLarge { limit }
            } else {
                RequestError::BodyRead(inner.to_string())
            }
        })
    }

    async fn forward(
        &self,
        parts: &Parts,
        body: Bytes,
        shard: ShardIndex,
    ) -> Result<hyper::Response<Incoming>, RequestError> {
        let backend = self
            .backends
            .get(shard.get())
            .ok_or_else(|| RequestError::Internal(format!("no backend for shard {}", shard)))?;
        let request = forward::build_request(parts, body, backend, Some(shard))?;
        forward::send(&self.client, request, self.backend_timeout).await
    }

    /// Report, count and answer a failed request.
    fn fail(
        &self,
        shard: Option<ShardIndex>,
        error: RequestError,
        start: Instant,
        id: Option<&str>,
    ) -> Response {
        let status = error.status();
        tracing::warn!(
            route = %self.name,
            request_id = id.unwrap_or("-"),
            shard = ?shard.map(|s| s.get()),
            status = status.as_u16(),
            error = %error,
            "Request failed"
        );
        self.reporter.send(json!({
            "request_id": id,
            "shard": shard.map(|s| s.get()),
            "status": status.as_u16(),
            "error": error.to_string(),
        }));
        self.record(shard, error.outcome(), start);
        error.into_response()
    }

    fn record(&self, shard: Option<ShardIndex>, outcome: Outcome, start: Instant) {
        self.monitor.record(shard, outcome, Some(start.elapsed()));
        metrics::record_request(&self.name, shard, outcome, start);
    }
}

/// Parse a shard or mirror address. The forwarding client speaks plain HTTP only.
fn backend_url(address: &str) -> Result<Url, ConfigError> {
    let url = parse_backend_url(address).map_err(|e| ConfigError::InvalidUrl {
        url: address.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl {
            url: address.to_string(),
            reason: "only http:// backends are supported".to_string(),
        });
    }
    Ok(url)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
