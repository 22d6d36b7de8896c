//! HTTP server setup.
//!
//! # Responsibilities
//! - Build one `Endpoint` per configured route
//! - Install HTTP sinks for reports and summaries when URLs are configured
//! - Mount each endpoint on its URL pattern
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve until shutdown and the drain completes, then flush every monitor
//!   once more and wait for queued reports and summaries to be delivered
//!
//! # Design Decisions
//! - Patterns ending in `/` match their whole subtree; others match exactly
//! - Unmatched requests get a 404 and touch no endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use futures_util::future::join_all;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::validation::{parse_backend_url, validate_config};
use crate::config::{ConfigError, DispatcherConfig};
use crate::endpoint::Endpoint;
use crate::lifecycle::Shutdown;
use crate::observability::HttpPostSink;
use crate::sharding::SharderRegistry;

/// Composition root: every route's endpoint behind one router.
pub struct Dispatcher {
    router: Router,
    endpoints: Vec<Arc<Endpoint>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Validate `config` and build the dispatcher with the built-in sharder kinds.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        Self::with_registry(config, &SharderRegistry::default())
    }

    /// Like `new`, resolving sharder kinds through `registry`.
    pub fn with_registry(
        config: DispatcherConfig,
        registry: &SharderRegistry,
    ) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let post_timeout = Duration::from_secs(config.reporter.post_timeout_secs);
        let report_sink = post_sink(config.reporter.url.as_deref(), post_timeout)?;
        let summary_sink = post_sink(config.monitor.url.as_deref(), post_timeout)?;

        let mut endpoints = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let endpoint = Endpoint::from_route(route, &config, registry)?;
            if let Some(sink) = &report_sink {
                endpoint.reporter().set_sink(sink.clone());
            }
            if let Some(sink) = &summary_sink {
                endpoint.monitor().set_sink(sink.clone());
            }
            endpoints.push(Arc::new(endpoint));
        }

        let router = Self::build_router(&config, &endpoints);
        Ok(Self {
            router,
            endpoints,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatcherConfig, endpoints: &[Arc<Endpoint>]) -> Router {
        endpoints
            .iter()
            .fold(Router::new(), |router, endpoint| mount(router, endpoint.clone()))
            .fallback(not_found)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn endpoint(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.iter().find(|e| e.name() == name)
    }

    /// The fully layered router, for serving on a custom transport.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` triggers.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.endpoints.len(),
            "HTTP server starting"
        );

        // Monitors stop on their own signal, fired only once the drain is over.
        let stop_monitors = Shutdown::new();
        let monitors: Vec<_> = self
            .endpoints
            .iter()
            .map(|endpoint| endpoint.start(stop_monitors.subscribe()))
            .collect();

        let mut signal = shutdown.subscribe();
        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;
        tracing::info!("HTTP server stopped");

        stop_monitors.trigger();
        for monitor in monitors {
            let _ = monitor.await;
        }

        let drain = Duration::from_secs(self.config.reporter.post_timeout_secs);
        join_all(self.endpoints.iter().map(|endpoint| endpoint.close(drain))).await;
        tracing::info!("Final reports and summaries delivered");

        served
    }
}

fn mount(router: Router, endpoint: Arc<Endpoint>) -> Router {
    let pattern = endpoint.pattern().to_string();
    let handler = move |request: Request<Body>| async move { endpoint.handle(request).await };

    if pattern.ends_with('/') {
        router
            .route(&pattern, any(handler.clone()))
            .route(&format!("{pattern}{{*rest}}"), any(handler))
    } else {
        router.route(&pattern, any(handler))
    }
}

fn post_sink(url: Option<&str>, timeout: Duration) -> Result<Option<HttpPostSink>, ConfigError> {
    let Some(url) = url else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let parsed = parse_backend_url(url).map_err(|e| invalid(e.to_string()))?;
    HttpPostSink::new(parsed, timeout)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "no route matches this path" })),
    )
}
