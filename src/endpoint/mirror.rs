//! Best-effort request mirroring.
//!
//! Each sharded request is replayed once against a fixed target on a
//! detached task. The number of copies in flight is bounded by a
//! semaphore; when no permit is free the copy is dropped.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::request::Parts;
use tokio::sync::Semaphore;
use url::Url;

use crate::endpoint::forward::{self, BackendClient};
use crate::observability::{metrics, MirrorResult, Monitor, Reporter};

pub struct Mirror {
    route: Arc<str>,
    target: Url,
    client: BackendClient,
    permits: Arc<Semaphore>,
    timeout: Duration,
    monitor: Arc<Monitor>,
    reporter: Arc<Reporter>,
}

impl Mirror {
    pub fn new(
        route: Arc<str>,
        target: Url,
        client: BackendClient,
        max_in_flight: usize,
        timeout: Duration,
        monitor: Arc<Monitor>,
        reporter: Arc<Reporter>,
    ) -> Self {
        Self {
            route,
            target,
            client,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            timeout,
            monitor,
            reporter,
        }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Launch a copy of the request. Never waits on the mirror target.
    pub fn replay(&self, parts: &Parts, body: Bytes) {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            tracing::debug!(route = %self.route, "Mirror limit reached, dropping copy");
            self.finish(MirrorResult::Dropped);
            return;
        };

        let request = match forward::build_request(parts, body, &self.target, None) {
            Ok(request) => request,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        let client = self.client.clone();
        let timeout = self.timeout;
        let route = self.route.clone();
        let monitor = self.monitor.clone();
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let result = match forward::send(&client, request, timeout).await {
                Ok(response) if !response.status().is_server_error() => Ok(()),
                Ok(response) => Err(format!("mirror responded {}", response.status())),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(()) => {
                    monitor.record_mirror(MirrorResult::Succeeded);
                    metrics::record_mirror(&route, MirrorResult::Succeeded);
                }
                Err(error) => {
                    tracing::debug!(route = %route, error = %error, "Mirror request failed");
                    reporter.send(serde_json::json!({ "mirror": true, "error": error }));
                    monitor.record_mirror(MirrorResult::Failed);
                    metrics::record_mirror(&route, MirrorResult::Failed);
                }
            }
        });
    }

    fn fail(&self, error: String) {
        tracing::debug!(route = %self.route, error = %error, "Mirror request failed");
        self.reporter.send(serde_json::json!({ "mirror": true, "error": error }));
        self.finish(MirrorResult::Failed);
    }

    fn finish(&self, result: MirrorResult) {
        self.monitor.record_mirror(result);
        metrics::record_mirror(&self.route, result);
    }
}
