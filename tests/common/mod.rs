//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shard_dispatcher::config::{RouteConfig, ShardConfig};
use shard_dispatcher::{Dispatcher, DispatcherConfig, Endpoint, Shutdown};

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Received {
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub received: Arc<Mutex<Vec<Received>>>,
}

impl MockBackend {
    pub fn hits(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

/// Serve `app` on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Backend answering every request with `status` and a JSON echo naming `index`.
pub async fn start_backend(index: usize, status: StatusCode) -> MockBackend {
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    let app = Router::new().fallback(move |headers: HeaderMap, body: Bytes| {
        let log = log.clone();
        async move {
            let echo = json!({
                "backend": index,
                "x_shard_index": headers.get("x-shard-index").and_then(|v| v.to_str().ok()),
                "body": String::from_utf8_lossy(&body),
            });
            log.lock().unwrap().push(Received { headers, body });
            (status, Json(echo))
        }
    });
    MockBackend {
        addr: serve(app).await,
        received,
    }
}

/// Backend that waits `delay` before answering 200 with an empty JSON object.
pub async fn start_slow_backend(delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        Json(json!({}))
    });
    serve(app).await
}

pub async fn start_shards(count: usize) -> Vec<MockBackend> {
    let mut backends = Vec::with_capacity(count);
    for index in 0..count {
        backends.push(start_backend(index, StatusCode::OK).await);
    }
    backends
}

/// Collects JSON bodies POSTed by the HTTP sinks.
pub async fn start_collector() -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().fallback(move |Json(value): Json<Value>| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(value);
        }
    });
    (serve(app).await, rx)
}

/// Address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn orders_route() -> RouteConfig {
    RouteConfig {
        name: "orders".into(),
        pattern: "/orders".into(),
        kind: "content-field".into(),
        sharder: json!({ "field": "customer_id" }),
    }
}

pub fn config(backends: &[MockBackend]) -> DispatcherConfig {
    let mut config = DispatcherConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    // Tests snapshot by hand; keep the flush loop out of the way.
    config.monitor.interval_secs = 3600;
    config.shards = backends
        .iter()
        .map(|b| ShardConfig {
            address: b.addr.to_string(),
        })
        .collect();
    config.routes.push(orders_route());
    config
}

pub struct RunningDispatcher {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub endpoints: Vec<Arc<Endpoint>>,
    pub handle: JoinHandle<()>,
}

impl RunningDispatcher {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn endpoint(&self, name: &str) -> &Arc<Endpoint> {
        self.endpoints.iter().find(|e| e.name() == name).unwrap()
    }
}

pub async fn start_dispatcher(dispatcher: Dispatcher) -> RunningDispatcher {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let endpoints = dispatcher.endpoints().to_vec();

    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        dispatcher.run(listener, &signal).await.unwrap();
    });

    RunningDispatcher {
        addr,
        shutdown,
        endpoints,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
