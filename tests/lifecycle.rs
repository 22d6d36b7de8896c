//! Startup failures, panic recovery, HTTP sinks and shutdown flush.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

use shard_dispatcher::config::{ConfigError, RouteConfig, ShardConfig};
use shard_dispatcher::sharding::{ShardError, ShardKey, Sharder, SharderRegistry};
use shard_dispatcher::Dispatcher;

mod common;

#[derive(Debug)]
struct Exploding;

impl Sharder for Exploding {
    fn derive_key(&self, body: &[u8]) -> Result<ShardKey, ShardError> {
        if body == b"explode" {
            panic!("sharder exploded");
        }
        Ok(ShardKey::new(body.to_vec()))
    }
}

fn exploding(_: &Value) -> Result<Arc<dyn Sharder>, String> {
    Ok(Arc::new(Exploding))
}

#[tokio::test]
async fn test_unknown_kind_fails_at_startup() {
    let shards = common::start_shards(1).await;
    let mut config = common::config(&shards);
    config.routes[0].kind = "header".into();

    let err = Dispatcher::new(config).err().unwrap();
    assert!(matches!(err, ConfigError::UnknownSharderKind { ref kind, .. } if kind == "header"));
}

#[tokio::test]
async fn test_panic_is_recovered_and_server_keeps_serving() {
    let shards = common::start_shards(2).await;
    let mut config = common::config(&shards);
    config.routes.push(RouteConfig {
        name: "fragile".into(),
        pattern: "/fragile".into(),
        kind: "exploding".into(),
        sharder: Value::Null,
    });
    let mut registry = SharderRegistry::default();
    registry.register("exploding", exploding);

    let running = common::start_dispatcher(Dispatcher::with_registry(config, &registry).unwrap()).await;
    let client = common::client();

    let response = client.post(running.url("/fragile")).body("explode").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = client.post(running.url("/fragile")).body("fine").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(running.url("/orders"))
        .body(r#"{"customer_id":"abc"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary = running.endpoint("fragile").monitor().snapshot();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.errors, 1);
}

#[tokio::test]
async fn test_reports_are_posted_to_report_url() {
    let shards = common::start_shards(1).await;
    let (collector, mut posted) = common::start_collector().await;
    let mut config = common::config(&shards);
    config.reporter.url = Some(format!("http://{}/reports", collector));
    let running = common::start_dispatcher(Dispatcher::new(config).unwrap()).await;

    let response = common::client()
        .post(running.url("/orders"))
        .body(r#"{"order_id":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let report = tokio::time::timeout(Duration::from_secs(5), posted.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report["route"], "orders");
    assert_eq!(report["value"]["status"], 400);
    assert!(report["timestamp_ms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_shutdown_flushes_final_summary() {
    let shards = common::start_shards(2).await;
    let (collector, mut posted) = common::start_collector().await;
    let mut config = common::config(&shards);
    config.monitor.url = Some(format!("http://{}/metrics", collector));
    let running = common::start_dispatcher(Dispatcher::new(config).unwrap()).await;
    let client = common::client();

    for _ in 0..3 {
        client
            .post(running.url("/orders"))
            .body(r#"{"customer_id":"abc"}"#)
            .send()
            .await
            .unwrap();
    }
    client.post(running.url("/orders")).body("{}").send().await.unwrap();

    running.shutdown.trigger();
    running.handle.await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), posted.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary["route"], "orders");
    assert_eq!(summary["total"], 4);
    assert_eq!(summary["errors"], 1);
    assert_eq!(summary["rejected"], 1);
    assert_eq!(summary["shards"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_requests_finishing_during_drain_are_in_final_summary() {
    let slow = common::start_slow_backend(Duration::from_millis(500)).await;
    let (collector, mut posted) = common::start_collector().await;
    let mut config = common::config(&[]);
    config.shards.push(ShardConfig {
        address: slow.to_string(),
    });
    config.monitor.url = Some(format!("http://{}/metrics", collector));
    let running = common::start_dispatcher(Dispatcher::new(config).unwrap()).await;

    let url = running.url("/orders");
    let in_flight = tokio::spawn(async move {
        common::client()
            .post(url)
            .body(r#"{"customer_id":"abc"}"#)
            .send()
            .await
            .unwrap()
            .status()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    running.shutdown.trigger();
    assert_eq!(in_flight.await.unwrap(), StatusCode::OK);
    running.handle.await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), posted.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["errors"], 0);
    assert_eq!(summary["shards"][0]["requests"], 1);
}

/// The binary returns from `main` right after `run`, dropping its runtime.
/// The final summary must already be with the collector by then.
#[test]
fn test_final_summary_delivered_before_run_returns() {
    let backend_runtime = tokio::runtime::Runtime::new().unwrap();
    let (collector, mut posted) = backend_runtime.block_on(common::start_collector());
    let shards = backend_runtime.block_on(common::start_shards(1));

    let mut config = common::config(&shards);
    config.monitor.url = Some(format!("http://{}/metrics", collector));

    let dispatcher_runtime = tokio::runtime::Runtime::new().unwrap();
    dispatcher_runtime.block_on(async move {
        let running = common::start_dispatcher(Dispatcher::new(config).unwrap()).await;
        let response = common::client()
            .post(running.url("/orders"))
            .body(r#"{"customer_id":"abc"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        running.shutdown.trigger();
        running.handle.await.unwrap();
    });
    drop(dispatcher_runtime);

    let summary = backend_runtime
        .block_on(async { tokio::time::timeout(Duration::from_secs(5), posted.recv()).await })
        .unwrap()
        .unwrap();
    assert_eq!(summary["route"], "orders");
    assert_eq!(summary["total"], 1);
}
