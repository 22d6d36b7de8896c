//! Sink implementations for reports and metric summaries.
//!
//! # Responsibilities
//! - Define the asynchronous `Sink` capability
//! - Null-object sink used until one is registered
//! - Closure sink for programmatic registration
//! - HTTP sink posting JSON to a configured URL
//!
//! # Design Decisions
//! - Sinks return a boxed future so workers can await slow destinations
//!   without blocking a runtime thread
//! - Failures are returned, never retried; the delivery queue logs and drops them

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Failure delivering one item to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize payload: {0}")]
    Serialize(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("destination rejected payload with status {0}")]
    Rejected(u16),
}

/// Asynchronous destination for reported values.
pub trait Sink<T>: Send + Sync + 'static {
    fn deliver(&self, item: T) -> BoxFuture<'static, Result<(), SinkError>>;
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl<T: Send + 'static> Sink<T> for NoopSink {
    fn deliver(&self, _item: T) -> BoxFuture<'static, Result<(), SinkError>> {
        future::ready(Ok(())).boxed()
    }
}

/// Adapts an async closure into a sink.
pub struct FnSink<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

impl<F, T> FnSink<F, T> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<F, Fut, T> Sink<T> for FnSink<F, T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
    T: Send + 'static,
{
    fn deliver(&self, item: T) -> BoxFuture<'static, Result<(), SinkError>> {
        (self.f)(item).boxed()
    }
}

/// Posts each item as `application/json` to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpPostSink {
    client: reqwest::Client,
    url: Url,
}

impl HttpPostSink {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl<T: Serialize + Send + 'static> Sink<T> for HttpPostSink {
    fn deliver(&self, item: T) -> BoxFuture<'static, Result<(), SinkError>> {
        let body = match serde_json::to_vec(&item) {
            Ok(body) => body,
            Err(e) => return future::ready(Err(SinkError::Serialize(e.to_string()))).boxed(),
        };
        let request = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        async move {
            let response = request
                .send()
                .await
                .map_err(|e| SinkError::Delivery(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(SinkError::Rejected(status.as_u16()))
            }
        }
        .boxed()
    }
}
