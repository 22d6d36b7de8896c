//! Bounded, non-blocking delivery to a registered sink.
//!
//! # Responsibilities
//! - Accept items from the request path without waiting
//! - Run a fixed pool of workers that invoke the current sink
//! - Swap the registered sink atomically
//!
//! # Design Decisions
//! - Overflow policy is drop-newest: a full queue rejects the incoming item
//!   and bumps a drop counter
//! - Each item is handed to the sink at most once; failures are logged, not retried
//! - `close` stops intake and waits, bounded, for the workers to drain the queue;
//!   workers of a dropped `Delivery` drain and exit on their own

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::future::join_all;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::observability::sinks::{NoopSink, Sink};

type SharedSink<T> = Arc<ArcSwap<Box<dyn Sink<T>>>>;

/// Bounded queue plus worker pool feeding one sink.
pub struct Delivery<T> {
    /// What is being delivered ("reporter", "monitor"), for logs and metrics.
    kind: &'static str,
    route: Arc<str>,
    /// `None` once closed.
    tx: ArcSwapOption<mpsc::Sender<T>>,
    sink: SharedSink<T>,
    stats: Arc<DeliveryStats>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Counters describing what happened to submitted items.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Items dropped because the queue was full, since the last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Send + 'static> Delivery<T> {
    /// Create the queue and spawn `workers` workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(kind: &'static str, route: Arc<str>, capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let noop: Box<dyn Sink<T>> = Box::new(NoopSink);
        let sink: SharedSink<T> = Arc::new(ArcSwap::from_pointee(noop));
        let stats = Arc::new(DeliveryStats::default());

        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(workers.max(1));
        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let sink = sink.clone();
            let stats = stats.clone();
            let route = route.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    let Some(item) = item else { break };

                    let current = sink.load_full();
                    match current.deliver(item).await {
                        Ok(()) => {
                            stats.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(route = %route, sink = kind, worker, error = %e, "Sink delivery failed");
                        }
                    }
                }
                tracing::trace!(route = %route, sink = kind, worker, "Delivery worker stopped");
            }));
        }

        Self {
            kind,
            route,
            tx: ArcSwapOption::from_pointee(tx),
            sink,
            stats,
            workers: std::sync::Mutex::new(handles),
        }
    }

    /// Replace the registered sink. Items already picked up by a worker
    /// finish on the previous sink.
    pub fn set_sink(&self, sink: impl Sink<T>) {
        let sink: Box<dyn Sink<T>> = Box::new(sink);
        self.sink.store(Arc::new(sink));
    }

    /// Queue an item without waiting. Returns false if it was dropped.
    pub fn submit(&self, item: T) -> bool {
        let sent = match self.tx.load().as_deref() {
            Some(tx) => tx.try_send(item),
            None => Err(TrySendError::Closed(item)),
        };
        match sent {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_sink_dropped(&self.route, self.kind);
                if dropped == 1 || dropped % 1000 == 0 {
                    tracing::warn!(route = %self.route, sink = self.kind, dropped, "Sink queue full, dropping newest");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_sink_dropped(&self.route, self.kind);
                tracing::debug!(route = %self.route, sink = self.kind, "Delivery closed, dropping item");
                false
            }
        }
    }

    /// Stop accepting items, then wait up to `timeout` for the workers to
    /// hand everything already queued to the sink.
    ///
    /// Returns false if the workers were still busy when the timeout expired;
    /// they keep running detached. Closing twice is a no-op.
    pub async fn close(&self, timeout: Duration) -> bool {
        // Dropping the only sender lets the workers drain and see `None`.
        self.tx.store(None);
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        if workers.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout(timeout, join_all(workers)).await.is_ok();
        if drained {
            tracing::debug!(route = %self.route, sink = self.kind, "Delivery drained");
        } else {
            tracing::warn!(
                route = %self.route,
                sink = self.kind,
                timeout_ms = timeout.as_millis() as u64,
                "Delivery did not drain before timeout"
            );
        }
        drained
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Shared handle to the drop counter, so another component can read and reset it.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.stats.dropped.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::sinks::FnSink;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_delivers_to_registered_sink() {
        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 8, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        delivery.set_sink(FnSink::new(move |n: u32| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(n);
                Ok(())
            }
        }));

        assert!(delivery.submit(1));
        assert!(delivery.submit(2));

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_default_sink_drops_silently() {
        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 8, 1);
        assert!(delivery.submit(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(delivery.stats().delivered(), 1);
        assert_eq!(delivery.stats().failed(), 0);
    }

    #[tokio::test]
    async fn test_blocked_sink_drops_newest_without_blocking() {
        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 4, 1);
        delivery.set_sink(FnSink::new(|_: u32| futures_util::future::pending()));

        let start = Instant::now();
        let accepted = (0..10_000).filter(|n| delivery.submit(*n)).count();
        assert!(start.elapsed() < Duration::from_secs(1));

        // One item held by the stuck worker, at most `capacity` queued.
        assert!(accepted <= 5, "accepted {}", accepted);
        assert_eq!(delivery.stats().dropped(), (10_000 - accepted) as u64);
    }

    #[tokio::test]
    async fn test_close_waits_for_queued_items() {
        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 8, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        delivery.set_sink(FnSink::new(move |n: u32| {
            let tx = tx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = tx.send(n);
                Ok(())
            }
        }));

        for n in 0..3 {
            assert!(delivery.submit(n));
        }
        assert!(delivery.close(Duration::from_secs(5)).await);

        // Everything queued before close was delivered by the time it returned.
        let got: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(got, vec![0, 1, 2]);
        assert_eq!(delivery.stats().delivered(), 3);

        assert!(!delivery.submit(9));
        assert_eq!(delivery.stats().dropped(), 1);
        assert!(delivery.close(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_close_gives_up_on_stuck_sink() {
        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 8, 1);
        delivery.set_sink(FnSink::new(|_: u32| futures_util::future::pending()));
        assert!(delivery.submit(1));

        let start = Instant::now();
        assert!(!delivery.close(Duration::from_millis(100)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sink_failures_are_counted() {
        use crate::observability::sinks::SinkError;

        let delivery: Delivery<u32> = Delivery::new("test", "orders".into(), 8, 2);
        delivery.set_sink(FnSink::new(|_: u32| async {
            Err(SinkError::Delivery("unreachable".into()))
        }));

        for n in 0..3 {
            delivery.submit(n);
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while delivery.stats().failed() < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivery.stats().failed(), 3);
        assert_eq!(delivery.stats().delivered(), 0);
    }
}
