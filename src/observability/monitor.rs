//! Per-route outcome aggregation and periodic summaries.
//!
//! # Responsibilities
//! - Count request outcomes per shard on the hot path
//! - Aggregate latency in constant memory
//! - Snapshot-and-reset at each interval boundary, deliver the summary
//!
//! # Design Decisions
//! - Every counter is its own atomic cell: one `fetch_add` to record,
//!   one `swap` to reset, so each increment lands in exactly one interval
//! - `total` is computed from the swapped cells, never counted separately
//! - Latency keeps count/sum/min/max; percentiles are left to Prometheus.
//!   The four latency cells are reset one after another, so a sample landing
//!   mid-snapshot can be split across two intervals. `latency.count` stays
//!   exact; min and mean are approximate at the boundary

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::MonitorConfig;
use crate::observability::delivery::{Delivery, DeliveryStats};
use crate::observability::now_millis;
use crate::observability::sinks::{FnSink, Sink, SinkError};
use crate::sharding::ShardIndex;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Forwarded and answered below 500.
    Success,
    /// Backend unreachable, timed out or answered 5xx.
    BackendError,
    /// Refused before forwarding (bad body, too large).
    Rejected,
    /// Handler panicked.
    Panic,
}

impl Outcome {
    const COUNT: usize = 4;

    fn slot(self) -> usize {
        match self {
            Outcome::Success => 0,
            Outcome::BackendError => 1,
            Outcome::Rejected => 2,
            Outcome::Panic => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::BackendError => "backend_error",
            Outcome::Rejected => "rejected",
            Outcome::Panic => "panic",
        }
    }
}

/// Result of one mirror attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorResult {
    Succeeded,
    Failed,
    /// Not attempted because the in-flight limit was reached.
    Dropped,
}

impl MirrorResult {
    pub fn as_str(self) -> &'static str {
        match self {
            MirrorResult::Succeeded => "succeeded",
            MirrorResult::Failed => "failed",
            MirrorResult::Dropped => "dropped",
        }
    }
}

/// Counts for one shard over an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSummary {
    pub shard: usize,
    pub requests: u64,
    pub errors: u64,
}

/// Latency aggregate over an interval, in microseconds.
///
/// `mean_us` is kept within `[min_us, max_us]` even when a concurrent sample
/// straddles the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
}

/// Mirror attempts over an interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// One flush interval's worth of counters for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub route: String,
    /// Unix epoch milliseconds.
    pub interval_start_ms: u64,
    pub interval_end_ms: u64,
    pub total: u64,
    /// Every non-success outcome, rejections included.
    pub errors: u64,
    pub rejected: u64,
    pub shards: Vec<ShardSummary>,
    pub latency: Option<LatencySummary>,
    pub mirror: MirrorSummary,
    /// Report events dropped by a full reporter queue.
    pub dropped_reports: u64,
}

type Cells = [AtomicU64; Outcome::COUNT];

fn new_cells() -> Cells {
    std::array::from_fn(|_| AtomicU64::new(0))
}

fn take_cells(cells: &Cells) -> [u64; Outcome::COUNT] {
    std::array::from_fn(|i| cells[i].swap(0, Ordering::AcqRel))
}

struct Accumulator {
    interval_start_ms: AtomicU64,
    shards: Vec<Cells>,
    /// Outcomes recorded before a shard was known.
    unsharded: Cells,
    latency_count: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
    mirror: [AtomicU64; 3],
}

impl Accumulator {
    fn new(shards: usize) -> Self {
        Self {
            interval_start_ms: AtomicU64::new(now_millis()),
            shards: (0..shards).map(|_| new_cells()).collect(),
            unsharded: new_cells(),
            latency_count: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
            mirror: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// Aggregates outcomes for one route and publishes periodic summaries.
pub struct Monitor {
    route: Arc<str>,
    interval: Duration,
    acc: Accumulator,
    report_drops: Option<Arc<AtomicU64>>,
    delivery: Delivery<MetricSummary>,
}

impl Monitor {
    /// Create a monitor for a route over `shards` shards.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(route: Arc<str>, shards: usize, config: &MonitorConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            acc: Accumulator::new(shards),
            report_drops: None,
            delivery: Delivery::new("monitor", route.clone(), config.queue_capacity, config.workers),
            route,
        }
    }

    /// Include (and reset) the given drop counter in each summary.
    pub fn with_report_drops(mut self, counter: Arc<AtomicU64>) -> Self {
        self.report_drops = Some(counter);
        self
    }

    /// Register an async function as the summary sink.
    pub fn report_func<F, Fut>(&self, f: F)
    where
        F: Fn(MetricSummary) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), SinkError>> + Send + 'static,
    {
        self.delivery.set_sink(FnSink::new(f));
    }

    /// Register a summary sink.
    pub fn set_sink(&self, sink: impl Sink<MetricSummary>) {
        self.delivery.set_sink(sink);
    }

    /// Record one request outcome.
    pub fn record(&self, shard: Option<ShardIndex>, outcome: Outcome, latency: Option<Duration>) {
        let cells = shard
            .and_then(|s| self.acc.shards.get(s.get()))
            .unwrap_or(&self.acc.unsharded);
        cells[outcome.slot()].fetch_add(1, Ordering::AcqRel);

        if let Some(latency) = latency {
            let us = latency.as_micros().min(u64::MAX as u128) as u64;
            self.acc.latency_count.fetch_add(1, Ordering::AcqRel);
            self.acc.latency_sum_us.fetch_add(us, Ordering::AcqRel);
            self.acc.latency_min_us.fetch_min(us, Ordering::AcqRel);
            self.acc.latency_max_us.fetch_max(us, Ordering::AcqRel);
        }
    }

    /// Record one mirror attempt. Never touches the primary outcome counters.
    pub fn record_mirror(&self, result: MirrorResult) {
        let slot = match result {
            MirrorResult::Succeeded => 0,
            MirrorResult::Failed => 1,
            MirrorResult::Dropped => 2,
        };
        self.acc.mirror[slot].fetch_add(1, Ordering::AcqRel);
    }

    /// Atomically take the counters accumulated since the previous snapshot.
    pub fn snapshot(&self) -> MetricSummary {
        let end = now_millis();
        let start = self.acc.interval_start_ms.swap(end, Ordering::AcqRel);

        let mut total = 0;
        let mut successes = 0;
        let mut rejected = 0;
        let mut shards = Vec::with_capacity(self.acc.shards.len());
        for (shard, cells) in self.acc.shards.iter().enumerate() {
            let counts = take_cells(cells);
            let requests: u64 = counts.iter().sum();
            let ok = counts[Outcome::Success.slot()];
            total += requests;
            successes += ok;
            rejected += counts[Outcome::Rejected.slot()];
            shards.push(ShardSummary {
                shard,
                requests,
                errors: requests - ok,
            });
        }

        let unsharded = take_cells(&self.acc.unsharded);
        total += unsharded.iter().sum::<u64>();
        successes += unsharded[Outcome::Success.slot()];
        rejected += unsharded[Outcome::Rejected.slot()];

        let count = self.acc.latency_count.swap(0, Ordering::AcqRel);
        let sum = self.acc.latency_sum_us.swap(0, Ordering::AcqRel);
        let min = self.acc.latency_min_us.swap(u64::MAX, Ordering::AcqRel);
        let max = self.acc.latency_max_us.swap(0, Ordering::AcqRel);
        let latency = (count > 0).then(|| {
            let min_us = min.min(max);
            LatencySummary {
                count,
                min_us,
                max_us: max,
                mean_us: (sum / count).clamp(min_us, max),
            }
        });

        let [succeeded, failed, dropped] = take_cells_3(&self.acc.mirror);

        MetricSummary {
            route: self.route.to_string(),
            interval_start_ms: start,
            interval_end_ms: end,
            total,
            errors: total - successes,
            rejected,
            shards,
            latency,
            mirror: MirrorSummary {
                succeeded,
                failed,
                dropped,
            },
            dropped_reports: self
                .report_drops
                .as_ref()
                .map(|c| c.swap(0, Ordering::AcqRel))
                .unwrap_or(0),
        }
    }

    /// Snapshot and hand the summary to the sink. Returns false if it was dropped.
    pub fn flush(&self) -> bool {
        let summary = self.snapshot();
        tracing::debug!(
            route = %self.route,
            total = summary.total,
            errors = summary.errors,
            "Flushing metric summary"
        );
        self.delivery.submit(summary)
    }

    /// Flush every interval until `shutdown` fires, then flush once more.
    ///
    /// The final flush only sees what was recorded before the signal, so the
    /// caller fires it after in-flight requests have finished.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            route = %self.route,
            interval_secs = self.interval.as_secs(),
            "Monitor starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush();
                }
                _ = shutdown.recv() => {
                    self.flush();
                    tracing::info!(route = %self.route, "Monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn stats(&self) -> &DeliveryStats {
        self.delivery.stats()
    }

    /// Wait, up to `timeout`, for queued summaries to reach the sink.
    pub async fn close(&self, timeout: Duration) -> bool {
        self.delivery.close(timeout).await
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn take_cells_3(cells: &[AtomicU64; 3]) -> [u64; 3] {
    std::array::from_fn(|i| cells[i].swap(0, Ordering::AcqRel))
}
