//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint
//!     → reporter.rs (diagnostic events) ─┐
//!     → monitor.rs (interval summaries) ─┴→ delivery.rs (bounded queue) → sinks.rs
//!     → metrics.rs (Prometheus counters, histograms)
//!
//! Process-wide:
//!     → logging.rs (tracing subscriber)
//! ```
//!
//! # Design Decisions
//! - Nothing here blocks the request path: queues are bounded and drop on overflow
//! - Sinks are swappable at runtime; the default discards everything

pub mod delivery;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod reporter;
pub mod sinks;

use std::time::{SystemTime, UNIX_EPOCH};

pub use monitor::{MetricSummary, MirrorResult, Monitor, Outcome};
pub use reporter::{ReportEvent, Reporter};
pub use sinks::{FnSink, HttpPostSink, NoopSink, Sink, SinkError};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
