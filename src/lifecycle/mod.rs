//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → Load config → Apply overrides → Build dispatcher → Bind
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM → Trigger → Stop accepting → Drain → Final monitor flush
//!         → Deliver queued reports and summaries → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
