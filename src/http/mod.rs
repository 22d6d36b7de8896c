//! HTTP surface of the dispatcher.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, one mount per route pattern)
//!     → request.rs (request ID assigned and propagated)
//!     → endpoint (shard, forward, mirror, report)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use server::Dispatcher;
