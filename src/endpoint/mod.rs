//! Per-route request handling.
//!
//! # Data Flow
//! ```text
//! Request
//!     → handler.rs (buffer body, derive key, resolve shard)
//!     → mirror.rs (detached copy to the mirror target, if configured)
//!     → forward.rs (rewrite, send to shard backend, relay response)
//!     → Monitor counters, Reporter events, Prometheus metrics
//! ```
//!
//! # Design Decisions
//! - The body is buffered once and shared as `Bytes` by extraction,
//!   forwarding and mirroring
//! - Panics are caught at the handler boundary and become 500s

pub mod forward;
pub mod handler;
pub mod mirror;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::observability::Outcome;
use crate::sharding::ShardError;

pub use handler::Endpoint;
pub use mirror::Mirror;

/// Per-request failure, surfaced to the client as an HTTP status.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend did not respond within {0:?}")]
    BackendTimeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Shard(_) | RequestError::BodyRead(_) => StatusCode::BAD_REQUEST,
            RequestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            RequestError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// How this failure is counted.
    pub fn outcome(&self) -> Outcome {
        match self {
            RequestError::Shard(_)
            | RequestError::PayloadTooLarge { .. }
            | RequestError::BodyRead(_) => Outcome::Rejected,
            RequestError::BackendUnavailable(_) | RequestError::BackendTimeout(_) => {
                Outcome::BackendError
            }
            RequestError::Internal(_) => Outcome::Panic,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
