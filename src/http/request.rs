//! Request identification.
//!
//! # Responsibilities
//! - Name the correlation header
//! - Read the request ID assigned by `SetRequestIdLayer`
//!
//! # Design Decisions
//! - Request ID is added by the outermost layer, before tracing and routing
//! - A client-supplied ID is kept, not replaced

use axum::http::{HeaderMap, HeaderName};

/// Correlation header set on every request and echoed on every response.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request's ID, if it carries a valid one.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}
