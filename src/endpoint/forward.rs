//! Forwarding to shard backends.
//!
//! # Responsibilities
//! - Rewrite the request URI onto a backend base URL, keeping path and query
//! - Strip hop-by-hop headers in both directions
//! - Bound the wait for the backend's response head
//!
//! The response body is streamed back unbuffered.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::endpoint::RequestError;
use crate::sharding::ShardIndex;

/// Client used for backend and mirror traffic.
pub type BackendClient = Client<HttpConnector, Body>;

/// Header carrying the resolved shard on forwarded requests.
pub const X_SHARD_INDEX: &str = "x-shard-index";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn client() -> BackendClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Join a backend base URL with the original path and query.
///
/// A base path is kept as a prefix: `http://b:9000/api` + `/orders?x=1`
/// gives `http://b:9000/api/orders?x=1`.
pub fn target_uri(base: &Url, original: &Uri) -> Result<Uri, RequestError> {
    let host = base
        .host_str()
        .ok_or_else(|| RequestError::Internal(format!("backend URL '{}' has no host", base)))?;
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let prefix = base.path().trim_end_matches('/');
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{}://{}{}{}", base.scheme(), authority, prefix, path_and_query)
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| RequestError::Internal(e.to_string()))
}

/// Build the outgoing copy of a buffered request.
pub fn build_request(
    parts: &Parts,
    body: Bytes,
    base: &Url,
    shard: Option<ShardIndex>,
) -> Result<Request<Body>, RequestError> {
    let uri = target_uri(base, &parts.uri)?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    // Derived from the new URI and body by the client.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if let Some(shard) = shard {
        headers.insert(X_SHARD_INDEX, HeaderValue::from(shard.get()));
    }

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .body(Body::from(body))
        .map_err(|e| RequestError::Internal(e.to_string()))?;
    *request.headers_mut() = headers;
    Ok(request)
}

/// Send a request, waiting at most `timeout` for the response head.
pub async fn send(
    client: &BackendClient,
    request: Request<Body>,
    timeout: Duration,
) -> Result<Response<Incoming>, RequestError> {
    match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(RequestError::BackendUnavailable(e.to_string())),
        Err(_) => Err(RequestError::BackendTimeout(timeout)),
    }
}

/// Convert a backend response into a client response, status and body unchanged.
pub fn relay(response: Response<Incoming>) -> axum::response::Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
