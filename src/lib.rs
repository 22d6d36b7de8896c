//! Sharded HTTP request dispatcher.
//!
//! Requests arriving on a route's URL pattern are keyed by a field of
//! their JSON body, resolved to one of N shard backends and forwarded
//! there. Failures are reported and outcomes summarised off the request
//! path; every sharded request can be mirrored to a secondary target.

pub mod cli;
pub mod config;
pub mod endpoint;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod sharding;

pub use config::schema::DispatcherConfig;
pub use endpoint::Endpoint;
pub use http::Dispatcher;
pub use lifecycle::Shutdown;
