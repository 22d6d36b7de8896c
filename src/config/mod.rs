//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)          routes file (JSON, optional)
//!     → loader.rs (parse & deserialize)
//!     → command line overrides (cli.rs)
//!     → validation.rs (semantic checks)
//!     → DispatcherConfig (validated, immutable)
//!     → consumed once by the dispatcher to build endpoints
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Sharder settings stay an opaque JSON blob until the sharder registry decodes them

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::DispatcherConfig;
pub use schema::ListenerConfig;
pub use schema::MirrorConfig;
pub use schema::MonitorConfig;
pub use schema::ObservabilityConfig;
pub use schema::ReporterConfig;
pub use schema::RouteConfig;
pub use schema::ShardConfig;
pub use schema::TimeoutConfig;
