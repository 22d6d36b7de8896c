//! Sharding subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered request body (bytes)
//!     → Sharder::derive_key (e.g. content_field.rs extracts a JSON field)
//!     → ShardKey (canonical bytes)
//!     → table.rs Table::resolve
//!     → ShardIndex in 0..shards
//!
//! Sharder construction (at startup):
//!     RouteConfig { kind, sharder blob }
//!     → registry.rs looks up the constructor for `kind`
//!     → constructor decodes the blob into its typed settings
//! ```
//!
//! # Design Decisions
//! - Sharders borrow the body; it stays available for forwarding and mirroring
//! - Key derivation and resolution are pure and CPU-only
//! - Resolution is stable across restarts (partition affinity)

pub mod content_field;
pub mod registry;
pub mod table;

use std::fmt;

use thiserror::Error;

pub use content_field::ContentFieldSharder;
pub use registry::SharderRegistry;
pub use table::Table;

/// Opaque routing key derived from a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey(Vec<u8>);

impl ShardKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ShardKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Index of a shard, always below the table's shard count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardIndex(usize);

impl ShardIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ShardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key extraction failures. These are the client's fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    /// The configured field is absent (or null) in the body.
    #[error("missing field '{0}'")]
    MissingField(String),

    /// The body is not a structured object.
    #[error("unparseable body: {0}")]
    ParseError(String),
}

/// Strategy deriving a shard key from a request body.
pub trait Sharder: Send + Sync + fmt::Debug {
    /// Derive the shard key. The body is only borrowed.
    fn derive_key(&self, body: &[u8]) -> Result<ShardKey, ShardError>;

    /// Derive the key and resolve it against `table`.
    fn shard(&self, body: &[u8], table: &Table) -> Result<(ShardKey, ShardIndex), ShardError> {
        let key = self.derive_key(body)?;
        let index = table.resolve(&key);
        Ok((key, index))
    }
}
