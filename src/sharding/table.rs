//! Key-to-shard resolution.
//!
//! Uses CRC-32 (IEEE) for a hash that is identical on every platform,
//! build and toolchain, then maps it into range with a multiply-shift
//! instead of a modulo.

use crate::config::ConfigError;
use crate::sharding::{ShardIndex, ShardKey};

/// Resolves shard keys to shard indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    shards: usize,
}

impl Table {
    /// Creates a table over `shards` partitions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShardCount`] if `shards` is zero.
    pub fn new(shards: usize) -> Result<Self, ConfigError> {
        if shards == 0 {
            return Err(ConfigError::InvalidShardCount(shards));
        }
        Ok(Self { shards })
    }

    /// Resolves a key to its shard.
    ///
    /// # Returns
    ///
    /// An index in the range `0..shards`.
    ///
    /// # Determinism
    ///
    /// The same key always resolves to the same shard, across calls and restarts.
    #[inline]
    pub fn resolve(&self, key: &ShardKey) -> ShardIndex {
        let hash = crc32fast::hash(key.as_bytes()) as u64;
        ShardIndex::new(((hash * self.shards as u64) >> 32) as usize)
    }

    /// Returns the total number of shards.
    pub fn shards(&self) -> usize {
        self.shards
    }
}
