//! Cache trait for memoized price tables.
//!
//! This module defines the [`DataCache`] trait, a get/put store of
//! [`PriceTable`]s addressed by [`CacheKey`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::time::Duration;

use crate::{error::Result, table::PriceTable, types::Symbol};

/// Function identity of the adjusted close fetch.
pub const ADJUSTED_CLOSE_FUNCTION: &str = "adjusted_close";

/// Structural identity of a memoized request.
///
/// Two keys with equal fields address the same entry in every cache backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The memoized operation.
    pub function: String,
    /// Name of the provider that produced the data.
    pub provider: String,
    /// Requested symbol.
    pub symbol: Symbol,
    /// First day of the requested range.
    pub start: NaiveDate,
    /// End of the requested range (exclusive).
    pub end: NaiveDate,
}

impl CacheKey {
    /// Creates a key for the given request.
    #[must_use]
    pub fn new(
        function: impl Into<String>,
        provider: impl Into<String>,
        symbol: Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            function: function.into(),
            provider: provider.into(),
            symbol,
            start,
            end,
        }
    }

    /// Hex-encoded SHA-256 of the key fields.
    ///
    /// Stable across processes and platforms; used to name on-disk entries.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.function.as_str(),
            self.provider.as_str(),
            self.symbol.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.start.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.end.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A table read back from a cache, with the time it was stored.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedTable {
    /// The stored table.
    pub table: PriceTable,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CachedTable {
    /// Wraps a table stored now.
    #[must_use]
    pub fn new(table: PriceTable) -> Self {
        Self {
            table,
            cached_at: Utc::now(),
        }
    }

    /// Returns true if the entry is older than `ttl`.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age > TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
    }
}

/// Trait for memoizing fetched price tables.
///
/// Implementations can store data in various backends (files, memory, etc.)
/// to avoid repeated API calls. Entries are never expired implicitly.
#[async_trait]
pub trait DataCache: Send + Sync + Debug {
    /// Retrieves the table stored under `key`.
    ///
    /// Returns `Ok(Some(entry))` on a hit, `Ok(None)` on a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedTable>>;

    /// Stores a table under `key`, replacing any previous entry.
    async fn put(&self, key: &CacheKey, table: &PriceTable) -> Result<()>;

    /// Removes cache entries older than the specified TTL.
    ///
    /// Returns the number of entries invalidated.
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}
