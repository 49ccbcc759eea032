//! In-memory cache implementation.

use async_trait::async_trait;
use prices_core::{CacheKey, CachedTable, DataCache, PriceTable, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Simple in-memory cache for testing and development.
///
/// Data is stored in an `RwLock`-protected `HashMap` and is lost when the cache
/// is dropped. Tables are cloned on get/put operations.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, CachedTable>>,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DataCache for InMemoryCache {
    #[instrument(skip(self), fields(symbol = %key.symbol, start = %key.start, end = %key.end))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedTable>> {
        let cache = self.entries.read().await;
        match cache.get(key) {
            Some(entry) => {
                debug!("Cache hit for prices");
                Ok(Some(entry.clone()))
            }
            None => {
                debug!("Cache miss for prices");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, table), fields(symbol = %key.symbol, rows = table.len()))]
    async fn put(&self, key: &CacheKey, table: &PriceTable) -> Result<()> {
        let mut cache = self.entries.write().await;
        cache.insert(key.clone(), CachedTable::new(table.clone()));
        debug!("Cached {} price rows", table.len());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let mut cache = self.entries.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(ttl));
        let removed = before - cache.len();

        if removed > 0 {
            debug!("Invalidated {} stale cache entries", removed);
        }

        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}
