//! Filesystem cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use polars::prelude::*;
use prices_core::{CacheKey, CachedTable, DataCache, DataError, PriceTable, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Table blob inside an entry directory.
const DATA_FILE: &str = "prices.parquet";

/// Entry metadata; written after the data file and required for a hit.
const METADATA_FILE: &str = "metadata.json";

/// Contents of `metadata.json`.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    key: CacheKey,
    cached_at: DateTime<Utc>,
    rows: usize,
}

/// Durable cache that stores each entry as files under a root directory.
///
/// Layout is `<root>/<function>/<key digest>/{prices.parquet, metadata.json}`.
/// The root is created on construction and again on every write, so removing
/// it between calls simply empties the cache. There is no locking: concurrent
/// writers of the same key race and the last one wins.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| DataError::Cache(e.to_string()))?;
        debug!(root = %root.display(), "File cache initialized");
        Ok(Self { root })
    }

    /// Returns the root directory of this cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the entry for `key`.
    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.function).join(key.digest())
    }

    fn read_entry(dir: &Path, key: &CacheKey) -> Result<Option<CachedTable>> {
        let metadata = match fs::read(dir.join(METADATA_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DataError::Cache(e.to_string())),
        };
        let metadata: EntryMetadata = serde_json::from_slice(&metadata)?;

        if metadata.key != *key {
            warn!(dir = %dir.display(), "Cache entry belongs to a different key, ignoring");
            return Ok(None);
        }

        let file = File::open(dir.join(DATA_FILE)).map_err(|e| DataError::Cache(e.to_string()))?;
        let frame = ParquetReader::new(file).finish()?;
        let table = PriceTable::from_dataframe(&frame)?;

        if table.len() != metadata.rows {
            return Err(DataError::Cache(format!(
                "Entry has {} rows, metadata says {}",
                table.len(),
                metadata.rows
            )));
        }

        Ok(Some(CachedTable {
            table,
            cached_at: metadata.cached_at,
        }))
    }

    fn write_entry(dir: &Path, key: &CacheKey, table: &PriceTable) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| DataError::Cache(e.to_string()))?;

        // Old metadata must not vouch for a half-written data file.
        match fs::remove_file(dir.join(METADATA_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DataError::Cache(e.to_string())),
        }

        let mut frame = table.to_dataframe()?;
        let file =
            File::create(dir.join(DATA_FILE)).map_err(|e| DataError::Cache(e.to_string()))?;
        ParquetWriter::new(file).finish(&mut frame)?;

        let metadata = EntryMetadata {
            key: key.clone(),
            cached_at: Utc::now(),
            rows: table.len(),
        };
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        Ok(())
    }

    /// All entry directories currently under the root.
    fn entry_dirs(root: &Path) -> Result<Vec<PathBuf>> {
        let functions = match fs::read_dir(root) {
            Ok(iter) => iter,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataError::Cache(e.to_string())),
        };

        let mut dirs = Vec::new();
        for function in functions {
            let function = function.map_err(|e| DataError::Cache(e.to_string()))?;
            if !function.path().is_dir() {
                continue;
            }
            let entries =
                fs::read_dir(function.path()).map_err(|e| DataError::Cache(e.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|e| DataError::Cache(e.to_string()))?;
                if entry.path().is_dir() {
                    dirs.push(entry.path());
                }
            }
        }
        Ok(dirs)
    }

    fn remove_stale(root: &Path, ttl: Duration) -> Result<usize> {
        let mut removed = 0usize;
        for dir in Self::entry_dirs(root)? {
            let cached_at = fs::read(dir.join(METADATA_FILE))
                .ok()
                .and_then(|bytes| serde_json::from_slice::<EntryMetadata>(&bytes).ok())
                .map(|m| m.cached_at);

            // Entries without readable metadata are never served, so they go too.
            let stale = cached_at.is_none_or(|cached_at| {
                Utc::now().signed_duration_since(cached_at)
                    > TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
            });

            if stale {
                fs::remove_dir_all(&dir).map_err(|e| DataError::Cache(e.to_string()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Runs blocking filesystem work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DataError::Cache(e.to_string()))?
}

#[async_trait]
impl DataCache for FileCache {
    #[instrument(skip(self), fields(symbol = %key.symbol, start = %key.start, end = %key.end))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedTable>> {
        let dir = self.entry_dir(key);
        let owned_key = key.clone();
        let entry = blocking(move || Self::read_entry(&dir, &owned_key)).await?;

        match &entry {
            Some(entry) => debug!(rows = entry.table.len(), "Cache hit for prices"),
            None => debug!("Cache miss for prices"),
        }
        Ok(entry)
    }

    #[instrument(skip(self, table), fields(symbol = %key.symbol, rows = table.len()))]
    async fn put(&self, key: &CacheKey, table: &PriceTable) -> Result<()> {
        let dir = self.entry_dir(key);
        let owned_key = key.clone();
        let table = table.clone();
        blocking(move || Self::write_entry(&dir, &owned_key, &table)).await?;

        debug!("Cached prices");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let root = self.root.clone();
        let removed = blocking(move || Self::remove_stale(&root, ttl)).await?;

        if removed > 0 {
            debug!("Invalidated {} stale cache entries", removed);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let root = self.root.clone();
        blocking(move || match fs::remove_dir_all(&root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DataError::Cache(e.to_string())),
        })
        .await?;

        debug!("Cleared all cache entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use prices_core::{ADJUSTED_CLOSE_FUNCTION, PricePoint, Symbol};

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("prices-cache-{}", uuid::Uuid::new_v4()))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key(symbol: &str) -> CacheKey {
        CacheKey::new(
            ADJUSTED_CLOSE_FUNCTION,
            "test",
            Symbol::new(symbol),
            day(2024, 1, 1),
            day(2024, 1, 6),
        )
    }

    fn table() -> PriceTable {
        PriceTable::from_points([
            PricePoint::new(day(2024, 1, 2), Some(185.64)),
            PricePoint::new(day(2024, 1, 3), None),
            PricePoint::new(day(2024, 1, 4), Some(181.91)),
        ])
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        assert!(root.is_dir());

        assert!(cache.get(&key("AAPL")).await.unwrap().is_none());

        cache.put(&key("AAPL"), &table()).await.unwrap();

        let hit = cache.get(&key("AAPL")).await.unwrap().unwrap();
        assert_eq!(hit.table, table());
        assert!(cache.get(&key("MSFT")).await.unwrap().is_none());

        let dir = root.join(ADJUSTED_CLOSE_FUNCTION).join(key("AAPL").digest());
        assert!(dir.join(DATA_FILE).is_file());
        assert!(dir.join(METADATA_FILE).is_file());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_survives_new_instance() {
        let root = temp_root();
        FileCache::new(&root)
            .unwrap()
            .put(&key("AAPL"), &table())
            .await
            .unwrap();

        let reopened = FileCache::new(&root).unwrap();
        let hit = reopened.get(&key("AAPL")).await.unwrap();
        assert_eq!(hit.map(|h| h.table), Some(table()));

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_empty_table() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();

        cache.put(&key("AAPL"), &PriceTable::new()).await.unwrap();
        let hit = cache.get(&key("AAPL")).await.unwrap().unwrap();
        assert!(hit.table.is_empty());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_recreates_deleted_root() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        cache.put(&key("AAPL"), &table()).await.unwrap();

        fs::remove_dir_all(&root).unwrap();
        assert!(cache.get(&key("AAPL")).await.unwrap().is_none());

        cache.put(&key("AAPL"), &table()).await.unwrap();
        assert!(cache.get(&key("AAPL")).await.unwrap().is_some());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_missing_metadata_is_miss() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        cache.put(&key("AAPL"), &table()).await.unwrap();

        fs::remove_file(cache.entry_dir(&key("AAPL")).join(METADATA_FILE)).unwrap();
        assert!(cache.get(&key("AAPL")).await.unwrap().is_none());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_data_is_error() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        cache.put(&key("AAPL"), &table()).await.unwrap();

        fs::write(cache.entry_dir(&key("AAPL")).join(DATA_FILE), b"garbage").unwrap();
        assert!(cache.get(&key("AAPL")).await.is_err());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_invalidate_stale() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        cache.put(&key("AAPL"), &table()).await.unwrap();
        cache.put(&key("MSFT"), &table()).await.unwrap();

        // Nothing is an hour old yet
        let removed = cache
            .invalidate_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // Backdate one entry
        let metadata_path = cache.entry_dir(&key("AAPL")).join(METADATA_FILE);
        let mut metadata: EntryMetadata =
            serde_json::from_slice(&fs::read(&metadata_path).unwrap()).unwrap();
        metadata.cached_at = Utc::now() - TimeDelta::days(2);
        fs::write(&metadata_path, serde_json::to_vec(&metadata).unwrap()).unwrap();

        let removed = cache
            .invalidate_stale(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(&key("AAPL")).await.unwrap().is_none());
        assert!(cache.get(&key("MSFT")).await.unwrap().is_some());

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_file_cache_clear() {
        let root = temp_root();
        let cache = FileCache::new(&root).unwrap();
        cache.put(&key("AAPL"), &table()).await.unwrap();

        cache.clear().await.unwrap();
        assert!(!root.exists());
        assert!(cache.get(&key("AAPL")).await.unwrap().is_none());

        // Clearing an absent root is fine
        cache.clear().await.unwrap();
    }
}
