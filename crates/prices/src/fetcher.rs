//! Disk-memoized adjusted close fetcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use tracing::{debug, instrument, warn};

use prices_cache::FileCache;
use prices_core::{
    ADJUSTED_CLOSE_FUNCTION, CacheKey, DataCache, DataError, PriceDataProvider, PriceTable,
    Result, Symbol,
};

use crate::config::FetcherConfig;

/// Memoizing wrapper around a [`PriceDataProvider`].
///
/// The first request for a (ticker, start, end) triple goes to the provider;
/// the adjusted close is kept, renamed `price` and stored in the cache.
/// Identical requests afterwards are answered from the cache without
/// contacting the provider.
///
/// There is no coordination between concurrent callers: two fetches of the
/// same uncached key may both reach the provider, and the last write wins.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use prices::{CachedFetcher, FileCache, YahooProvider};
///
/// let fetcher = CachedFetcher::new(
///     Arc::new(YahooProvider::new()),
///     Arc::new(FileCache::new("data")?),
/// );
/// let table = fetcher.fetch("AAPL", "2022-01-01", "2023-01-01").await?;
/// ```
#[derive(Debug, Clone)]
pub struct CachedFetcher {
    provider: Arc<dyn PriceDataProvider>,
    cache: Arc<dyn DataCache>,
    max_age: Option<Duration>,
}

impl CachedFetcher {
    /// Create a fetcher over `provider` that memoizes into `cache`.
    ///
    /// Entries never expire.
    #[must_use]
    pub fn new(provider: Arc<dyn PriceDataProvider>, cache: Arc<dyn DataCache>) -> Self {
        Self {
            provider,
            cache,
            max_age: None,
        }
    }

    /// Create a fetcher backed by a [`FileCache`] at `config.cache_dir`.
    ///
    /// # Errors
    /// Returns [`DataError::Cache`] if the cache directory cannot be created.
    pub fn from_config(
        provider: Arc<dyn PriceDataProvider>,
        config: &FetcherConfig,
    ) -> Result<Self> {
        let cache = FileCache::new(&config.cache_dir)?;
        Ok(Self::new(provider, Arc::new(cache)).with_max_age(config.max_age))
    }

    /// Sets how long an entry stays valid. `None` keeps entries forever.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// The underlying provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn PriceDataProvider> {
        &self.provider
    }

    /// The cache this fetcher reads and writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn DataCache> {
        &self.cache
    }

    /// The cache key for a request.
    #[must_use]
    pub fn key(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> CacheKey {
        CacheKey::new(
            ADJUSTED_CLOSE_FUNCTION,
            self.provider.name(),
            symbol.clone(),
            start,
            end,
        )
    }

    /// Fetches adjusted close prices for `ticker` over `[start, end)`.
    ///
    /// Dates are `YYYY-MM-DD`. The range itself is not checked here; the
    /// provider decides what an inverted range means.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if a date does not parse, and
    /// otherwise whatever [`fetch_range`](Self::fetch_range) returns.
    pub async fn fetch(&self, ticker: &str, start: &str, end: &str) -> Result<PriceTable> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        self.fetch_range(&Symbol::new(ticker), start, end).await
    }

    /// Fetches adjusted close prices for `symbol` over `[start, end)`.
    ///
    /// A cache hit returns the stored table. On a miss the provider is asked
    /// for daily bars, the table is stored, then returned. Cache failures are
    /// logged and do not fail the call.
    ///
    /// # Errors
    /// Provider errors are returned unchanged and nothing is cached for them.
    /// [`DataError::Parse`] if the provider frame has no adjusted close.
    #[instrument(skip(self), fields(provider = self.provider.name(), symbol = %symbol))]
    pub async fn fetch_range(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable> {
        let key = self.key(symbol, start, end);

        match self.cache.get(&key).await {
            Ok(Some(entry)) if self.max_age.is_some_and(|age| entry.is_stale(age)) => {
                debug!(cached_at = %entry.cached_at, "Cached prices expired, refetching");
            }
            Ok(Some(entry)) => {
                debug!(rows = entry.table.len(), "Cache hit for prices");
                return Ok(entry.table);
            }
            Ok(None) => {
                debug!("Cache miss for prices");
            }
            Err(e) => {
                warn!(error = %e, "Failed to read cached prices, refetching");
            }
        }

        let frame: DataFrame = self.provider.fetch_ohlcv(symbol, start, end).await?;
        let table = PriceTable::from_ohlcv(&frame)?;

        if let Err(e) = self.cache.put(&key, &table).await {
            warn!(error = %e, "Failed to cache prices");
        }

        debug!(rows = table.len(), "Fetched prices");
        Ok(table)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DataError::InvalidParameter(format!("Invalid date {s:?}: {e}")))
}
