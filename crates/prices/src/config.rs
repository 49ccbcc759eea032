//! Fetcher configuration.

use std::path::PathBuf;
use std::time::Duration;

use prices_core::{DataError, Result};

/// Cache directory used when none is configured.
pub const DEFAULT_CACHE_DIR: &str = "data";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "PRICES_CACHE_DIR";

/// Environment variable holding the maximum entry age in seconds.
pub const CACHE_MAX_AGE_ENV: &str = "PRICES_CACHE_MAX_AGE_SECS";

/// Settings for a [`CachedFetcher`](crate::CachedFetcher).
///
/// Each fetcher owns its configuration, so fetchers with different cache
/// directories can live side by side in one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Root directory of the on-disk cache. Created if absent.
    pub cache_dir: PathBuf,
    /// Entries older than this are refetched. `None` keeps entries forever.
    pub max_age: Option<Duration>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_age: None,
        }
    }
}

impl FetcherConfig {
    /// Creates a configuration caching under `cache_dir` with no expiry.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_age: None,
        }
    }

    /// Sets the maximum age of a cache entry.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Reads `PRICES_CACHE_DIR` and `PRICES_CACHE_MAX_AGE_SECS`.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if the max age is not a whole
    /// number of seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let cache_dir = lookup(CACHE_DIR_ENV)
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR), PathBuf::from);

        let max_age = lookup(CACHE_MAX_AGE_ENV)
            .map(|secs| {
                secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    DataError::InvalidParameter(format!("{CACHE_MAX_AGE_ENV}={secs:?}: {e}"))
                })
            })
            .transpose()?;

        Ok(Self { cache_dir, max_age })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FetcherConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FetcherConfig::default());
        assert_eq!(config.cache_dir, PathBuf::from("data"));
        assert_eq!(config.max_age, None);
    }

    #[test]
    fn test_from_lookup() {
        let config = FetcherConfig::from_lookup(lookup(&[
            (CACHE_DIR_ENV, "/tmp/prices"),
            (CACHE_MAX_AGE_ENV, "86400"),
        ]))
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/prices"));
        assert_eq!(config.max_age, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_invalid_max_age() {
        let result = FetcherConfig::from_lookup(lookup(&[(CACHE_MAX_AGE_ENV, "one day")]));
        assert!(matches!(result, Err(DataError::InvalidParameter(_))));
    }

    #[test]
    fn test_builder() {
        let config = FetcherConfig::new("cache").with_max_age(Duration::from_secs(60));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.max_age, Some(Duration::from_secs(60)));
    }
}
