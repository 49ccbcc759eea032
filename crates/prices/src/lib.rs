#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/prices/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Disk-memoized adjusted close prices.
//!
//! This crate re-exports the core types and cache backends, the Yahoo
//! Finance provider, and provides [`CachedFetcher`], which answers repeated
//! identical requests from the cache instead of the network.
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance provider (default)

// Core types and traits
pub use prices_core::*;

// Cache implementations
pub use prices_cache::{FileCache, InMemoryCache, NoopCache};

// Providers
#[cfg(feature = "yahoo")]
pub use prices_yahoo::YahooProvider;

mod config;
mod fetcher;
pub use config::{CACHE_DIR_ENV, CACHE_MAX_AGE_ENV, DEFAULT_CACHE_DIR, FetcherConfig};
pub use fetcher::CachedFetcher;
