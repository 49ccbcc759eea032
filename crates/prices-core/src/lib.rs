#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/prices/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for cached price retrieval.
//!
//! - [`DataProvider`](provider::DataProvider) - Base trait for all providers
//! - [`PriceDataProvider`](provider::PriceDataProvider) - OHLCV price data
//! - [`DataCache`](cache::DataCache) - Memoization store for price tables
//! - [`PriceTable`](table::PriceTable) - Date-indexed adjusted close prices

/// Cache trait and key types.
pub mod cache;
/// Error types for price retrieval.
pub mod error;
/// Provider traits for fetching market data.
pub mod provider;
/// Price table type and frame conversions.
pub mod table;
/// Trading symbol type.
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{ADJUSTED_CLOSE_FUNCTION, CacheKey, CachedTable, DataCache};
pub use error::{DataError, Result};
pub use provider::{DataProvider, PriceDataProvider};
pub use table::{ADJUSTED_CLOSE_COLUMN, DATE_COLUMN, PRICE_COLUMN, PricePoint, PriceTable};
pub use types::Symbol;
