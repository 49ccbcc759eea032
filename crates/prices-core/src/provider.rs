//! Provider traits for fetching historical prices.
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`PriceDataProvider`] - Daily OHLCV bars with an adjusted close

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::{error::Result, types::Symbol};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Yahoo Finance").
    ///
    /// The name is part of every cache key, so two providers never share entries.
    fn name(&self) -> &str;
}

/// Provider for daily OHLCV price data.
#[async_trait]
pub trait PriceDataProvider: DataProvider {
    /// Fetches daily OHLCV bars for a single symbol over `[start, end)`.
    ///
    /// Returns a DataFrame with columns: symbol, date, open, high, low, close,
    /// volume, adjusted_close. A range without trading days yields an empty
    /// frame with the same columns.
    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame>;
}
