#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/prices/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance price provider.
//!
//! This crate provides a Yahoo Finance data provider that implements the
//! [`DataProvider`] and [`PriceDataProvider`] traits from `prices-core`.
//!
//! # Features
//!
//! - Fetch daily OHLCV data using Yahoo Finance's chart API
//! - Built-in rate limiting (1 request per second by default)
//! - Adjusted close required; a chart without it is a parse error
//!
//! # Example
//!
//! ```no_run
//! use prices_yahoo::YahooProvider;
//! use prices_core::{PriceDataProvider, Symbol};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> prices_core::Result<()> {
//! let provider = YahooProvider::new();
//! let symbol = Symbol::new("AAPL");
//! let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
//! let end = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//!
//! let df = provider.fetch_ohlcv(&symbol, start, end).await?;
//! println!("Fetched {} rows", df.height());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use polars::prelude::*;
use prices_core::{
    ADJUSTED_CLOSE_COLUMN, DATE_COLUMN, DataError, DataProvider, PriceDataProvider, Result,
    Symbol, table::epoch_days,
};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, instrument};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Default HTTP timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Provider name, also used in cache keys.
const PROVIDER_NAME: &str = "Yahoo Finance";

/// Yahoo Finance data provider.
///
/// Implements [`DataProvider`] and [`PriceDataProvider`].
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Rate limiting
    /// is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Ordering::Relaxed,
        );
    }

    /// Build the chart API URL for a symbol and the half-open range `[start, end)`.
    fn build_chart_url(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> String {
        let midnight = |date: NaiveDate| {
            date.and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
                .unwrap_or(0)
        };

        format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=div%2Csplit&includeAdjustedClose=true",
            CHART_API_URL,
            symbol.as_str(),
            midnight(start),
            midnight(end)
        )
    }

    /// Parse Yahoo Finance chart response into an OHLCV DataFrame.
    ///
    /// Bars are dated in the exchange's local time and clipped to `[start, end)`.
    /// A chart whose adjusted close series is missing or misaligned with its
    /// timestamps is rejected rather than filled from the raw close.
    fn parse_chart_response(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
        response: ChartResponse,
    ) -> Result<DataFrame> {
        let result = response
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;

        let timestamps = result.timestamp.unwrap_or_default();
        if timestamps.is_empty() {
            debug!(symbol = %symbol, "No bars in range");
            return ohlcv_frame(symbol, OhlcvColumns::default());
        }

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::Parse("Missing quote data".to_string()))?;

        let adj_close = result
            .indicators
            .adjclose
            .and_then(|ac| ac.into_iter().next())
            .map(|ac| ac.adjclose)
            .ok_or_else(|| DataError::Parse(format!("Missing adjusted close for {symbol}")))?;
        if adj_close.len() != timestamps.len() {
            return Err(DataError::Parse(format!(
                "Adjusted close for {} has {} values for {} timestamps",
                symbol,
                adj_close.len(),
                timestamps.len()
            )));
        }

        let gmt_offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let mut columns = OhlcvColumns::default();
        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(date) = Utc
                .timestamp_opt(ts + gmt_offset, 0)
                .single()
                .map(|dt| dt.date_naive())
            else {
                continue;
            };
            if date < start || date >= end {
                continue;
            }

            columns.dates.push(epoch_days(date));
            columns.opens.push(value_at(&quote.open, i));
            columns.highs.push(value_at(&quote.high, i));
            columns.lows.push(value_at(&quote.low, i));
            columns.closes.push(value_at(&quote.close, i));
            columns.volumes.push(value_at(&quote.volume, i));
            columns.adj_closes.push(value_at(&adj_close, i));
        }

        ohlcv_frame(symbol, columns)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

}

#[async_trait]
impl PriceDataProvider for YahooProvider {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        // Validate date range
        if start > end {
            return Err(DataError::InvalidParameter(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }

        // [start, start) holds no bars
        if start == end {
            return ohlcv_frame(symbol, OhlcvColumns::default());
        }

        // Apply rate limiting
        self.apply_rate_limit().await;

        let url = self.build_chart_url(symbol, start, end);
        debug!("Fetching OHLCV: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after: Some(Duration::from_secs(60)),
            });
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        }

        if !response.status().is_success() {
            return Err(DataError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let chart_response: ChartResponse = response
            .json()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))?;

        // Check for API-level errors
        if let Some(error) = chart_response.chart.error {
            if error.code == "Not Found" {
                return Err(DataError::SymbolNotFound(symbol.to_string()));
            }
            return Err(DataError::Other(format!(
                "{}: {}",
                error.code, error.description
            )));
        }

        let frame = self.parse_chart_response(symbol, start, end, chart_response)?;
        debug!(rows = frame.height(), "Fetched OHLCV");
        Ok(frame)
    }
}

/// Column buffers for an OHLCV frame, dates as days since the epoch.
#[derive(Debug, Default)]
struct OhlcvColumns {
    dates: Vec<i32>,
    opens: Vec<Option<f64>>,
    highs: Vec<Option<f64>>,
    lows: Vec<Option<f64>>,
    closes: Vec<Option<f64>>,
    volumes: Vec<Option<u64>>,
    adj_closes: Vec<Option<f64>>,
}

fn ohlcv_frame(symbol: &Symbol, columns: OhlcvColumns) -> Result<DataFrame> {
    let symbols: Vec<&str> = vec![symbol.as_str(); columns.dates.len()];

    let date_col = Column::new(DATE_COLUMN.into(), columns.dates)
        .cast(&DataType::Date)
        .map_err(|e| DataError::Other(e.to_string()))?;

    DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        date_col,
        Column::new("open".into(), columns.opens),
        Column::new("high".into(), columns.highs),
        Column::new("low".into(), columns.lows),
        Column::new("close".into(), columns.closes),
        Column::new("volume".into(), columns.volumes),
        Column::new(ADJUSTED_CLOSE_COLUMN.into(), columns.adj_closes),
    ])
    .map_err(|e| DataError::Other(e.to_string()))
}

fn value_at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prices_core::PriceTable;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const ADJCLOSE: &str = r#", "adjclose": [{"adjclose": [179.27, null, 172.10]}]"#;

    /// Three daily bars at 14:30 UTC: 2022-01-03, 2022-01-04, 2022-01-05.
    fn chart_json(adjclose: &str) -> String {
        format!(
            r#"{{"chart": {{"result": [{{
                "meta": {{"symbol": "AAPL", "gmtoffset": -18000}},
                "timestamp": [1641220200, 1641306600, 1641393000],
                "indicators": {{
                    "quote": [{{
                        "open": [177.83, 182.63, 179.61],
                        "high": [182.88, 182.94, 180.17],
                        "low": [177.71, 179.12, 174.64],
                        "close": [182.01, 179.70, 174.92],
                        "volume": [104487900, 99310400, 94537600]
                    }}]{adjclose}
                }}
            }}], "error": null}}}}"#
        )
    }

    fn parse(json: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        let provider = YahooProvider::new();
        let response: ChartResponse = serde_json::from_str(json).unwrap();
        provider.parse_chart_response(&Symbol::new("AAPL"), start, end, response)
    }

    #[test]
    fn test_build_chart_url() {
        let provider = YahooProvider::new();
        let symbol = Symbol::new("AAPL");
        let start = day(2022, 1, 1);
        let end = day(2023, 1, 1);

        let url = provider.build_chart_url(&symbol, start, end);

        assert!(url.contains("/AAPL?"));
        assert!(url.contains("period1=1640995200"));
        assert!(url.contains("period2=1672531200"));
        assert!(url.contains("interval=1d"));
        assert!(url.contains("includeAdjustedClose=true"));
    }

    #[test]
    fn test_parse_chart_response() {
        let df = parse(&chart_json(ADJCLOSE), day(2022, 1, 1), day(2023, 1, 1)).unwrap();

        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 8);

        let table = PriceTable::from_ohlcv(&df).unwrap();
        assert_eq!(table.get(day(2022, 1, 3)), Some(Some(179.27)));
        assert_eq!(table.get(day(2022, 1, 4)), Some(None));
        assert_eq!(table.get(day(2022, 1, 5)), Some(Some(172.10)));
    }

    #[test]
    fn test_parse_missing_adjusted_close_is_error() {
        let result = parse(&chart_json(""), day(2022, 1, 1), day(2023, 1, 1));
        assert!(matches!(result, Err(DataError::Parse(_))));
    }

    #[test]
    fn test_parse_misaligned_adjusted_close_is_error() {
        let short = r#", "adjclose": [{"adjclose": [179.27, 175.10]}]"#;
        let result = parse(&chart_json(short), day(2022, 1, 1), day(2023, 1, 1));
        assert!(matches!(result, Err(DataError::Parse(_))));

        let empty = r#", "adjclose": [{}]"#;
        let result = parse(&chart_json(empty), day(2022, 1, 1), day(2023, 1, 1));
        assert!(matches!(result, Err(DataError::Parse(_))));
    }

    #[test]
    fn test_parse_clips_to_half_open_range() {
        let df = parse(&chart_json(ADJCLOSE), day(2022, 1, 4), day(2022, 1, 5)).unwrap();

        let table = PriceTable::from_ohlcv(&df).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.date_range(), Some((day(2022, 1, 4), day(2022, 1, 4))));
    }

    #[test]
    fn test_parse_empty_result() {
        let json = r#"{"chart": {"result": [{
            "meta": {"symbol": "AAPL"},
            "indicators": {"quote": [{}], "adjclose": [{}]}
        }], "error": null}}"#;

        let df = parse(json, day(2022, 1, 1), day(2022, 1, 2)).unwrap();
        assert_eq!(df.height(), 0);
        assert!(PriceTable::from_ohlcv(&df).unwrap().is_empty());
    }

    #[test]
    fn test_parse_missing_result() {
        let json = r#"{"chart": {"result": null, "error": null}}"#;
        assert!(matches!(
            parse(json, day(2022, 1, 1), day(2023, 1, 1)),
            Err(DataError::SymbolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_range_skips_request() {
        let provider = YahooProvider::new();
        let df = provider
            .fetch_ohlcv(&Symbol::new("AAPL"), day(2022, 1, 1), day(2022, 1, 1))
            .await
            .unwrap();
        assert_eq!(df.height(), 0);
    }

    #[tokio::test]
    async fn test_inverted_range_is_invalid() {
        let provider = YahooProvider::new();
        let result = provider
            .fetch_ohlcv(&Symbol::new("AAPL"), day(2023, 1, 1), day(2022, 1, 1))
            .await;
        assert!(matches!(result, Err(DataError::InvalidParameter(_))));
    }

    #[test]
    fn test_provider_info() {
        let provider = YahooProvider::default();

        assert_eq!(provider.name(), "Yahoo Finance");
    }
}
