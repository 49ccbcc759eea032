//! Fetches one year of AAPL adjusted closes through the disk cache and prints them.
//!
//! The cache directory comes from `PRICES_CACHE_DIR` (default `data`); a second
//! run with the same cache directory makes no network request.

use std::sync::Arc;

use anyhow::Context;
use prices::{CachedFetcher, FetcherConfig, YahooProvider};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICKER: &str = "AAPL";
const START_DATE: &str = "2022-01-01";
const END_DATE: &str = "2023-01-01";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = FetcherConfig::from_env()?;
    info!(cache_dir = %config.cache_dir.display(), "Using price cache");

    let fetcher = CachedFetcher::from_config(Arc::new(YahooProvider::new()), &config)
        .context("opening price cache")?;

    let table = fetcher
        .fetch(TICKER, START_DATE, END_DATE)
        .await
        .with_context(|| format!("fetching {TICKER} from {START_DATE} to {END_DATE}"))?;

    println!("{}", table.to_dataframe()?);
    Ok(())
}
