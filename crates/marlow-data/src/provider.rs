//! [`MarketDataSource`] backed by Yahoo Finance with an optional SQLite cache.

use crate::cache::SqliteCache;
use crate::error::{DataError, Result};
use crate::frame::{frames_to_table, through_date};
use crate::yahoo::{
    YahooFundamentalsProvider, YahooQuoteProvider, calendar_window, last_completed_session,
};
use chrono::{DateTime, NaiveDate, Utc};
use marlow_risk::{MarketDataSource, PriceTable, ValuationRatios};
use polars::prelude::DataFrame;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Configuration for data fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Whether to use the cache.
    pub use_cache: bool,
    /// Whether to force refresh (ignore cached values, still write fresh ones).
    pub force_refresh: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
        }
    }
}

/// Yahoo Finance quotes and valuation ratios, cached in SQLite when a cache is
/// attached.
#[derive(Debug)]
pub struct YahooMarketData {
    quotes: YahooQuoteProvider,
    fundamentals: YahooFundamentalsProvider,
    cache: Option<Mutex<SqliteCache>>,
    config: FetchConfig,
}

impl YahooMarketData {
    /// Uncached source with default providers.
    ///
    /// # Errors
    /// Fails if an HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self::from_providers(
            YahooQuoteProvider::new()?,
            YahooFundamentalsProvider::new()?,
        ))
    }

    /// Uncached source from configured providers.
    pub const fn from_providers(
        quotes: YahooQuoteProvider,
        fundamentals: YahooFundamentalsProvider,
    ) -> Self {
        Self {
            quotes,
            fundamentals,
            cache: None,
            config: FetchConfig {
                use_cache: false,
                force_refresh: false,
            },
        }
    }

    /// Attach a cache. It is only consulted when `config.use_cache` is set.
    pub fn with_cache(mut self, cache: SqliteCache, config: FetchConfig) -> Self {
        self.cache = config.use_cache.then(|| Mutex::new(cache));
        self.config = config;
        self
    }

    /// Current fetch settings.
    pub const fn config(&self) -> FetchConfig {
        self.config
    }

    fn cache(&self) -> Option<MutexGuard<'_, SqliteCache>> {
        let cache = self.cache.as_ref()?;
        match cache.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("Quote cache lock poisoned, bypassing cache");
                None
            }
        }
    }

    fn read_cached_quotes(
        &self,
        tickers: &[String],
        start: NaiveDate,
        through: NaiveDate,
    ) -> (Vec<DataFrame>, Vec<String>) {
        let mut cached = Vec::new();
        let mut missing = Vec::new();

        let guard = if self.config.force_refresh {
            None
        } else {
            self.cache()
        };

        for symbol in tickers {
            let hit = guard.as_ref().and_then(|cache| {
                if !cache.has_quotes(symbol, start, through).unwrap_or(false) {
                    return None;
                }
                cache.get_quotes(symbol, start, through).ok()
            });

            match hit {
                Some(df) => {
                    debug!("Loaded {} from cache", symbol);
                    cached.push(df);
                }
                None => missing.push(symbol.clone()),
            }
        }

        (cached, missing)
    }

    fn write_cached_quotes(&self, symbol: &str, df: &DataFrame, through: NaiveDate) {
        if let Some(cache) = self.cache()
            && let Err(e) = cache.put_quotes(df, through)
        {
            warn!("Failed to cache quotes for {}: {}", symbol, e);
        }
    }

    /// Fetch closes for `tickers` covering `days` trading days, up to the last session
    /// completed by `end`.
    ///
    /// Tickers Yahoo has no data for are left out of the table.
    ///
    /// # Errors
    /// Any fetch failure other than missing data, or [`DataError::MissingData`] if no
    /// ticker returned any data.
    pub async fn fetch_table(
        &self,
        tickers: &[String],
        days: usize,
        end: DateTime<Utc>,
    ) -> Result<PriceTable> {
        let tickers: Vec<String> = tickers.iter().map(|t| t.trim().to_uppercase()).collect();
        if tickers.is_empty() || days == 0 {
            return Ok(PriceTable::empty(&tickers));
        }

        let (start, end) = calendar_window(days, end);
        let session = last_completed_session(end);
        debug!(
            "Price window {} to {} for {} trading days",
            start.date_naive(),
            session,
            days
        );

        let (mut frames, missing) = self.read_cached_quotes(&tickers, start.date_naive(), session);

        let mut fetched = Vec::with_capacity(missing.len());
        for (symbol, result) in self.quotes.fetch_quotes_each(&missing, start, end).await {
            let result = result.and_then(|df| through_date(&df, session));
            if let Ok(df) = &result {
                self.write_cached_quotes(&symbol, df, session);
            }
            fetched.push((symbol, result));
        }
        frames.extend(keep_fetched(fetched)?);

        if frames.is_empty() {
            return Err(DataError::MissingData {
                symbol: tickers.join(","),
                reason: "No data fetched for any symbol".to_string(),
            });
        }

        frames_to_table(&frames, &tickers, days)
    }

    /// Forward and trailing P/E for one ticker, empty if Yahoo does not know it.
    pub async fn fetch_ratios(&self, ticker: &str) -> Result<ValuationRatios> {
        let symbol = ticker.trim().to_uppercase();
        let today = Utc::now().date_naive();

        if !self.config.force_refresh
            && let Some(cache) = self.cache()
            && let Ok(Some(data)) = cache.get_fundamentals(&symbol, today)
        {
            debug!("Loaded {} fundamentals from cache", symbol);
            return Ok(ValuationRatios::from(&data));
        }

        match self.fundamentals.fetch_fundamentals(&symbol).await {
            Ok(data) => {
                if let Some(cache) = self.cache()
                    && let Err(e) = cache.put_fundamentals(&data, today)
                {
                    warn!("Failed to cache fundamentals for {}: {}", symbol, e);
                }
                Ok(ValuationRatios::from(&data))
            }
            Err(e) if e.is_missing_data() => {
                debug!("No fundamentals for {}: {}", symbol, e);
                Ok(ValuationRatios::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// Frames from per-symbol fetch results.
///
/// Symbols Yahoo has no data for are dropped; any other failure fails the whole
/// request.
fn keep_fetched(results: Vec<(String, Result<DataFrame>)>) -> Result<Vec<DataFrame>> {
    let mut frames = Vec::with_capacity(results.len());
    for (symbol, result) in results {
        match result {
            Ok(df) => frames.push(df),
            Err(e) if e.is_missing_data() => {
                warn!("No data for {}, leaving it out: {}", symbol, e);
            }
            Err(e) => {
                warn!("Failed to fetch data for {}: {}", symbol, e);
                return Err(e);
            }
        }
    }
    Ok(frames)
}

impl MarketDataSource for YahooMarketData {
    type Error = DataError;

    async fn price_history(&self, tickers: &[String], days: usize) -> Result<PriceTable> {
        self.fetch_table(tickers, days, Utc::now()).await
    }

    async fn valuation_ratios(&self, ticker: &str) -> Result<ValuationRatios> {
        self.fetch_ratios(ticker).await
    }
}
