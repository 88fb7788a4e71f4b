//! Analysis settings shared by the command line and library callers.

use marlow_data::cache::SqliteCache;
use marlow_data::yahoo::quotes::{DEFAULT_CONCURRENCY, DEFAULT_RATE_LIMIT};
use marlow_data::yahoo::{YahooFundamentalsProvider, YahooQuoteProvider};
use marlow_data::{DataError, FetchConfig, YahooMarketData};
use marlow_risk::engine::{DEFAULT_BENCHMARK, DEFAULT_FETCH_TIMEOUT};
use marlow_risk::metrics::DEFAULT_RISK_FREE_RATE;
use marlow_risk::period::{DEFAULT_PERIODS, parse_periods};
use marlow_risk::{EngineConfig, Holdings, LookbackPeriod};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading configuration or holdings files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting is out of range.
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annual risk-free rate for the Sharpe ratio (default: 0.01)
    pub risk_free_rate: f64,

    /// Benchmark ticker (default: VOO)
    pub benchmark: String,

    /// Period labels for return comparisons, in display order
    pub periods: Vec<String>,

    /// Lookback for volatility, trailing return and Sharpe (default: 1y)
    pub history: String,

    /// Bound on each market data request in seconds (default: 30)
    pub fetch_timeout_secs: u64,

    /// Read and write the local quote cache (default: true)
    pub use_cache: bool,

    /// Ignore cached quotes but still store fresh ones (default: false)
    pub force_refresh: bool,

    /// Symbols fetched at once (default: 8)
    pub concurrency: usize,

    /// Pause after each Yahoo request in milliseconds (default: 250)
    pub rate_limit_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            benchmark: DEFAULT_BENCHMARK.to_string(),
            periods: DEFAULT_PERIODS.iter().map(|p| (*p).to_string()).collect(),
            history: "1y".to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            use_cache: true,
            force_refresh: false,
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit_ms: DEFAULT_RATE_LIMIT.as_millis() as u64,
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    /// IO and parse errors, or [`ConfigError::Invalid`] from [`Self::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    ///
    /// Unresolvable period labels are allowed; they are reported per period.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.risk_free_rate.is_finite() {
            return Err(invalid("risk_free_rate", "must be a finite number"));
        }
        if self.benchmark.trim().is_empty() {
            return Err(invalid("benchmark", "must not be empty"));
        }
        if !LookbackPeriod::parse(&self.history).is_resolved() {
            return Err(invalid(
                "history",
                format!("{:?} is not a period like 1y or 6mo", self.history),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(invalid("fetch_timeout_secs", "must be positive"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be positive"));
        }
        Ok(())
    }

    /// Parsed period labels.
    pub fn lookback_periods(&self) -> Vec<LookbackPeriod> {
        parse_periods(&self.periods)
    }

    /// Settings for the metrics engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            risk_free_rate: self.risk_free_rate,
            history: LookbackPeriod::parse(&self.history),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            benchmark: self.benchmark.trim().to_uppercase(),
        }
    }

    /// Settings for the market data cache.
    pub const fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            use_cache: self.use_cache,
            force_refresh: self.force_refresh,
        }
    }

    /// Build the Yahoo market data source.
    ///
    /// A cache that cannot be opened is logged and skipped.
    ///
    /// # Errors
    /// Fails if an HTTP client cannot be built.
    pub fn market_data(&self) -> Result<YahooMarketData, DataError> {
        let delay = Duration::from_millis(self.rate_limit_ms);
        let quotes = YahooQuoteProvider::with_rate_limit(delay)?.with_concurrency(self.concurrency);
        let fundamentals = YahooFundamentalsProvider::with_rate_limit(delay)?;
        let source = YahooMarketData::from_providers(quotes, fundamentals);

        if !self.use_cache {
            return Ok(source);
        }

        match SqliteCache::open_default() {
            Ok(cache) => Ok(source.with_cache(cache, self.fetch_config())),
            Err(e) => {
                warn!("Quote cache unavailable, fetching without it: {}", e);
                Ok(source)
            }
        }
    }
}

/// Load holdings from a JSON object of ticker to dollar amount.
///
/// # Errors
/// IO errors, or [`ConfigError::Parse`] for malformed JSON, bad tickers and
/// non-positive amounts.
pub fn load_holdings(path: &Path) -> Result<Holdings, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
