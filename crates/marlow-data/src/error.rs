//! Market data failures.

use marlow_risk::PriceTableError;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors from fetching, caching or aligning market data.
#[derive(Debug, Error)]
pub enum DataError {
    /// The Yahoo chart API rejected the request or returned an unusable body
    #[error("Yahoo Finance request failed: {0}")]
    YahooApi(String),

    /// Transport failure talking to Yahoo
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Yahoo answered with an unexpected status
    #[error("Unexpected response: {0}")]
    Http(String),

    /// Quote cache failure
    #[error("Quote cache error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A response or cached row could not be interpreted
    #[error("Malformed market data: {0}")]
    Parse(String),

    /// Window start after its end
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Window start
        start: String,
        /// Window end
        end: String,
    },

    /// The symbol is unknown or has no data in the window
    #[error("No data for {symbol}: {reason}")]
    MissingData {
        /// Symbol that was queried
        symbol: String,
        /// What the source reported
        reason: String,
    },

    /// Quote frame construction failed
    #[error("Quote frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    /// Cached valuation snapshot could not be encoded or decoded
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timestamp outside the range the Yahoo client accepts
    #[error("Time conversion error: {0}")]
    TimeConversion(String),

    /// Empty or malformed ticker
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Filesystem failure creating the cache directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fetched quotes could not be aligned into a price table
    #[error("Price table error: {0}")]
    PriceTable(#[from] PriceTableError),
}

impl DataError {
    /// Whether the error means the symbol is unknown or has no data, as opposed to
    /// the source being unreachable.
    pub const fn is_missing_data(&self) -> bool {
        matches!(self, Self::MissingData { .. } | Self::InvalidSymbol(_))
    }
}

impl From<yahoo_finance_api::YahooError> for DataError {
    fn from(err: yahoo_finance_api::YahooError) -> Self {
        Self::YahooApi(err.to_string())
    }
}
