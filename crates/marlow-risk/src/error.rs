//! Typed failures for portfolio metrics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a single metric: a value or the reason it is unavailable.
pub type MetricResult<T = f64> = std::result::Result<T, MetricError>;

/// Reasons a metric could not be computed.
///
/// Every metric fails independently, so a caller holding several results can render
/// the ones that succeeded and report the others by kind.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MetricError {
    /// Holdings were empty or summed to zero.
    #[error("portfolio has no holdings")]
    EmptyPortfolio,

    /// Too few aligned price points for the computation.
    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Observations required
        required: usize,
        /// Observations available
        actual: usize,
    },

    /// No ticker had a forward or trailing P/E ratio.
    #[error("no valid P/E ratios for the given tickers")]
    NoValidRatios,

    /// No ticker had price data in the requested window.
    #[error("no valid returns for the given tickers")]
    NoValidReturns,

    /// Volatility was exactly zero.
    #[error("Sharpe ratio is undefined for zero volatility")]
    UndefinedSharpe,

    /// The market data fetch failed or timed out.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// A period label did not resolve to a positive trading-day count.
    #[error("unresolved period: {0:?}")]
    UnresolvedPeriod(String),
}

impl MetricError {
    /// Short machine-readable name of the failure kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPortfolio => "empty_portfolio",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::NoValidRatios => "no_valid_ratios",
            Self::NoValidReturns => "no_valid_returns",
            Self::UndefinedSharpe => "undefined_sharpe",
            Self::DataUnavailable(_) => "data_unavailable",
            Self::UnresolvedPeriod(_) => "unresolved_period",
        }
    }
}
