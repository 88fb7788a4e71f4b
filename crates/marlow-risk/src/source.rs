//! Market data seam.
//!
//! The engine never fetches data itself; it asks a [`MarketDataSource`]. The Yahoo
//! implementation lives in `marlow-data`, tests use in-memory sources.

use crate::prices::PriceTable;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Valuation ratios of one instrument. Either ratio may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationRatios {
    /// Forward price to earnings
    pub forward_pe: Option<f64>,
    /// Trailing twelve month price to earnings
    pub trailing_pe: Option<f64>,
}

impl ValuationRatios {
    /// Ratios with both values set.
    pub const fn new(forward_pe: Option<f64>, trailing_pe: Option<f64>) -> Self {
        Self {
            forward_pe,
            trailing_pe,
        }
    }

    /// Forward P/E if usable, otherwise trailing P/E if usable.
    ///
    /// A ratio is usable when it is finite and non-zero.
    pub fn preferred(&self) -> Option<f64> {
        usable(self.forward_pe).or_else(|| usable(self.trailing_pe))
    }
}

fn usable(ratio: Option<f64>) -> Option<f64> {
    ratio.filter(|r| r.is_finite() && *r != 0.0)
}

/// Source of historical closes and valuation ratios.
///
/// Implementations omit tickers they know nothing about rather than failing the whole
/// request; an `Err` means the source itself could not be reached.
pub trait MarketDataSource: Send + Sync {
    /// Error raised when the source cannot answer.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Daily closes for `tickers`, aligned by date, at most `days` trailing rows.
    fn price_history(
        &self,
        tickers: &[String],
        days: usize,
    ) -> impl Future<Output = Result<PriceTable, Self::Error>> + Send;

    /// Forward and trailing P/E of one ticker.
    fn valuation_ratios(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<ValuationRatios, Self::Error>> + Send;
}

impl<T: MarketDataSource> MarketDataSource for &T {
    type Error = T::Error;

    fn price_history(
        &self,
        tickers: &[String],
        days: usize,
    ) -> impl Future<Output = Result<PriceTable, Self::Error>> + Send {
        (**self).price_history(tickers, days)
    }

    fn valuation_ratios(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<ValuationRatios, Self::Error>> + Send {
        (**self).valuation_ratios(ticker)
    }
}

impl<T: MarketDataSource> MarketDataSource for Arc<T> {
    type Error = T::Error;

    fn price_history(
        &self,
        tickers: &[String],
        days: usize,
    ) -> impl Future<Output = Result<PriceTable, Self::Error>> + Send {
        self.as_ref().price_history(tickers, days)
    }

    fn valuation_ratios(
        &self,
        ticker: &str,
    ) -> impl Future<Output = Result<ValuationRatios, Self::Error>> + Send {
        self.as_ref().valuation_ratios(ticker)
    }
}
