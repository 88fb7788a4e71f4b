//! Async orchestration of the portfolio metrics.
//!
//! [`MetricsEngine`] pulls prices and ratios from a [`MarketDataSource`] and hands them
//! to the pure functions in [`crate::metrics`]. It keeps no state between calls: the
//! holdings are passed into every operation.

use crate::benchmark::{BenchmarkReturnFetcher, PeriodComparison};
use crate::error::{MetricError, MetricResult};
use crate::holdings::Holdings;
use crate::metrics::{self, DEFAULT_RISK_FREE_RATE, PeriodReturns, PortfolioMetrics};
use crate::period::{LookbackPeriod, max_days};
use crate::prices::PriceTable;
use crate::source::{MarketDataSource, ValuationRatios};
use crate::weights::WeightVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single market data request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default benchmark instrument.
pub const DEFAULT_BENCHMARK: &str = "VOO";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Annual risk-free rate for the Sharpe ratio (default: 0.01)
    pub risk_free_rate: f64,

    /// Lookback for volatility, trailing return and Sharpe (default: 1y)
    pub history: LookbackPeriod,

    /// Bound on each market data request (default: 30s)
    pub fetch_timeout: Duration,

    /// Benchmark ticker for period comparisons (default: VOO)
    pub benchmark: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            history: LookbackPeriod::parse("1y"),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            benchmark: DEFAULT_BENCHMARK.to_string(),
        }
    }
}

/// Await a market data request, mapping failures and timeouts to
/// [`MetricError::DataUnavailable`].
pub(crate) async fn fetch_bounded<T, E, F>(timeout: Duration, what: &str, fut: F) -> MetricResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("Failed to fetch {}: {}", what, e);
            Err(MetricError::DataUnavailable(e.to_string()))
        }
        Err(_) => {
            warn!("Timed out fetching {} after {:?}", what, timeout);
            Err(MetricError::DataUnavailable(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            )))
        }
    }
}

/// Computes portfolio metrics against a market data source.
#[derive(Debug, Clone)]
pub struct MetricsEngine<S> {
    source: S,
    config: EngineConfig,
}

impl<S: MarketDataSource> MetricsEngine<S> {
    /// Engine with default settings.
    pub fn new(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    /// Engine with explicit settings.
    pub const fn with_config(source: S, config: EngineConfig) -> Self {
        Self { source, config }
    }

    /// The underlying source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Current settings.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Annualized portfolio volatility over the history window.
    pub async fn volatility(&self, holdings: &Holdings) -> MetricResult {
        let weights = WeightVector::build(holdings)?;
        let table = self.history_table(&weights).await?;
        metrics::portfolio_volatility(&table, &weights)
    }

    /// Weighted forward (else trailing) P/E.
    pub async fn pe_ratio(&self, holdings: &Holdings) -> MetricResult {
        let weights = WeightVector::build(holdings)?;
        let ratios = self.ratios(&weights).await?;
        metrics::weighted_pe_ratio(&weights, &ratios)
    }

    /// Weighted return over the history window.
    pub async fn trailing_return(&self, holdings: &Holdings) -> MetricResult {
        let weights = WeightVector::build(holdings)?;
        let table = self.history_table(&weights).await?;
        metrics::window_return(&table, &weights, self.config.history.days())
    }

    /// Sharpe ratio over the history window.
    pub async fn sharpe_ratio(&self, holdings: &Holdings) -> MetricResult {
        let weights = WeightVector::build(holdings)?;
        let table = self.history_table(&weights).await?;
        metrics::sharpe_ratio(&table, &weights, self.config.risk_free_rate)
    }

    /// All four metrics from one price fetch and one ratio lookup per ticker.
    pub async fn analyze(&self, holdings: &Holdings) -> PortfolioMetrics {
        let weights = match WeightVector::build(holdings) {
            Ok(weights) => weights,
            Err(e) => return PortfolioMetrics::failed(&e),
        };

        let (table, ratios) = tokio::join!(self.history_table(&weights), self.ratios(&weights));

        let pe_ratio = ratios.and_then(|r| metrics::weighted_pe_ratio(&weights, &r));
        match table {
            Ok(table) => PortfolioMetrics {
                volatility: metrics::portfolio_volatility(&table, &weights),
                pe_ratio,
                trailing_return: metrics::window_return(
                    &table,
                    &weights,
                    self.config.history.days(),
                ),
                sharpe_ratio: metrics::sharpe_ratio(&table, &weights, self.config.risk_free_rate),
            },
            Err(e) => PortfolioMetrics {
                pe_ratio,
                ..PortfolioMetrics::failed(&e)
            },
        }
    }

    /// Weighted returns for several lookback periods from a single price fetch.
    ///
    /// The table spans the longest resolved period. A failed fetch or empty holdings is
    /// reported on every entry.
    pub async fn period_returns(
        &self,
        holdings: &Holdings,
        periods: &[LookbackPeriod],
    ) -> PeriodReturns {
        let weights = match WeightVector::build(holdings) {
            Ok(weights) => weights,
            Err(e) => return PeriodReturns::failed(periods, &e),
        };

        match self.fetch_prices(weights.tickers(), max_days(periods)).await {
            Ok(table) => metrics::period_returns(&table, &weights, periods),
            Err(e) => PeriodReturns::failed(periods, &e),
        }
    }

    /// Portfolio period returns side by side with the configured benchmark.
    pub async fn compare_with_benchmark(
        &self,
        holdings: &Holdings,
        periods: &[LookbackPeriod],
    ) -> PeriodComparison {
        let benchmark = BenchmarkReturnFetcher::new(&self.source, &self.config.benchmark)
            .with_timeout(self.config.fetch_timeout);

        let (portfolio, benchmark) =
            tokio::join!(self.period_returns(holdings, periods), benchmark.fetch(periods));

        PeriodComparison::new(&self.config.benchmark, &portfolio, &benchmark)
    }

    async fn history_table(&self, weights: &WeightVector) -> MetricResult<PriceTable> {
        let days = self.config.history.days();
        if days == 0 {
            return Err(MetricError::UnresolvedPeriod(
                self.config.history.label().to_string(),
            ));
        }
        self.fetch_prices(weights.tickers(), days).await
    }

    async fn fetch_prices(&self, tickers: &[String], days: usize) -> MetricResult<PriceTable> {
        if days == 0 {
            return Ok(PriceTable::empty(tickers));
        }

        debug!("Fetching {} trading days for {} tickers", days, tickers.len());
        fetch_bounded(
            self.config.fetch_timeout,
            "price history",
            self.source.price_history(tickers, days),
        )
        .await
    }

    /// One lookup per ticker, each under its own timeout.
    async fn ratios(&self, weights: &WeightVector) -> MetricResult<HashMap<String, ValuationRatios>> {
        let mut ratios = HashMap::with_capacity(weights.len());
        for ticker in weights.tickers() {
            let what = format!("valuation ratios for {ticker}");
            let r = fetch_bounded(
                self.config.fetch_timeout,
                &what,
                self.source.valuation_ratios(ticker),
            )
            .await?;
            ratios.insert(ticker.clone(), r);
        }
        Ok(ratios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as Days, NaiveDate};
    use ndarray::Array2;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("offline")]
    struct Offline;

    struct Unreachable;

    impl MarketDataSource for Unreachable {
        type Error = Offline;

        async fn price_history(&self, _: &[String], _: usize) -> Result<PriceTable, Offline> {
            Err(Offline)
        }

        async fn valuation_ratios(&self, _: &str) -> Result<ValuationRatios, Offline> {
            Ok(ValuationRatios::new(Some(15.0), None))
        }
    }

    struct Slow;

    impl MarketDataSource for Slow {
        type Error = Offline;

        async fn price_history(&self, tickers: &[String], _: usize) -> Result<PriceTable, Offline> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PriceTable::empty(tickers))
        }

        async fn valuation_ratios(&self, _: &str) -> Result<ValuationRatios, Offline> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ValuationRatios::default())
        }
    }

    /// Each ratio lookup takes 20 seconds.
    struct Sluggish;

    impl MarketDataSource for Sluggish {
        type Error = Offline;

        async fn price_history(&self, _: &[String], _: usize) -> Result<PriceTable, Offline> {
            Err(Offline)
        }

        async fn valuation_ratios(&self, _: &str) -> Result<ValuationRatios, Offline> {
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(ValuationRatios::new(Some(20.0), None))
        }
    }

    struct Flat;

    impl MarketDataSource for Flat {
        type Error = Offline;

        async fn price_history(&self, tickers: &[String], days: usize) -> Result<PriceTable, Offline> {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            let dates = (0..days).map(|i| start + Days::days(i as i64)).collect();
            Ok(PriceTable::new(dates, tickers.to_vec(), Array2::from_elem((days, tickers.len()), 50.0)).unwrap())
        }

        async fn valuation_ratios(&self, _: &str) -> Result<ValuationRatios, Offline> {
            Ok(ValuationRatios::default())
        }
    }

    fn holdings() -> Holdings {
        Holdings::from_pairs([("AAPL", 6000.0), ("MSFT", 4000.0)]).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_failure_is_per_metric() {
        let engine = MetricsEngine::new(Unreachable);
        let metrics = engine.analyze(&holdings()).await;

        assert_eq!(metrics.volatility, Err(MetricError::DataUnavailable("offline".into())));
        assert_eq!(metrics.sharpe_ratio, Err(MetricError::DataUnavailable("offline".into())));
        assert_eq!(metrics.pe_ratio, Ok(15.0));
    }

    #[tokio::test]
    async fn test_empty_holdings_fail_every_metric() {
        let engine = MetricsEngine::new(Flat);
        let metrics = engine.analyze(&Holdings::new()).await;
        assert_eq!(metrics, PortfolioMetrics::failed(&MetricError::EmptyPortfolio));

        let periods = crate::period::parse_periods(&["1y", "1mo"]);
        let batch = engine.period_returns(&Holdings::new(), &periods).await;
        assert!(batch.iter().all(|e| e.result == Err(MetricError::EmptyPortfolio)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_unavailable() {
        let engine = MetricsEngine::new(Slow);
        let result = engine.volatility(&holdings()).await;
        assert!(matches!(result, Err(MetricError::DataUnavailable(_))));

        let result = engine.pe_ratio(&holdings()).await;
        assert!(matches!(result, Err(MetricError::DataUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ratio_timeout_applies_per_ticker() {
        let engine = MetricsEngine::new(Sluggish);
        let holdings =
            Holdings::from_pairs([("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)]).unwrap();

        assert_eq!(engine.pe_ratio(&holdings).await, Ok(20.0));
    }

    #[tokio::test]
    async fn test_flat_prices() {
        let engine = MetricsEngine::new(Flat);
        assert_eq!(engine.volatility(&holdings()).await, Ok(0.0));
        assert_eq!(engine.trailing_return(&holdings()).await, Ok(0.0));
        assert_eq!(engine.sharpe_ratio(&holdings()).await, Err(MetricError::UndefinedSharpe));
        assert_eq!(engine.pe_ratio(&holdings()).await, Err(MetricError::NoValidRatios));
    }

    #[tokio::test]
    async fn test_unresolved_history() {
        let config = EngineConfig {
            history: LookbackPeriod::parse("forever"),
            ..EngineConfig::default()
        };
        let engine = MetricsEngine::with_config(Flat, config);
        assert_eq!(
            engine.volatility(&holdings()).await,
            Err(MetricError::UnresolvedPeriod("forever".into()))
        );
    }
}
