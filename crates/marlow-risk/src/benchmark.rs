//! Benchmark returns and portfolio-versus-benchmark comparison.
//!
//! The benchmark is treated as a one-instrument portfolio, so its period returns go
//! through exactly the same window formula as the portfolio's.

use crate::engine::{DEFAULT_BENCHMARK, DEFAULT_FETCH_TIMEOUT, fetch_bounded};
use crate::error::{MetricError, MetricResult};
use crate::metrics::{self, PeriodReturns};
use crate::period::{LookbackPeriod, max_days};
use crate::prices::PriceTable;
use crate::source::MarketDataSource;
use crate::weights::WeightVector;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Period returns of a single benchmark instrument over an already fetched table.
pub fn benchmark_period_returns(
    table: &PriceTable,
    ticker: &str,
    periods: &[LookbackPeriod],
) -> PeriodReturns {
    metrics::period_returns(table, &WeightVector::single(ticker), periods)
}

/// Fetches a benchmark's history once and evaluates every period against it.
#[derive(Debug, Clone)]
pub struct BenchmarkReturnFetcher<S> {
    source: S,
    ticker: String,
    timeout: Duration,
}

impl<S: MarketDataSource> BenchmarkReturnFetcher<S> {
    /// Fetcher for the given benchmark ticker.
    pub fn new(source: S, ticker: &str) -> Self {
        Self {
            source,
            ticker: ticker.trim().to_uppercase(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Fetcher for the default benchmark (VOO).
    pub fn with_default_benchmark(source: S) -> Self {
        Self::new(source, DEFAULT_BENCHMARK)
    }

    /// Bound the history request.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Benchmark ticker.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Benchmark returns for each period, in request order.
    pub async fn fetch(&self, periods: &[LookbackPeriod]) -> PeriodReturns {
        let days = max_days(periods);
        let tickers = [self.ticker.clone()];

        let table = if days == 0 {
            Ok(PriceTable::empty(&tickers))
        } else {
            fetch_bounded(
                self.timeout,
                "benchmark history",
                self.source.price_history(&tickers, days),
            )
            .await
        };

        match table {
            Ok(table) => benchmark_period_returns(&table, &self.ticker, periods),
            Err(e) => PeriodReturns::failed(periods, &e),
        }
    }
}

/// Portfolio and benchmark return for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    /// Period label
    pub label: String,
    /// Resolved trading days
    pub days: usize,
    /// Portfolio return
    pub portfolio: MetricResult,
    /// Benchmark return
    pub benchmark: MetricResult,
}

impl ComparisonRow {
    /// Portfolio minus benchmark, when both are available.
    pub fn excess_return(&self) -> Option<f64> {
        match (&self.portfolio, &self.benchmark) {
            (Ok(p), Ok(b)) => Some(p - b),
            _ => None,
        }
    }
}

/// Period-by-period comparison against a benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    /// Benchmark ticker
    pub benchmark: String,
    /// One row per portfolio period, in request order
    pub rows: Vec<ComparisonRow>,
}

impl PeriodComparison {
    /// Pair portfolio and benchmark results by label.
    pub fn new(benchmark: &str, portfolio: &PeriodReturns, benchmark_returns: &PeriodReturns) -> Self {
        let rows = portfolio
            .iter()
            .map(|entry| ComparisonRow {
                label: entry.label.clone(),
                days: entry.days,
                portfolio: entry.result.clone(),
                benchmark: benchmark_returns.get(&entry.label).map_or_else(
                    || {
                        Err(MetricError::DataUnavailable(format!(
                            "no benchmark result for {}",
                            entry.label
                        )))
                    },
                    |b| b.result.clone(),
                ),
            })
            .collect();

        Self {
            benchmark: benchmark.to_uppercase(),
            rows,
        }
    }

    /// Row for a label.
    pub fn get(&self, label: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PeriodReturn;
    use crate::period::parse_periods;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration as Days, NaiveDate};
    use ndarray::Array2;

    fn benchmark_table(closes: &[f64]) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceTable::new(
            (0..closes.len()).map(|i| start + Days::days(i as i64)).collect(),
            vec!["VOO".to_string()],
            Array2::from_shape_vec((closes.len(), 1), closes.to_vec()).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_benchmark_period_returns() {
        let closes: Vec<f64> = (0..25).map(|i| 400.0 + 4.0 * i as f64).collect();
        let table = benchmark_table(&closes);
        let periods = parse_periods(&["1mo", "1wk", "1y", "bad"]);

        let returns = benchmark_period_returns(&table, "voo", &periods);
        assert_abs_diff_eq!(
            returns.get("1mo").unwrap().value().unwrap(),
            496.0 / 416.0 - 1.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            returns.get("1wk").unwrap().value().unwrap(),
            496.0 / 480.0 - 1.0,
            epsilon = 1e-12
        );
        assert!(matches!(
            returns.get("1y").unwrap().result,
            Err(MetricError::InsufficientData { required: 252, actual: 25 })
        ));
        assert!(matches!(
            returns.get("bad").unwrap().result,
            Err(MetricError::UnresolvedPeriod(_))
        ));
    }

    #[test]
    fn test_comparison_excess_return() {
        let entry = |label: &str, result: MetricResult| PeriodReturn {
            label: label.to_string(),
            days: 5,
            result,
        };
        let portfolio = PeriodReturns {
            entries: vec![entry("1wk", Ok(0.05)), entry("1mo", Ok(0.02))],
        };
        let benchmark = PeriodReturns {
            entries: vec![entry("1wk", Ok(0.01)), entry("1mo", Err(MetricError::NoValidReturns))],
        };

        let comparison = PeriodComparison::new("voo", &portfolio, &benchmark);
        assert_eq!(comparison.benchmark, "VOO");
        assert_abs_diff_eq!(
            comparison.get("1wk").unwrap().excess_return().unwrap(),
            0.04,
            epsilon = 1e-12
        );
        assert!(comparison.get("1mo").unwrap().excess_return().is_none());
    }
}
