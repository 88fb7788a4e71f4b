//! Portfolio metrics over an already fetched price table.
//!
//! Every function here is pure and synchronous. Tickers are aligned to the weight
//! vector's ordering with [`PriceTable::select`] before any arithmetic, so the table may
//! carry extra columns or miss some tickers entirely.
//!
//! - Volatility: `σ_p = sqrt(wᵀ Σ w)` with Σ the annualized pairwise covariance of daily
//!   returns
//! - Weighted P/E: `Σ w_i · PE_i` over tickers with a usable ratio, weights renormalized
//! - Window return: `Σ w_i · (P_last - P_first) / P_first` over the trailing window,
//!   weights renormalized over tickers with data
//! - Sharpe: `(Σ w_i · mean(r_i) · 252 - r_f) / σ_p`

use crate::covariance::{CovarianceError, CovarianceEstimator, SampleCovariance, portfolio_variance};
use crate::error::{MetricError, MetricResult};
use crate::period::{LookbackPeriod, TRADING_DAYS_PER_YEAR};
use crate::prices::PriceTable;
use crate::source::ValuationRatios;
use crate::weights::WeightVector;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default annual risk-free rate for the Sharpe ratio.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.01;

impl From<CovarianceError> for MetricError {
    fn from(err: CovarianceError) -> Self {
        match err {
            CovarianceError::InsufficientData { required, actual } => {
                Self::InsufficientData { required, actual }
            }
            CovarianceError::DimensionMismatch { expected, actual } => Self::InsufficientData {
                required: expected,
                actual,
            },
        }
    }
}

/// Annualized portfolio volatility.
///
/// # Errors
/// [`MetricError::InsufficientData`] if any pair of tickers shares fewer than two
/// daily return observations.
pub fn portfolio_volatility(table: &PriceTable, weights: &WeightVector) -> MetricResult {
    if weights.is_empty() {
        return Err(MetricError::EmptyPortfolio);
    }

    let returns = table.select(weights.tickers()).daily_returns();
    let cov = SampleCovariance::annualized().estimate(&returns)?;
    let variance = portfolio_variance(&cov, weights.weights())?;

    // Round-off can push a near-zero variance slightly negative.
    Ok(variance.max(0.0).sqrt())
}

/// Weighted average P/E, preferring forward over trailing ratios.
///
/// # Errors
/// [`MetricError::NoValidRatios`] if no ticker has a usable ratio.
pub fn weighted_pe_ratio(
    weights: &WeightVector,
    ratios: &HashMap<String, ValuationRatios>,
) -> MetricResult {
    let values: Vec<Option<f64>> = weights
        .tickers()
        .iter()
        .map(|ticker| ratios.get(ticker).and_then(ValuationRatios::preferred))
        .collect();

    weights
        .weighted_average(&values)
        .ok_or(MetricError::NoValidRatios)
}

/// Weighted simple return over the trailing `days` rows of the table.
///
/// A table shorter than `days` is used whole.
///
/// # Errors
/// [`MetricError::UnresolvedPeriod`] if `days` is 0, [`MetricError::NoValidReturns`]
/// if no ticker has a usable first and last close in the window.
pub fn window_return(table: &PriceTable, weights: &WeightVector, days: usize) -> MetricResult {
    if days == 0 {
        return Err(MetricError::UnresolvedPeriod("0d".to_string()));
    }

    let window = table.tail(days);
    let returns: Vec<Option<f64>> = weights
        .tickers()
        .iter()
        .map(|ticker| window.series(ticker).simple_return())
        .collect();

    weights
        .weighted_average(&returns)
        .ok_or(MetricError::NoValidReturns)
}

/// Weighted mean daily return, annualized by 252.
///
/// # Errors
/// [`MetricError::NoValidReturns`] if no ticker has a daily return.
pub fn annualized_return(table: &PriceTable, weights: &WeightVector) -> MetricResult {
    let returns = table.select(weights.tickers()).daily_returns();

    let means: Vec<Option<f64>> = returns
        .axis_iter(Axis(1))
        .map(|col| {
            let present: Vec<f64> = col.iter().copied().filter(|r| r.is_finite()).collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        })
        .collect();

    let mean = weights
        .weighted_average(&means)
        .ok_or(MetricError::NoValidReturns)?;
    Ok(mean * TRADING_DAYS_PER_YEAR as f64)
}

/// Sharpe ratio with the given annual risk-free rate.
///
/// # Errors
/// Volatility errors propagate; [`MetricError::UndefinedSharpe`] if volatility is 0.
pub fn sharpe_ratio(table: &PriceTable, weights: &WeightVector, risk_free_rate: f64) -> MetricResult {
    let volatility = portfolio_volatility(table, weights)?;
    if volatility == 0.0 {
        return Err(MetricError::UndefinedSharpe);
    }

    let annual = annualized_return(table, weights)?;
    Ok((annual - risk_free_rate) / volatility)
}

/// Return of one lookback period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    /// Period label as requested
    pub label: String,
    /// Resolved trading days, 0 if unresolved
    pub days: usize,
    /// Weighted return or the reason it is unavailable
    pub result: MetricResult,
}

impl PeriodReturn {
    /// The return, if available.
    pub fn value(&self) -> Option<f64> {
        self.result.as_ref().ok().copied()
    }
}

/// Returns for a batch of periods, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturns {
    /// One entry per requested period
    pub entries: Vec<PeriodReturn>,
}

impl PeriodReturns {
    /// Every period failing with the same error.
    pub fn failed(periods: &[LookbackPeriod], err: &MetricError) -> Self {
        Self {
            entries: periods
                .iter()
                .map(|p| PeriodReturn {
                    label: p.label().to_string(),
                    days: p.days(),
                    result: Err(err.clone()),
                })
                .collect(),
        }
    }

    /// Entry for a label.
    pub fn get(&self, label: &str) -> Option<&PeriodReturn> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Iterate entries in request order.
    pub fn iter(&self) -> impl Iterator<Item = &PeriodReturn> + '_ {
        self.entries.iter()
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no periods were requested.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Evaluate several lookback periods against one price table.
///
/// Each period fails on its own: an unresolved label gives
/// [`MetricError::UnresolvedPeriod`], a period longer than the table gives
/// [`MetricError::InsufficientData`].
pub fn period_returns(
    table: &PriceTable,
    weights: &WeightVector,
    periods: &[LookbackPeriod],
) -> PeriodReturns {
    let rows = table.len();

    let entries = periods
        .iter()
        .map(|period| {
            let result = match period.days() {
                0 => Err(MetricError::UnresolvedPeriod(period.label().to_string())),
                days if days > rows => Err(MetricError::InsufficientData {
                    required: days,
                    actual: rows,
                }),
                days => window_return(table, weights, days),
            };

            PeriodReturn {
                label: period.label().to_string(),
                days: period.days(),
                result,
            }
        })
        .collect();

    PeriodReturns { entries }
}

/// The four headline metrics of a portfolio, each failing independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Annualized volatility
    pub volatility: MetricResult,
    /// Weighted P/E
    pub pe_ratio: MetricResult,
    /// Weighted return over the history window
    pub trailing_return: MetricResult,
    /// Sharpe ratio
    pub sharpe_ratio: MetricResult,
}

impl PortfolioMetrics {
    /// All four metrics failing with the same error.
    pub fn failed(err: &MetricError) -> Self {
        Self {
            volatility: Err(err.clone()),
            pe_ratio: Err(err.clone()),
            trailing_return: Err(err.clone()),
            sharpe_ratio: Err(err.clone()),
        }
    }
}
