//! Holdings and period arguments from the command line.

use marlow::load_holdings;
use marlow_risk::{Holdings, HoldingsError};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum InputError {
    #[error("Expected TICKER=AMOUNT, got {0:?}")]
    Malformed(String),

    #[error("Invalid amount in {arg:?}: {reason}")]
    Amount { arg: String, reason: String },

    #[error(transparent)]
    Holdings(#[from] HoldingsError),

    #[error("Could not read holdings file: {0}")]
    File(#[from] marlow::ConfigError),

    #[error("No holdings given; pass TICKER=AMOUNT arguments or --holdings FILE")]
    Empty,
}

/// Parse one `TICKER=AMOUNT` argument. `TICKER:AMOUNT` is accepted too; amounts may
/// carry a leading `$` and thousands separators.
pub(crate) fn parse_holding(arg: &str) -> Result<(String, f64), InputError> {
    let (ticker, amount) = arg
        .split_once('=')
        .or_else(|| arg.split_once(':'))
        .ok_or_else(|| InputError::Malformed(arg.to_string()))?;

    let cleaned: String = amount
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    let amount = cleaned.parse::<f64>().map_err(|e| InputError::Amount {
        arg: arg.to_string(),
        reason: e.to_string(),
    })?;

    Ok((ticker.trim().to_string(), amount))
}

/// Holdings from an optional JSON file, then positional arguments on top.
///
/// A ticker given in both places takes the argument's amount.
pub(crate) fn collect_holdings(
    file: Option<&Path>,
    args: &[String],
) -> Result<Holdings, InputError> {
    let mut holdings = match file {
        Some(path) => load_holdings(path)?,
        None => Holdings::new(),
    };

    for arg in args {
        let (ticker, amount) = parse_holding(arg)?;
        holdings.insert(&ticker, amount)?;
    }

    if holdings.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(holdings)
}

/// Split comma-separated period lists, e.g. `--periods 1y,6mo --periods 1wk`.
pub(crate) fn split_periods(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
