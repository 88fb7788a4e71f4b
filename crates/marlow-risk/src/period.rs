//! Lookback period resolution.
//!
//! Period labels follow the `<count><unit>` convention used by market data
//! front-ends: `1y`, `6mo`, `2wk`, `10d`. Each unit maps to a fixed number of
//! trading days.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading days in a year; also the annualization factor for daily statistics.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Trading days in a month.
pub const TRADING_DAYS_PER_MONTH: usize = 21;

/// Trading days in a week.
pub const TRADING_DAYS_PER_WEEK: usize = 5;

/// Period ladder shown by the dashboard, longest first.
pub const DEFAULT_PERIODS: [&str; 7] = ["10y", "5y", "1y", "6mo", "3mo", "1mo", "1wk"];

// Longer suffixes first so "mo" and "wk" are not mistaken for other units.
const UNITS: [(&str, usize); 4] = [
    ("mo", TRADING_DAYS_PER_MONTH),
    ("wk", TRADING_DAYS_PER_WEEK),
    ("y", TRADING_DAYS_PER_YEAR),
    ("d", 1),
];

/// Resolve a period label to a count of trading days.
///
/// Returns 0 for an unknown unit, a missing or malformed count, or a count that
/// would overflow. Callers treat 0 as a period that cannot be satisfied.
///
/// # Examples
///
/// ```
/// use marlow_risk::period::resolve_period;
///
/// assert_eq!(resolve_period("2y"), 504);
/// assert_eq!(resolve_period("3mo"), 63);
/// assert_eq!(resolve_period("bogus"), 0);
/// ```
pub fn resolve_period(label: &str) -> usize {
    let label = label.trim().to_ascii_lowercase();

    UNITS
        .iter()
        .find_map(|(suffix, base)| {
            let count = label.strip_suffix(suffix)?;
            if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
                return Some(0);
            }
            Some(
                count
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_mul(*base))
                    .unwrap_or(0),
            )
        })
        .unwrap_or(0)
}

/// A period label paired with its resolved trading-day count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookbackPeriod {
    label: String,
    days: usize,
}

impl LookbackPeriod {
    /// Parse a label. Unresolvable labels are kept with a day count of 0.
    pub fn parse(label: &str) -> Self {
        Self {
            label: label.trim().to_string(),
            days: resolve_period(label),
        }
    }

    /// The label as given (trimmed).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Trading days covered; 0 if the label did not resolve.
    pub const fn days(&self) -> usize {
        self.days
    }

    /// Whether the label resolved to a positive day count.
    pub const fn is_resolved(&self) -> bool {
        self.days > 0
    }
}

impl fmt::Display for LookbackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} trading days)", self.label, self.days)
    }
}

/// Parse a list of labels, preserving order.
pub fn parse_periods<S: AsRef<str>>(labels: &[S]) -> Vec<LookbackPeriod> {
    labels
        .iter()
        .map(|label| LookbackPeriod::parse(label.as_ref()))
        .collect()
}

/// Largest resolved day count in a batch, 0 if none resolved.
pub fn max_days(periods: &[LookbackPeriod]) -> usize {
    periods.iter().map(LookbackPeriod::days).max().unwrap_or(0)
}
