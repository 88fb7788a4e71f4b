//! Portfolio holdings: ticker to dollar amount.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors raised when building holdings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HoldingsError {
    /// Ticker was empty or contained whitespace.
    #[error("Invalid ticker: {0:?}")]
    InvalidTicker(String),

    /// Amount was zero, negative or not finite.
    #[error("Invalid amount for {ticker}: {amount} (must be a positive number)")]
    InvalidAmount {
        /// Ticker the amount was given for
        ticker: String,
        /// Rejected amount
        amount: f64,
    },
}

/// Ordered mapping from upper-cased ticker to a positive dollar amount.
///
/// Iteration order is insertion order. Inserting an existing ticker replaces its
/// amount in place. This order is the ticker ordering every derived weight vector
/// and price matrix is aligned to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdings {
    entries: Vec<(String, f64)>,
}

impl Holdings {
    /// Create empty holdings.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build holdings from `(ticker, amount)` pairs, in order.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, HoldingsError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut holdings = Self::new();
        for (ticker, amount) in pairs {
            holdings.insert(ticker.as_ref(), amount)?;
        }
        Ok(holdings)
    }

    /// Add or replace a holding. Returns the previous amount, if any.
    pub fn insert(&mut self, ticker: &str, amount: f64) -> Result<Option<f64>, HoldingsError> {
        let ticker = normalize_ticker(ticker)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(HoldingsError::InvalidAmount { ticker, amount });
        }

        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == ticker) {
            let previous = entry.1;
            entry.1 = amount;
            return Ok(Some(previous));
        }

        self.entries.push((ticker, amount));
        Ok(None)
    }

    /// Remove a holding, returning its amount.
    pub fn remove(&mut self, ticker: &str) -> Option<f64> {
        let ticker = ticker.trim().to_uppercase();
        let idx = self.entries.iter().position(|(t, _)| *t == ticker)?;
        Some(self.entries.remove(idx).1)
    }

    /// Amount held in a ticker (case-insensitive).
    pub fn get(&self, ticker: &str) -> Option<f64> {
        let ticker = ticker.trim().to_uppercase();
        self.entries
            .iter()
            .find(|(t, _)| *t == ticker)
            .map(|(_, amount)| *amount)
    }

    /// Tickers in holding order.
    pub fn tickers(&self) -> Vec<String> {
        self.entries.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Iterate `(ticker, amount)` in holding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(t, a)| (t.as_str(), *a))
    }

    /// Sum of all amounts.
    pub fn total_value(&self) -> f64 {
        self.entries.iter().map(|(_, a)| a).sum()
    }

    /// Number of holdings.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no holdings.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_ticker(ticker: &str) -> Result<String, HoldingsError> {
    let trimmed = ticker.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(HoldingsError::InvalidTicker(ticker.to_string()));
    }
    Ok(trimmed.to_uppercase())
}

impl Serialize for Holdings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (ticker, amount) in &self.entries {
            map.serialize_entry(ticker, amount)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Holdings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HoldingsVisitor;

        impl<'de> Visitor<'de> for HoldingsVisitor {
            type Value = Holdings;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of ticker to positive dollar amount")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Holdings, A::Error> {
                let mut holdings = Holdings::new();
                while let Some((ticker, amount)) = access.next_entry::<String, f64>()? {
                    holdings
                        .insert(&ticker, amount)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(holdings)
            }
        }

        deserializer.deserialize_map(HoldingsVisitor)
    }
}
