//! Normalized portfolio weights.

use crate::error::{MetricError, MetricResult};
use crate::holdings::Holdings;
use ndarray::Array1;

/// Portfolio weights aligned 1:1 with a ticker ordering.
///
/// Built from [`Holdings`] so the ordering is the holdings' iteration order. The same
/// ticker list must be used to fetch and align price data; a swapped ordering would
/// silently pair the wrong weight with each return series.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    tickers: Vec<String>,
    weights: Array1<f64>,
}

impl WeightVector {
    /// Build weights as each holding's share of total dollar value.
    ///
    /// # Errors
    /// [`MetricError::EmptyPortfolio`] if holdings are empty or total zero.
    pub fn build(holdings: &Holdings) -> MetricResult<Self> {
        let total = holdings.total_value();
        if holdings.is_empty() || total <= 0.0 {
            return Err(MetricError::EmptyPortfolio);
        }

        let (tickers, amounts): (Vec<String>, Vec<f64>) = holdings
            .iter()
            .map(|(ticker, amount)| (ticker.to_string(), amount))
            .unzip();

        Ok(Self {
            tickers,
            weights: Array1::from_vec(amounts) / total,
        })
    }

    /// Weight vector for a single instrument held at 100%.
    pub fn single(ticker: &str) -> Self {
        Self {
            tickers: vec![ticker.trim().to_uppercase()],
            weights: Array1::ones(1),
        }
    }

    /// Tickers in weight order.
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Weights as an ndarray vector.
    pub const fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Weight of a ticker, if present.
    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|idx| self.weights[idx])
    }

    /// Number of tickers.
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Iterate `(ticker, weight)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.tickers
            .iter()
            .zip(self.weights.iter())
            .map(|(t, w)| (t.as_str(), *w))
    }

    /// Fresh weight vector over the tickers for which `keep` holds, renormalized to
    /// sum to 1. Order is preserved. Returns `None` if nothing is kept.
    pub fn restrict<F>(&self, mut keep: F) -> Option<Self>
    where
        F: FnMut(&str) -> bool,
    {
        let (tickers, kept): (Vec<String>, Vec<f64>) = self
            .iter()
            .filter(|(ticker, _)| keep(ticker))
            .map(|(ticker, weight)| (ticker.to_string(), weight))
            .unzip();

        let total: f64 = kept.iter().sum();
        if tickers.is_empty() || total <= 0.0 {
            return None;
        }

        Some(Self {
            tickers,
            weights: Array1::from_vec(kept) / total,
        })
    }

    /// Weighted average of per-ticker values, excluding tickers whose value is `None`
    /// and renormalizing over the rest. `values` must be aligned with [`Self::tickers`];
    /// a length mismatch gives `None`.
    pub fn weighted_average(&self, values: &[Option<f64>]) -> Option<f64> {
        if values.len() != self.len() {
            return None;
        }

        let valid = self.restrict({
            let mut idx = 0;
            move |_| {
                let keep = values.get(idx).is_some_and(Option::is_some);
                idx += 1;
                keep
            }
        })?;

        let present: Array1<f64> = values.iter().flatten().copied().collect();
        Some(valid.weights.dot(&present))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_build_weights() {
        let holdings = Holdings::from_pairs([("A", 6000.0), ("B", 4000.0)]).unwrap();
        let weights = WeightVector::build(&holdings).unwrap();

        assert_eq!(weights.tickers(), ["A", "B"]);
        assert_abs_diff_eq!(weights.weights()[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.weights()[1], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_holdings() {
        let result = WeightVector::build(&Holdings::new());
        assert_eq!(result, Err(MetricError::EmptyPortfolio));
    }

    #[test]
    fn test_weights_sum_to_one_for_random_holdings() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let n = rng.gen_range(1..30);
            let pairs: Vec<(String, f64)> = (0..n)
                .map(|i| (format!("T{i}"), rng.gen_range(0.01..1_000_000.0)))
                .collect();
            let holdings = Holdings::from_pairs(pairs).unwrap();
            let weights = WeightVector::build(&holdings).unwrap();

            assert_abs_diff_eq!(weights.weights().sum(), 1.0, epsilon = 1e-9);
            assert!(weights.weights().iter().all(|w| *w > 0.0));
        }
    }

    #[test]
    fn test_restrict_renormalizes_without_mutating() {
        let holdings = Holdings::from_pairs([("A", 5000.0), ("B", 3000.0), ("C", 2000.0)]).unwrap();
        let weights = WeightVector::build(&holdings).unwrap();

        let subset = weights.restrict(|t| t != "B").unwrap();
        assert_eq!(subset.tickers(), ["A", "C"]);
        assert_abs_diff_eq!(subset.weights()[0], 5.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(subset.weights()[1], 2.0 / 7.0, epsilon = 1e-12);

        assert_eq!(weights.len(), 3);
        assert!(weights.restrict(|_| false).is_none());
    }

    #[test]
    fn test_weighted_average_skips_missing() {
        let holdings = Holdings::from_pairs([("A", 5000.0), ("B", 5000.0)]).unwrap();
        let weights = WeightVector::build(&holdings).unwrap();

        let avg = weights.weighted_average(&[Some(0.10), None]).unwrap();
        assert_abs_diff_eq!(avg, 0.10, epsilon = 1e-12);

        let avg = weights.weighted_average(&[Some(0.10), Some(0.30)]).unwrap();
        assert_abs_diff_eq!(avg, 0.20, epsilon = 1e-12);

        assert!(weights.weighted_average(&[None, None]).is_none());
    }

    #[test]
    fn test_weighted_average_rejects_misaligned_values() {
        let holdings = Holdings::from_pairs([("A", 5000.0), ("B", 5000.0)]).unwrap();
        let weights = WeightVector::build(&holdings).unwrap();

        assert!(weights.weighted_average(&[Some(0.1), Some(0.2), Some(0.3)]).is_none());
        assert!(weights.weighted_average(&[Some(0.1)]).is_none());
    }

    #[test]
    fn test_single() {
        let weights = WeightVector::single("voo");
        assert_eq!(weights.tickers(), ["VOO"]);
        assert_eq!(weights.weight_of("VOO"), Some(1.0));
    }
}
