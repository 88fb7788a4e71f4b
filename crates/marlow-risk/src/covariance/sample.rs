//! Pairwise-complete sample covariance
//!
//! Each entry is the unbiased (ddof = 1) covariance of two return series over the
//! periods where both are present, scaled by an annualization factor:
//!
//! Cov(i,j) = k * Σ_t (r_i,t - r̄_i)(r_j,t - r̄_j) / (n_ij - 1)
//!
//! where the sum and the means run over the `n_ij` rows where both series are present.

use super::{CovarianceError, CovarianceEstimator};
use crate::period::TRADING_DAYS_PER_YEAR;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Sample covariance estimator over series with gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleCovariance {
    /// Multiplier applied to every entry (default: 252, daily to annual)
    pub annualization: f64,

    /// Minimum overlapping observations per pair (default: 2)
    pub min_observations: usize,
}

impl Default for SampleCovariance {
    fn default() -> Self {
        Self::annualized()
    }
}

impl SampleCovariance {
    /// Annualized daily covariance.
    pub const fn annualized() -> Self {
        Self {
            annualization: TRADING_DAYS_PER_YEAR as f64,
            min_observations: 2,
        }
    }

    /// Unscaled covariance.
    pub const fn unscaled() -> Self {
        Self {
            annualization: 1.0,
            min_observations: 2,
        }
    }

    fn pair(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Result<f64, CovarianceError> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = a
            .iter()
            .zip(b.iter())
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| (*x, *y))
            .unzip();

        let n = xs.len();
        let required = self.min_observations.max(2);
        if n < required {
            return Err(CovarianceError::InsufficientData {
                required,
                actual: n,
            });
        }

        let mean_x = xs.iter().sum::<f64>() / n as f64;
        let mean_y = ys.iter().sum::<f64>() / n as f64;
        let cross: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();

        Ok(cross / (n - 1) as f64 * self.annualization)
    }
}

impl CovarianceEstimator for SampleCovariance {
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError> {
        let n = returns.ncols();
        let mut cov = Array2::zeros((n, n));

        for i in 0..n {
            for j in i..n {
                let value = self.pair(returns.column(i), returns.column(j))?;
                cov[[i, j]] = value;
                cov[[j, i]] = value;
            }
        }

        Ok(cov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_unscaled_matches_textbook() {
        let returns = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let cov = SampleCovariance::unscaled().estimate(&returns).unwrap();

        // var(1,2,3,4) with ddof 1 = 5/3
        assert_abs_diff_eq!(cov[[0, 0]], 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[[1, 1]], 20.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[[0, 1]], 10.0 / 3.0, epsilon = 1e-12);
        assert_eq!(cov[[0, 1]], cov[[1, 0]]);
    }

    #[test]
    fn test_annualized_scales_by_trading_days() {
        let returns = array![[0.01], [-0.01], [0.02]];
        let raw = SampleCovariance::unscaled().estimate(&returns).unwrap();
        let annual = SampleCovariance::default().estimate(&returns).unwrap();
        assert_abs_diff_eq!(annual[[0, 0]], raw[[0, 0]] * 252.0, epsilon = 1e-15);
    }

    #[test]
    fn test_pairwise_uses_overlap_only() {
        let returns = array![
            [1.0, f64::NAN],
            [2.0, 1.0],
            [3.0, 2.0],
            [100.0, f64::NAN]
        ];
        let cov = SampleCovariance::unscaled().estimate(&returns).unwrap();

        // Overlap rows 1 and 2: x = (2, 3), y = (1, 2)
        assert_abs_diff_eq!(cov[[0, 1]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[[1, 1]], 0.5, epsilon = 1e-12);
        // Diagonal of the first column uses all four rows
        assert!(cov[[0, 0]] > 1000.0);
    }

    #[test]
    fn test_insufficient_overlap() {
        let returns = array![[0.01, f64::NAN], [0.02, 0.03], [f64::NAN, 0.01]];
        let result = SampleCovariance::default().estimate(&returns);
        assert_eq!(
            result,
            Err(CovarianceError::InsufficientData {
                required: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_random_matrix_is_symmetric_psd_diagonal() {
        let mut rng = StdRng::seed_from_u64(42);
        let returns = Array2::from_shape_fn((120, 5), |_| rng.gen_range(-0.05..0.05));
        let cov = SampleCovariance::default().estimate(&returns).unwrap();

        for i in 0..5 {
            assert!(cov[[i, i]] > 0.0);
            for j in 0..5 {
                assert_abs_diff_eq!(cov[[i, j]], cov[[j, i]], epsilon = 1e-15);
            }
        }
    }
}
