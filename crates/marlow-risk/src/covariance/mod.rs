//! Return covariance estimation
//!
//! Estimates the covariance matrix of daily return series, the input to portfolio
//! volatility `sqrt(wᵀ Σ w)`.

pub mod sample;

pub use sample::SampleCovariance;

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors that can occur during covariance estimation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CovarianceError {
    /// A pair of series shares too few observations
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },
}

/// Trait for covariance matrix estimators
pub trait CovarianceEstimator {
    /// Estimate the covariance matrix from returns
    ///
    /// # Arguments
    /// * `returns` - Matrix where each row is a period and each column an instrument.
    ///   Missing observations are NaN.
    ///
    /// # Returns
    /// * Estimated covariance matrix (N x N where N is the number of columns)
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError>;
}

/// Portfolio variance `wᵀ Σ w`.
///
/// # Errors
/// [`CovarianceError::DimensionMismatch`] if `cov` is not square over `weights`.
pub fn portfolio_variance(
    cov: &Array2<f64>,
    weights: &Array1<f64>,
) -> Result<f64, CovarianceError> {
    let n = weights.len();
    if cov.nrows() != n {
        return Err(CovarianceError::DimensionMismatch {
            expected: n,
            actual: cov.nrows(),
        });
    }
    if cov.ncols() != n {
        return Err(CovarianceError::DimensionMismatch {
            expected: n,
            actual: cov.ncols(),
        });
    }

    Ok(weights.dot(&cov.dot(weights)))
}
