//! # Fit results
//!
//! Every strategy produces a [`FitResult`] with the same shape: fitted
//! parameter vector, 1-sigma uncertainties, covariance matrix and the
//! method that actually ran (after any documented fallback). Sampling
//! strategies (bootstrap, Bayesian) additionally carry their parameter
//! samples and 95 % intervals.

use nalgebra::{DMatrix, DVector};

use crate::fitting::dispatcher::FitMethod;

/// Parameter samples and percentile intervals from a sampling strategy.
#[derive(Clone, Debug)]
pub struct SampleExtras {
    /// One row per sample, one column per parameter.
    pub samples: DMatrix<f64>,
    /// 2.5 % percentile per parameter.
    pub lower: DVector<f64>,
    /// 97.5 % percentile per parameter.
    pub upper: DVector<f64>,
}

#[derive(Clone, Debug)]
pub struct FitResult {
    /// Fitted parameter vector, in sorted-parameter order.
    pub beta: DVector<f64>,
    /// 1-sigma parameter uncertainties; all-zero when the covariance is
    /// degenerate or the strategy provides none.
    pub sd_beta: DVector<f64>,
    /// Parameter covariance matrix; zero-filled on degeneracy.
    pub cov_beta: DMatrix<f64>,
    /// The strategy that actually produced `beta` (fallbacks included).
    pub method: FitMethod,
    /// Parameter samples for bootstrap/Bayesian fits.
    pub extras: Option<SampleExtras>,
}

impl FitResult {
    /// Result backed by a covariance matrix; uncertainties are the square
    /// roots of the diagonal when the matrix is finite and not all zero.
    pub fn from_covariance(beta: DVector<f64>, cov: DMatrix<f64>, method: FitMethod) -> Self {
        let p = beta.len();
        let usable = cov.iter().all(|v| v.is_finite()) && cov.iter().any(|v| *v != 0.0);
        let sd_beta = if usable {
            DVector::from_fn(p, |i, _| cov[(i, i)].max(0.0).sqrt())
        } else {
            DVector::zeros(p)
        };
        let cov_beta = if usable { cov } else { DMatrix::zeros(p, p) };
        FitResult { beta, sd_beta, cov_beta, method, extras: None }
    }

    /// Result with no uncertainty information at all.
    pub fn degenerate(beta: DVector<f64>, method: FitMethod) -> Self {
        let p = beta.len();
        FitResult {
            beta,
            sd_beta: DVector::zeros(p),
            cov_beta: DMatrix::zeros(p, p),
            method,
            extras: None,
        }
    }

    /// Result derived from parameter samples: uncertainties are the
    /// per-parameter sample standard deviation, the covariance is the
    /// sample covariance, and the extras carry 95 % intervals.
    pub fn from_samples(beta: DVector<f64>, samples: DMatrix<f64>, method: FitMethod) -> Self {
        let p = beta.len();
        let n = samples.nrows();
        if n < 2 {
            return Self::degenerate(beta, method);
        }
        let means = DVector::from_fn(p, |k, _| samples.column(k).mean());
        let mut cov = DMatrix::zeros(p, p);
        for i in 0..p {
            for j in 0..p {
                let mut acc = 0.0;
                for s in 0..n {
                    acc += (samples[(s, i)] - means[i]) * (samples[(s, j)] - means[j]);
                }
                cov[(i, j)] = acc / (n - 1) as f64;
            }
        }
        let sd_beta = DVector::from_fn(p, |i, _| cov[(i, i)].max(0.0).sqrt());
        let lower = DVector::from_fn(p, |k, _| {
            percentile(&samples.column(k).iter().copied().collect::<Vec<_>>(), 2.5)
        });
        let upper = DVector::from_fn(p, |k, _| {
            percentile(&samples.column(k).iter().copied().collect::<Vec<_>>(), 97.5)
        });
        FitResult {
            beta,
            sd_beta,
            cov_beta: cov,
            method,
            extras: Some(SampleExtras { samples, lower, upper }),
        }
    }
}

/// Linear-interpolated percentile of an unsorted slice, q in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sd_from_covariance_diagonal() {
        let beta = DVector::from_vec(vec![1.0, 2.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.09]);
        let result = FitResult::from_covariance(beta, cov, FitMethod::LeastSquares);
        assert_relative_eq!(result.sd_beta[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(result.sd_beta[1], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_nonfinite_covariance_zeroed() {
        let beta = DVector::from_vec(vec![1.0]);
        let cov = DMatrix::from_element(1, 1, f64::INFINITY);
        let result = FitResult::from_covariance(beta, cov, FitMethod::LeastSquares);
        assert_eq!(result.sd_beta[0], 0.0);
        assert_eq!(result.cov_beta[(0, 0)], 0.0);
    }

    #[test]
    fn test_sample_statistics() {
        let beta = DVector::from_vec(vec![0.0]);
        // Samples 0..100 -> mean 49.5, symmetric percentiles.
        let samples = DMatrix::from_fn(100, 1, |i, _| i as f64);
        let result = FitResult::from_samples(beta, samples, FitMethod::Bootstrap);
        let extras = result.extras.as_ref().unwrap();
        assert_relative_eq!(extras.lower[0], 2.475, epsilon = 1e-9);
        assert_relative_eq!(extras.upper[0], 96.525, epsilon = 1e-9);
        assert!(result.sd_beta[0] > 28.0 && result.sd_beta[0] < 30.0);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&values, 0.0), 1.0);
        assert_relative_eq!(percentile(&values, 100.0), 4.0);
        assert_relative_eq!(percentile(&values, 50.0), 2.5);
    }
}
