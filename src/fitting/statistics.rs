//! # Goodness-of-fit statistics
//!
//! One evaluator shared by every strategy, so chi-squared and R-squared
//! mean the same thing no matter how the fit was produced.
//!
//! Chi-squared uses the mask rule: entries with strictly positive sigma
//! contribute weighted terms; when no entry has a usable sigma the
//! unweighted sum of squared residuals is reported instead. Degenerate
//! outputs (NaN R-squared for constant data with an imperfect fit) are
//! valid results, never coerced.

use nalgebra::DVector;

#[derive(Clone, Debug, PartialEq)]
pub struct FitStatistics {
    pub chi2: f64,
    /// chi2 / (n - p); absent when the fit has no spare degrees of freedom.
    pub reduced_chi2: Option<f64>,
    pub r2: f64,
}

/// Evaluate goodness of fit for observed vs predicted values.
///
/// `n_params` is the number of fitted parameters, used only for the
/// reduced chi-squared degrees-of-freedom correction.
pub fn evaluate(
    y_obs: &DVector<f64>,
    y_pred: &DVector<f64>,
    sigma_y: Option<&DVector<f64>>,
    n_params: usize,
) -> FitStatistics {
    let chi2 = chi_squared(y_obs, y_pred, sigma_y);
    let n = y_obs.len();
    let reduced_chi2 = if n > n_params { Some(chi2 / (n - n_params) as f64) } else { None };
    FitStatistics { chi2, reduced_chi2, r2: r_squared(y_obs, y_pred) }
}

fn chi_squared(y_obs: &DVector<f64>, y_pred: &DVector<f64>, sigma_y: Option<&DVector<f64>>) -> f64 {
    if let Some(sigma) = sigma_y {
        if sigma.iter().any(|s| *s > 0.0) {
            return y_obs
                .iter()
                .zip(y_pred.iter())
                .zip(sigma.iter())
                .filter(|(_, s)| **s > 0.0)
                .map(|((yo, yp), s)| ((yo - yp) / s).powi(2))
                .sum();
        }
    }
    y_obs.iter().zip(y_pred.iter()).map(|(yo, yp)| (yo - yp).powi(2)).sum()
}

fn r_squared(y_obs: &DVector<f64>, y_pred: &DVector<f64>) -> f64 {
    let y_mean = y_obs.mean();
    let ss_tot: f64 = y_obs.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 =
        y_obs.iter().zip(y_pred.iter()).map(|(yo, yp)| (yo - yp).powi(2)).sum();
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        // Constant target predicted exactly.
        1.0
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_fit() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let stats = evaluate(&y, &y, None, 1);
        assert_eq!(stats.chi2, 0.0);
        assert_eq!(stats.r2, 1.0);
        assert_eq!(stats.reduced_chi2, Some(0.0));
    }

    #[test]
    fn test_perfect_fit_on_constant_target() {
        let y = DVector::from_vec(vec![5.0, 5.0, 5.0]);
        let stats = evaluate(&y, &y, None, 1);
        assert_eq!(stats.chi2, 0.0);
        assert_eq!(stats.r2, 1.0);
    }

    #[test]
    fn test_imperfect_fit_on_constant_target_is_nan() {
        let y = DVector::from_vec(vec![5.0, 5.0, 5.0]);
        let y_pred = DVector::from_vec(vec![5.0, 5.1, 5.0]);
        let stats = evaluate(&y, &y_pred, None, 1);
        assert!(stats.r2.is_nan());
    }

    #[test]
    fn test_weighted_chi_squared() {
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let y_pred = DVector::from_vec(vec![1.1, 1.8]);
        let sigma = DVector::from_vec(vec![0.1, 0.2]);
        let stats = evaluate(&y, &y_pred, Some(&sigma), 1);
        assert_relative_eq!(stats.chi2, 1.0 + 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_masked_entries_are_skipped() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let y_pred = DVector::from_vec(vec![1.1, 1.8, 100.0]);
        let sigma = DVector::from_vec(vec![0.1, 0.2, 0.0]);
        let stats = evaluate(&y, &y_pred, Some(&sigma), 1);
        // The zero-sigma third point contributes nothing.
        assert_relative_eq!(stats.chi2, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_all_zero_sigma_falls_back_to_unweighted() {
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let y_pred = DVector::from_vec(vec![0.0, 0.0]);
        let sigma = DVector::from_vec(vec![0.0, 0.0]);
        let stats = evaluate(&y, &y_pred, Some(&sigma), 1);
        assert_relative_eq!(stats.chi2, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reduced_chi2_requires_spare_dof() {
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let stats = evaluate(&y, &y, None, 2);
        assert_eq!(stats.reduced_chi2, None);
    }
}
