//! # Least squares strategies
//!
//! Ordinary and weighted nonlinear least squares on top of the
//! Levenberg-Marquardt routine, with the analytic Jacobian from the model
//! compiler. Weighted mode accepts arbitrary caller weights and converts
//! them to an equivalent sigma, reusing the same code path with
//! absolute-sigma semantics.

use nalgebra::DVector;

use crate::fitting::data::{Dataset, weights_from_sigma};
use crate::fitting::dispatcher::FitMethod;
use crate::fitting::error::FitError;
use crate::fitting::model::NumericModel;
use crate::fitting::result::FitResult;
use crate::numerical::lm::{FitProgress, LevenbergMarquardt, LmReport};

/// Shared Levenberg-Marquardt driver used by every nonlinear strategy.
pub(crate) fn lm_fit(
    model: &NumericModel,
    x: &DVector<f64>,
    y: &DVector<f64>,
    weight: Option<&DVector<f64>>,
    initial: &DVector<f64>,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<LmReport, FitError> {
    let mut lm = LevenbergMarquardt::new().with_max_evals(max_iter.max(1));
    if let Some(progress) = progress {
        lm = lm.with_progress(progress);
    }
    let func = |beta: &DVector<f64>| model.eval(beta.as_slice(), x);
    let jac = |beta: &DVector<f64>| model.jacobian(beta.as_slice(), x);
    let report =
        lm.minimize(func, jac, y, weight, initial).map_err(FitError::FittingFailure)?;
    if !report.converged {
        return Err(FitError::FittingFailure(format!(
            "optimizer did not converge within {} evaluations",
            max_iter
        )));
    }
    Ok(report)
}

/// Ordinary least squares; weighted by `1/sigma_y^2` when uncertainties
/// are present, silently unweighted otherwise.
pub fn least_squares_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    let weight = weights_from_sigma(dataset.sigma_y.as_ref());
    let report =
        lm_fit(model, &dataset.x, &dataset.y, weight.as_ref(), initial, max_iter, progress)?;
    Ok(FitResult::from_covariance(report.beta, report.cov, FitMethod::LeastSquares))
}

/// Weighted least squares with explicit caller weights. Weights are
/// converted to `sigma = 1/sqrt(|w| + 1e-10)` so zero or negative entries
/// cannot divide by zero, then fitted with absolute-sigma semantics.
pub fn weighted_least_squares_fit(
    dataset: &Dataset,
    model: &NumericModel,
    weights: &DVector<f64>,
    initial: &DVector<f64>,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    if weights.len() != dataset.len() {
        return Err(FitError::InvalidInput(format!(
            "{} weights for {} data points",
            weights.len(),
            dataset.len()
        )));
    }
    let sigma = weights.map(|w| 1.0 / (w.abs() + 1e-10).sqrt());
    let weight = sigma.map(|s| 1.0 / (s * s));
    let report =
        lm_fit(model, &dataset.x, &dataset.y, Some(&weight), initial, max_iter, progress)?;
    Ok(FitResult::from_covariance(report.beta, report.cov, FitMethod::WeightedLeastSquares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::model::ModelCompiler;
    use approx::assert_relative_eq;

    fn linear_model() -> (ModelCompiler, Vec<String>) {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("a*x+b").unwrap();
        (compiler, params)
    }

    #[test]
    fn test_recovers_line() {
        let (compiler, params) = linear_model();
        let model = compiler.create_model("a*x+b", &params).unwrap();
        let dataset = Dataset::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![],
            vec![2.1, 4.0, 6.2, 7.9, 10.1],
            vec![0.1; 5],
        )
        .unwrap();
        let result = least_squares_fit(
            &dataset,
            &model,
            &DVector::from_vec(vec![1.0, 0.0]),
            1000,
            None,
        )
        .unwrap();
        assert_relative_eq!(result.beta[0], 2.0, epsilon = 0.2);
        assert_relative_eq!(result.beta[1], 0.0, epsilon = 0.2);
        assert!(result.sd_beta.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_zero_sigma_matches_absent_sigma() {
        let (compiler, params) = linear_model();
        let model = compiler.create_model("a*x+b", &params).unwrap();
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![1.9, 4.1, 6.0, 8.2];
        let with_zeros =
            Dataset::new(x.clone(), vec![], y.clone(), vec![0.0; 4]).unwrap();
        let without = Dataset::from_xy(x, y).unwrap();
        let guess = DVector::from_vec(vec![1.0, 0.0]);
        let a = least_squares_fit(&with_zeros, &model, &guess, 1000, None).unwrap();
        let b = least_squares_fit(&without, &model, &guess, 1000, None).unwrap();
        assert_relative_eq!(a.beta[0], b.beta[0], epsilon = 1e-10);
        assert_relative_eq!(a.beta[1], b.beta[1], epsilon = 1e-10);
    }

    #[test]
    fn test_weighted_fit_handles_zero_weights() {
        let (compiler, params) = linear_model();
        let model = compiler.create_model("a*x+b", &params).unwrap();
        let dataset =
            Dataset::from_xy(vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 4.0, 6.0, 8.0]).unwrap();
        let weights = DVector::from_vec(vec![1.0, 0.0, 1.0, 1.0]);
        let result = weighted_least_squares_fit(
            &dataset,
            &model,
            &weights,
            &DVector::from_vec(vec![1.0, 1.0]),
            1000,
            None,
        )
        .unwrap();
        assert_relative_eq!(result.beta[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.beta[1], 0.0, epsilon = 1e-3);
    }
}
