//! # Regularized regression (ridge / lasso)
//!
//! The regularized solvers operate on linear bases, so the nonlinear
//! model is approximated by a polynomial feature expansion of degree
//! `min(3, parameter_count)` without a bias column — an explicit,
//! documented approximation, not an exact fit of the user's model.
//! Coefficients are truncated or zero-padded to the declared parameter
//! count. Ridge solves the closed-form damped normal equations; lasso
//! runs coordinate descent with soft thresholding. A solver failure falls
//! back to plain least squares on the true model.

use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::fitting::data::Dataset;
use crate::fitting::dispatcher::FitMethod;
use crate::fitting::error::FitError;
use crate::fitting::least_squares::least_squares_fit;
use crate::fitting::model::NumericModel;
use crate::fitting::result::FitResult;
use crate::numerical::lm::FitProgress;

const LASSO_TOLERANCE: f64 = 1e-8;

/// Powers `x, x^2, ..., x^degree` as columns (no bias column).
pub(crate) fn polynomial_features(x: &DVector<f64>, degree: usize) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), degree, |i, k| x[i].powi(k as i32 + 1))
}

pub(crate) fn feature_degree(n_params: usize) -> usize {
    n_params.clamp(1, 3)
}

/// Pad with zeros or truncate so the coefficient vector matches the
/// declared parameter count.
pub(crate) fn fit_to_length(coeffs: &DVector<f64>, n_params: usize) -> DVector<f64> {
    DVector::from_fn(n_params, |i, _| if i < coeffs.len() { coeffs[i] } else { 0.0 })
}

pub fn ridge_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    alpha: f64,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    match ridge_coefficients(dataset, initial.len(), alpha) {
        Ok(beta) => Ok(FitResult::degenerate(beta, FitMethod::Ridge)),
        Err(err) => {
            warn!("ridge regression failed ({}), falling back to least squares", err);
            least_squares_fit(dataset, model, initial, max_iter, progress)
        }
    }
}

pub fn lasso_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    alpha: f64,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    match lasso_coefficients(dataset, initial.len(), alpha, max_iter) {
        Ok(beta) => Ok(FitResult::degenerate(beta, FitMethod::Lasso)),
        Err(err) => {
            warn!("lasso regression failed ({}), falling back to least squares", err);
            least_squares_fit(dataset, model, initial, max_iter, progress)
        }
    }
}

fn ridge_coefficients(
    dataset: &Dataset,
    n_params: usize,
    alpha: f64,
) -> Result<DVector<f64>, FitError> {
    let degree = feature_degree(n_params);
    let features = polynomial_features(&dataset.x, degree);
    // (XtX + alpha*I) beta = Xt y
    let mut lhs = features.transpose() * &features;
    for i in 0..degree {
        lhs[(i, i)] += alpha;
    }
    let rhs = features.transpose() * &dataset.y;
    let coeffs = lhs
        .lu()
        .solve(&rhs)
        .ok_or_else(|| FitError::FittingFailure("singular ridge system".to_string()))?;
    if !coeffs.iter().all(|c| c.is_finite()) {
        return Err(FitError::FittingFailure("non-finite ridge coefficients".to_string()));
    }
    Ok(fit_to_length(&coeffs, n_params))
}

/// Coordinate descent on `1/(2n) ||y - X b||^2 + alpha ||b||_1`.
fn lasso_coefficients(
    dataset: &Dataset,
    n_params: usize,
    alpha: f64,
    max_iter: usize,
) -> Result<DVector<f64>, FitError> {
    let degree = feature_degree(n_params);
    let features = polynomial_features(&dataset.x, degree);
    let n = dataset.len() as f64;
    let col_norms: Vec<f64> =
        (0..degree).map(|k| features.column(k).dot(&features.column(k)) / n).collect();
    if col_norms.iter().all(|c| *c <= 0.0) {
        return Err(FitError::FittingFailure("all-zero lasso design".to_string()));
    }

    let mut beta = DVector::zeros(degree);
    let mut residual = dataset.y.clone();
    for _ in 0..max_iter.max(1) {
        let mut max_shift: f64 = 0.0;
        for k in 0..degree {
            if col_norms[k] <= 0.0 {
                continue;
            }
            let column = features.column(k);
            // Partial residual correlation with coordinate k.
            let rho = (column.dot(&residual) + beta[k] * col_norms[k] * n) / n;
            let new_beta = soft_threshold(rho, alpha) / col_norms[k];
            let shift = new_beta - beta[k];
            if shift != 0.0 {
                residual -= column * shift;
                beta[k] = new_beta;
                max_shift = max_shift.max(shift.abs());
            }
        }
        if max_shift < LASSO_TOLERANCE {
            break;
        }
    }
    if !beta.iter().all(|c| c.is_finite()) {
        return Err(FitError::FittingFailure("non-finite lasso coefficients".to_string()));
    }
    Ok(fit_to_length(&beta, n_params))
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Prediction helper for the statistics pass: the true model when it is
/// finite at the coefficients, otherwise the polynomial expansion the
/// solver actually fitted.
pub(crate) fn regularized_prediction(
    dataset: &Dataset,
    model: &NumericModel,
    beta: &DVector<f64>,
) -> DVector<f64> {
    let prediction = model.eval(beta.as_slice(), &dataset.x);
    if prediction.iter().all(|v| v.is_finite()) {
        return prediction;
    }
    let degree = feature_degree(beta.len());
    let features = polynomial_features(&dataset.x, degree);
    let coeffs = DVector::from_fn(degree, |k, _| if k < beta.len() { beta[k] } else { 0.0 });
    features * coeffs
}
