//! # Approximate Bayesian regression
//!
//! Bayesian ridge on the polynomial feature basis, fitted by the
//! evidence approximation (iterated noise/weight precision updates).
//! Posterior parameter samples are drawn from the learned covariance via
//! Cholesky; when that decomposition fails, an ad-hoc normal
//! approximation around the point estimate with 10 % relative spread is
//! used instead. Both are explicit approximations for nonlinear models.
//! If the regression itself fails, the strategy falls back to bootstrap
//! entirely and the result is tagged accordingly.

use log::warn;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::fitting::bootstrap::bootstrap_fit;
use crate::fitting::data::Dataset;
use crate::fitting::dispatcher::FitMethod;
use crate::fitting::error::FitError;
use crate::fitting::model::NumericModel;
use crate::fitting::regularized::{feature_degree, fit_to_length, polynomial_features};
use crate::fitting::result::FitResult;
use crate::numerical::lm::FitProgress;

const EVIDENCE_ITERATIONS: usize = 300;
const EVIDENCE_TOLERANCE: f64 = 1e-6;

pub fn bayesian_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    max_iter: usize,
    n_samples: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    match bayesian_ridge(dataset, initial.len(), n_samples) {
        Ok((mean, samples)) => Ok(FitResult::from_samples(mean, samples, FitMethod::Bayesian)),
        Err(err) => {
            warn!("bayesian regression failed ({}), falling back to bootstrap", err);
            bootstrap_fit(dataset, model, initial, max_iter, n_samples, progress)
        }
    }
}

/// Evidence-approximation Bayesian ridge on the polynomial basis.
/// Returns the posterior mean (padded to `n_params`) and posterior
/// samples, one row per sample.
fn bayesian_ridge(
    dataset: &Dataset,
    n_params: usize,
    n_samples: usize,
) -> Result<(DVector<f64>, DMatrix<f64>), FitError> {
    let degree = feature_degree(n_params);
    let features = polynomial_features(&dataset.x, degree);
    let n = dataset.len() as f64;
    let xtx = features.transpose() * &features;
    let xty = features.transpose() * &dataset.y;

    let y_var = {
        let mean = dataset.y.mean();
        dataset.y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
    };
    // alpha: noise precision, lambda: weight precision.
    let mut alpha = if y_var > 0.0 { 1.0 / y_var } else { 1.0 };
    let mut lambda = 1.0;
    let mut mean = DVector::zeros(degree);
    let mut posterior_cov = DMatrix::identity(degree, degree);

    for _ in 0..EVIDENCE_ITERATIONS {
        let mut s_inv = &xtx * alpha;
        for i in 0..degree {
            s_inv[(i, i)] += lambda;
        }
        posterior_cov = s_inv
            .try_inverse()
            .ok_or_else(|| FitError::FittingFailure("singular posterior precision".to_string()))?;
        mean = &posterior_cov * &xty * alpha;

        let gamma = degree as f64 - lambda * posterior_cov.trace();
        let m_norm = mean.dot(&mean);
        let residual = &dataset.y - &features * &mean;
        let r_norm = residual.dot(&residual);

        let lambda_new = if m_norm > 0.0 { gamma.max(1e-12) / m_norm } else { lambda };
        let alpha_new =
            if r_norm > 0.0 { (n - gamma).max(1e-12) / r_norm } else { alpha };
        let shift = (lambda_new - lambda).abs() / lambda.max(1e-12)
            + (alpha_new - alpha).abs() / alpha.max(1e-12);
        lambda = lambda_new;
        alpha = alpha_new;
        if shift < EVIDENCE_TOLERANCE {
            break;
        }
    }
    if !mean.iter().all(|v| v.is_finite()) {
        return Err(FitError::FittingFailure("non-finite posterior mean".to_string()));
    }

    let samples = draw_posterior_samples(&mean, &posterior_cov, n_samples.max(2));
    Ok((fit_to_length(&mean, n_params), pad_samples(samples, n_params)))
}

/// Samples from N(mean, cov) via Cholesky; ad-hoc 10 % relative normal
/// spread around the mean when the covariance is not positive definite.
fn draw_posterior_samples(
    mean: &DVector<f64>,
    cov: &DMatrix<f64>,
    n_samples: usize,
) -> DMatrix<f64> {
    let d = mean.len();
    let mut rng = rand::rng();
    match cov.clone().cholesky() {
        Some(chol) => {
            let l = chol.l();
            let mut samples = DMatrix::zeros(n_samples, d);
            for s in 0..n_samples {
                let z = DVector::from_fn(d, |_, _| rng.sample::<f64, _>(StandardNormal));
                let draw = mean + &l * z;
                for k in 0..d {
                    samples[(s, k)] = draw[k];
                }
            }
            samples
        }
        None => {
            warn!("posterior covariance not positive definite, using 10% relative spread");
            DMatrix::from_fn(n_samples, d, |_, k| {
                let z: f64 = rng.sample(StandardNormal);
                mean[k] + mean[k].abs() * 0.1 * z
            })
        }
    }
}

/// Zero-pad (or truncate) sample columns to the declared parameter count.
fn pad_samples(samples: DMatrix<f64>, n_params: usize) -> DMatrix<f64> {
    DMatrix::from_fn(samples.nrows(), n_params, |i, k| {
        if k < samples.ncols() { samples[(i, k)] } else { 0.0 }
    })
}
