//! # Regression strategy dispatcher
//!
//! The fitting method is a closed enum and dispatch is an exhaustive
//! match — there is no string-keyed lookup to fail at runtime. Every
//! strategy receives the same numeric contract (`model(params, x)` over
//! the shared dataset) and returns a [`FitResult`]; goodness-of-fit
//! statistics are computed here, once, by the shared evaluator.

use nalgebra::DVector;
use strum_macros::Display;

use crate::fitting::bayesian::bayesian_fit;
use crate::fitting::bootstrap::bootstrap_fit;
use crate::fitting::data::Dataset;
use crate::fitting::error::FitError;
use crate::fitting::least_squares::{least_squares_fit, weighted_least_squares_fit};
use crate::fitting::model::NumericModel;
use crate::fitting::odr::odr_fit;
use crate::fitting::regularized::{lasso_fit, regularized_prediction, ridge_fit};
use crate::fitting::result::FitResult;
use crate::fitting::robust::robust_fit;
use crate::fitting::statistics::{FitStatistics, evaluate};
use crate::numerical::lm::FitProgress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RobustKind {
    Ransac,
    Huber,
}

/// Closed tag over the supported fitting strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum FitMethod {
    /// Orthogonal distance regression (uncertainty on both axes).
    Odr,
    LeastSquares,
    WeightedLeastSquares,
    Robust(RobustKind),
    Bootstrap,
    Ridge,
    Lasso,
    Bayesian,
}

/// Method-specific options with the defaults of the host application.
#[derive(Clone, Debug)]
pub struct FitOptions {
    pub max_iter: usize,
    /// Explicit weights for weighted least squares; derived from
    /// `1/sigma_y^2` when absent.
    pub weights: Option<DVector<f64>>,
    /// Bootstrap resample count.
    pub n_bootstrap: usize,
    /// Regularization strength for ridge/lasso.
    pub alpha: f64,
    /// Posterior sample count for the Bayesian strategy.
    pub n_samples: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self { max_iter: 1000, weights: None, n_bootstrap: 1000, alpha: 1.0, n_samples: 1000 }
    }
}

/// Fit `model` to `dataset` with the chosen strategy and evaluate the
/// goodness of fit. The returned result is tagged with the strategy that
/// actually ran, which differs from `method` when a documented fallback
/// was taken (robust -> least squares, bayesian -> bootstrap).
pub fn fit(
    method: FitMethod,
    dataset: &Dataset,
    model: &NumericModel,
    initial: &[f64],
    options: &FitOptions,
    progress: Option<&FitProgress>,
) -> Result<(FitResult, FitStatistics), FitError> {
    let n_params = model.parameters().len();
    if n_params == 0 {
        return Err(FitError::InvalidInput(
            "the model has no free parameters to fit".to_string(),
        ));
    }
    if initial.len() != n_params {
        return Err(FitError::InvalidInput(format!(
            "{} initial values for {} parameters ({})",
            initial.len(),
            n_params,
            model.parameters().join(", ")
        )));
    }
    let initial = DVector::from_column_slice(initial);
    let max_iter = options.max_iter;

    let result = match method {
        FitMethod::Odr => odr_fit(dataset, model, &initial, max_iter, progress)?,
        FitMethod::LeastSquares => least_squares_fit(dataset, model, &initial, max_iter, progress)?,
        FitMethod::WeightedLeastSquares => {
            let weights = options
                .weights
                .clone()
                .unwrap_or_else(|| default_weights(dataset));
            weighted_least_squares_fit(dataset, model, &weights, &initial, max_iter, progress)?
        }
        FitMethod::Robust(kind) => {
            robust_fit(dataset, model, &initial, kind, max_iter, progress)?
        }
        FitMethod::Bootstrap => {
            bootstrap_fit(dataset, model, &initial, max_iter, options.n_bootstrap, progress)?
        }
        FitMethod::Ridge => {
            ridge_fit(dataset, model, &initial, options.alpha, max_iter, progress)?
        }
        FitMethod::Lasso => {
            lasso_fit(dataset, model, &initial, options.alpha, max_iter, progress)?
        }
        FitMethod::Bayesian => {
            bayesian_fit(dataset, model, &initial, max_iter, options.n_samples, progress)?
        }
    };

    let y_pred = match method {
        FitMethod::Ridge | FitMethod::Lasso | FitMethod::Bayesian => {
            regularized_prediction(dataset, model, &result.beta)
        }
        _ => model.eval(result.beta.as_slice(), &dataset.x),
    };
    let sigma_for_stats = stats_sigma(method, dataset, options);
    let stats = evaluate(&dataset.y, &y_pred, sigma_for_stats.as_ref(), n_params);
    Ok((result, stats))
}

/// Weighted least squares without explicit weights: `1/sigma_y^2` when
/// every sigma is positive, unit weights otherwise.
fn default_weights(dataset: &Dataset) -> DVector<f64> {
    match &dataset.sigma_y {
        Some(sigma) if sigma.iter().all(|s| *s > 0.0) => sigma.map(|s| 1.0 / (s * s)),
        _ => DVector::from_element(dataset.len(), 1.0),
    }
}

/// Sigma column used for the chi-squared report. Robust and regularized
/// strategies report unweighted chi-squared; weighted least squares
/// reports against the sigma equivalent of its weights.
fn stats_sigma(
    method: FitMethod,
    dataset: &Dataset,
    options: &FitOptions,
) -> Option<DVector<f64>> {
    match method {
        FitMethod::Robust(_) | FitMethod::Ridge | FitMethod::Lasso => None,
        FitMethod::WeightedLeastSquares => {
            let weights =
                options.weights.clone().unwrap_or_else(|| default_weights(dataset));
            Some(weights.map(|w| 1.0 / (w.abs() + 1e-10).sqrt()))
        }
        _ => dataset.sigma_y.clone(),
    }
}
