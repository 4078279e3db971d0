//! # Robust fitting
//!
//! RANSAC: repeated fits on random minimal subsets, keeping the fit with
//! the largest inlier consensus (threshold `2 * std(y)`), then a final
//! refit on the consensus set. Deterministic via a fixed seed.
//!
//! Huber: iteratively reweighted linear regression (slope + intercept)
//! with the Huber weight function. Linear by construction, so models with
//! more than two parameters are a documented soft degradation: a warning
//! is logged and the supplied initial parameters are returned unchanged.
//!
//! Either strategy falls back to plain least squares when its internal
//! fitting machinery fails outright; the result is tagged with the method
//! that actually ran.

use log::warn;
use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

use crate::fitting::data::Dataset;
use crate::fitting::dispatcher::{FitMethod, RobustKind};
use crate::fitting::error::FitError;
use crate::fitting::least_squares::{least_squares_fit, lm_fit};
use crate::fitting::model::NumericModel;
use crate::fitting::result::FitResult;
use crate::numerical::lm::FitProgress;

/// Fixed seed: robust fits are reproducible run to run.
const RANSAC_SEED: u64 = 42;
/// Evaluation budget for each minimal-subset fit.
const SUBSET_EVALS: usize = 200;
const HUBER_EPSILON: f64 = 1.35;
const HUBER_ITERATIONS: usize = 50;

pub fn robust_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    kind: RobustKind,
    max_iter: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    let attempt = match kind {
        RobustKind::Ransac => ransac(dataset, model, initial, max_iter),
        RobustKind::Huber => huber(dataset, initial),
    };
    match attempt {
        Ok(result) => Ok(result),
        Err(err) => {
            warn!("robust fitting failed ({}), falling back to least squares", err);
            least_squares_fit(dataset, model, initial, max_iter.max(1000), progress)
        }
    }
}

fn ransac(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    max_trials: usize,
) -> Result<FitResult, FitError> {
    let n = dataset.len();
    let n_params = initial.len();
    let subset_size = n_params.max(2);
    if subset_size > n {
        return Err(FitError::InvalidInput(format!(
            "{} points cannot seed minimal subsets of size {}",
            n, subset_size
        )));
    }

    let threshold = 2.0 * population_std(&dataset.y);
    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let mut best: Option<(usize, DVector<f64>)> = None;

    for _ in 0..max_trials.max(1) {
        let indices = sample(&mut rng, n, subset_size);
        let x_sub = DVector::from_iterator(subset_size, indices.iter().map(|i| dataset.x[i]));
        let y_sub = DVector::from_iterator(subset_size, indices.iter().map(|i| dataset.y[i]));
        let report = match lm_fit(model, &x_sub, &y_sub, None, initial, SUBSET_EVALS, None) {
            Ok(report) => report,
            Err(_) => continue,
        };

        let y_pred = model.eval(report.beta.as_slice(), &dataset.x);
        let inliers = dataset
            .y
            .iter()
            .zip(y_pred.iter())
            .filter(|(yo, yp)| (**yo - **yp).abs() <= threshold)
            .count();
        if best.as_ref().is_none_or(|(count, _)| inliers > *count) {
            best = Some((inliers, report.beta));
        }
    }

    let (count, beta) = best.ok_or_else(|| {
        FitError::FittingFailure("no RANSAC trial produced a candidate fit".to_string())
    })?;
    if count < subset_size {
        return Err(FitError::FittingFailure(format!(
            "largest consensus set has {} inliers, need at least {}",
            count, subset_size
        )));
    }

    // Consensus refit on the inlier set; the trial fit stands if the
    // refit cannot improve on it.
    let y_pred = model.eval(beta.as_slice(), &dataset.x);
    let inlier_idx: Vec<usize> = (0..n)
        .filter(|&i| (dataset.y[i] - y_pred[i]).abs() <= threshold)
        .collect();
    let x_in = DVector::from_iterator(inlier_idx.len(), inlier_idx.iter().map(|&i| dataset.x[i]));
    let y_in = DVector::from_iterator(inlier_idx.len(), inlier_idx.iter().map(|&i| dataset.y[i]));
    let final_beta = match lm_fit(model, &x_in, &y_in, None, &beta, SUBSET_EVALS, None) {
        Ok(report) => report.beta,
        Err(_) => beta,
    };

    // No covariance estimate from the consensus procedure.
    Ok(FitResult::degenerate(final_beta, FitMethod::Robust(RobustKind::Ransac)))
}

fn huber(dataset: &Dataset, initial: &DVector<f64>) -> Result<FitResult, FitError> {
    let n_params = initial.len();
    if n_params > 2 {
        warn!(
            "Huber regression is linear; a {}-parameter model degrades to the supplied \
             initial parameters, consider RANSAC instead",
            n_params
        );
    }

    let (slope, intercept) = huber_linear(&dataset.x, &dataset.y)?;

    // Mirror the linear coefficients onto the declared parameter vector;
    // on a length mismatch the initial parameters are kept unchanged.
    let beta = if n_params == 2 {
        DVector::from_vec(vec![slope, intercept])
    } else {
        initial.clone()
    };
    Ok(FitResult::degenerate(beta, FitMethod::Robust(RobustKind::Huber)))
}

/// Iteratively reweighted least squares for `y = m*x + c` with Huber
/// weights and a median-absolute-deviation scale estimate.
fn huber_linear(x: &DVector<f64>, y: &DVector<f64>) -> Result<(f64, f64), FitError> {
    let n = x.len();
    let mut weights = DVector::from_element(n, 1.0);
    let (mut m, mut c) = weighted_line(x, y, &weights)?;

    for _ in 0..HUBER_ITERATIONS {
        let residuals = DVector::from_fn(n, |i, _| y[i] - (m * x[i] + c));
        let scale = mad_scale(&residuals).max(1e-12);
        for i in 0..n {
            let r = residuals[i].abs();
            weights[i] = if r <= HUBER_EPSILON * scale { 1.0 } else { HUBER_EPSILON * scale / r };
        }
        let (m_new, c_new) = weighted_line(x, y, &weights)?;
        let shift = (m_new - m).abs() + (c_new - c).abs();
        m = m_new;
        c = c_new;
        if shift < 1e-10 {
            break;
        }
    }
    Ok((m, c))
}

fn weighted_line(
    x: &DVector<f64>,
    y: &DVector<f64>,
    w: &DVector<f64>,
) -> Result<(f64, f64), FitError> {
    let sw: f64 = w.sum();
    let swx: f64 = w.component_mul(x).sum();
    let swy: f64 = w.component_mul(y).sum();
    let swxx: f64 = w.iter().zip(x.iter()).map(|(wi, xi)| wi * xi * xi).sum();
    let swxy: f64 = (0..x.len()).map(|i| w[i] * x[i] * y[i]).sum();
    let det = sw * swxx - swx * swx;
    if det.abs() < 1e-12 {
        return Err(FitError::FittingFailure(
            "degenerate design for linear robust regression".to_string(),
        ));
    }
    let m = (sw * swxy - swx * swy) / det;
    let c = (swxx * swy - swx * swxy) / det;
    Ok((m, c))
}

fn mad_scale(residuals: &DVector<f64>) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    abs.sort_by(|a, b| a.total_cmp(b));
    let median = abs[abs.len() / 2];
    median / 0.6745
}

fn population_std(y: &DVector<f64>) -> f64 {
    let mean = y.mean();
    (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / y.len() as f64).sqrt()
}
