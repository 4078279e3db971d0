//! # Bootstrap resampling
//!
//! One reference fit, then `n_bootstrap` refits on datasets resampled
//! with replacement, each seeded from the reference parameters. A
//! resample that fails to converge contributes the reference parameters
//! unchanged — variance is never inflated by unrelated optimizer noise,
//! at the cost of slightly underestimating the true variability
//! (documented limitation). Parameter uncertainty is the per-parameter
//! sample standard deviation; covariance is the sample covariance.

use log::info;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rayon::prelude::*;

use crate::fitting::data::{Dataset, weights_from_sigma};
use crate::fitting::dispatcher::FitMethod;
use crate::fitting::error::FitError;
use crate::fitting::least_squares::lm_fit;
use crate::fitting::model::NumericModel;
use crate::fitting::result::FitResult;
use crate::numerical::lm::FitProgress;

pub fn bootstrap_fit(
    dataset: &Dataset,
    model: &NumericModel,
    initial: &DVector<f64>,
    max_iter: usize,
    n_bootstrap: usize,
    progress: Option<&FitProgress>,
) -> Result<FitResult, FitError> {
    let n = dataset.len();
    let weight = weights_from_sigma(dataset.sigma_y.as_ref());

    let reference =
        lm_fit(model, &dataset.x, &dataset.y, weight.as_ref(), initial, max_iter, progress)?;
    let reference_beta = reference.beta;

    let rows: Vec<Vec<f64>> = (0..n_bootstrap.max(1))
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::rng();
            let indices: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
            let x_boot = DVector::from_iterator(n, indices.iter().map(|&i| dataset.x[i]));
            let y_boot = DVector::from_iterator(n, indices.iter().map(|&i| dataset.y[i]));
            let w_boot = weight
                .as_ref()
                .map(|w| DVector::from_iterator(n, indices.iter().map(|&i| w[i])));

            match lm_fit(model, &x_boot, &y_boot, w_boot.as_ref(), &reference_beta, max_iter, None)
            {
                Ok(report) => report.beta.as_slice().to_vec(),
                // Failed resample: keep the reference parameters.
                Err(_) => reference_beta.as_slice().to_vec(),
            }
        })
        .collect();

    let p = reference_beta.len();
    let samples = DMatrix::from_fn(rows.len(), p, |i, k| rows[i][k]);
    info!("bootstrap complete: {} resamples of {} points", rows.len(), n);

    Ok(FitResult::from_samples(reference_beta, samples, FitMethod::Bootstrap))
}
