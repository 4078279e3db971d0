//! # Levenberg-Marquardt curve fitting
//!
//! Weighted nonlinear least squares: minimize the sum of weighted squared
//! residuals of `y_hat(beta)` against measured data. Damped normal
//! equations `(JtWJ + lambda*diag(JtWJ)) h = JtWdy` with a multiplicative
//! lambda schedule; steps are accepted on chi-squared decrease.
//!
//! This is the single nonlinear optimization routine every fitting
//! strategy delegates to. The Jacobian is supplied by the caller (the
//! model compiler provides analytic derivatives).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use nalgebra::{DMatrix, DVector};

/// Cloneable handle onto the current iteration of a running fit.
///
/// The optimizer stores its iteration count here; a caller driving the fit
/// on a worker thread can clone the handle beforehand and poll it at its
/// own cadence. Purely best-effort, no synchronization beyond the atomic.
#[derive(Clone, Debug, Default)]
pub struct FitProgress(Arc<AtomicUsize>);

impl FitProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iteration most recently reported by the optimizer.
    pub fn iteration(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, iteration: usize) {
        self.0.store(iteration, Ordering::Relaxed);
    }
}

/// Levenberg-Marquardt solver configuration.
pub struct LevenbergMarquardt {
    pub max_evals: usize,
    /// convergence tolerance on the gradient max-norm
    pub eps_grad: f64,
    /// convergence tolerance on the relative step size
    pub eps_step: f64,
    /// initial value of the damping parameter
    pub lambda_0: f64,
    /// factor for increasing lambda on a rejected step
    pub lambda_up: f64,
    /// factor for decreasing lambda on an accepted step
    pub lambda_down: f64,
    progress: Option<FitProgress>,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_evals: 1000,
            eps_grad: 1e-10,
            eps_step: 1e-10,
            lambda_0: 1e-3,
            lambda_up: 11.0,
            lambda_down: 9.0,
            progress: None,
        }
    }
}

/// Outcome of a Levenberg-Marquardt run.
pub struct LmReport {
    pub beta: DVector<f64>,
    /// parameter covariance matrix (zero-filled when degenerate)
    pub cov: DMatrix<f64>,
    /// weighted sum of squared residuals at `beta`
    pub chi2: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_evals(mut self, max_evals: usize) -> Self {
        self.max_evals = max_evals;
        self
    }

    pub fn with_progress(mut self, progress: &FitProgress) -> Self {
        self.progress = Some(progress.clone());
        self
    }

    /// Minimize the weighted residual of `func(beta)` against `y`.
    ///
    /// `func` evaluates the model over the full x-grid for a parameter
    /// vector; `jac` returns the n-by-p Jacobian d y_hat / d beta.
    /// `weight` carries 1/sigma^2 per point; `None` means an unweighted
    /// fit, in which case the covariance is rescaled by the reduced
    /// chi-squared (relative-sigma semantics). With weights supplied the
    /// covariance is taken as the inverse of JtWJ (absolute sigma).
    pub fn minimize<F, J>(
        &self,
        func: F,
        jac: J,
        y: &DVector<f64>,
        weight: Option<&DVector<f64>>,
        beta0: &DVector<f64>,
    ) -> Result<LmReport, String>
    where
        F: Fn(&DVector<f64>) -> DVector<f64>,
        J: Fn(&DVector<f64>) -> DMatrix<f64>,
    {
        let npnt = y.len();
        let ncof = beta0.len();
        if npnt < ncof {
            return Err(format!(
                "{} data points cannot constrain {} parameters",
                npnt, ncof
            ));
        }
        let absolute_sigma = weight.is_some();
        let w = weight.cloned().unwrap_or_else(|| DVector::from_element(npnt, 1.0));

        let mut beta = beta0.clone();
        let mut y_hat = func(&beta);
        let mut func_calls = 1usize;
        if y_hat.len() != npnt {
            return Err(format!(
                "model returned {} values for {} data points",
                y_hat.len(),
                npnt
            ));
        }
        if !y_hat.iter().all(|v| v.is_finite()) {
            return Err("model evaluation is not finite at the initial guess".to_string());
        }

        let mut chi2 = weighted_ssr(y, &y_hat, &w);
        let mut lambda = self.lambda_0;
        let mut iteration = 0usize;
        let mut converged = false;

        while func_calls < self.max_evals {
            iteration += 1;
            if let Some(progress) = &self.progress {
                progress.record(iteration);
            }

            let j = jac(&beta);
            let (jtw_j, jtw_dy) = normal_equations(&j, &w, &(y - &y_hat));

            if jtw_dy.amax() < self.eps_grad && iteration > 1 {
                converged = true;
                break;
            }

            // Try damped steps, inflating lambda until one is accepted.
            let mut accepted = false;
            while func_calls < self.max_evals {
                let mut damped = jtw_j.clone();
                for i in 0..ncof {
                    damped[(i, i)] += lambda * jtw_j[(i, i)].max(1e-12);
                }
                let step = match damped.lu().solve(&jtw_dy) {
                    Some(h) => h,
                    None => {
                        if lambda >= 1e7 {
                            break;
                        }
                        lambda = (lambda * self.lambda_up).min(1e7);
                        continue;
                    }
                };

                let beta_try = &beta + &step;
                let y_try = func(&beta_try);
                func_calls += 1;
                let chi2_try = if y_try.iter().all(|v| v.is_finite()) {
                    weighted_ssr(y, &y_try, &w)
                } else {
                    f64::INFINITY
                };

                if chi2_try < chi2 {
                    let max_rel_step = step
                        .iter()
                        .zip(beta.iter())
                        .map(|(h, b)| (h / (b.abs() + 1e-12)).abs())
                        .fold(0.0, f64::max);
                    beta = beta_try;
                    y_hat = y_try;
                    chi2 = chi2_try;
                    lambda = (lambda / self.lambda_down).max(1e-7);
                    accepted = true;
                    if max_rel_step < self.eps_step {
                        converged = true;
                    }
                    break;
                }

                if lambda >= 1e7 {
                    break;
                }
                lambda = (lambda * self.lambda_up).min(1e7);
            }

            if !accepted {
                // Damping saturated without finding a downhill step: the
                // current beta is a (possibly local) minimum. An exit
                // caused by the evaluation budget is not convergence.
                converged = func_calls < self.max_evals;
                break;
            }
            if converged {
                break;
            }
        }

        if !converged {
            warn!(
                "Levenberg-Marquardt stopped after {} evaluations without convergence",
                func_calls
            );
        } else {
            info!(
                "Levenberg-Marquardt converged: {} iterations, chi2 = {:.6e}",
                iteration, chi2
            );
        }

        let j = jac(&beta);
        let cov = self.covariance(&j, &w, chi2, npnt, ncof, absolute_sigma);

        Ok(LmReport { beta, cov, chi2, iterations: iteration, converged })
    }

    fn covariance(
        &self,
        j: &DMatrix<f64>,
        w: &DVector<f64>,
        chi2: f64,
        npnt: usize,
        ncof: usize,
        absolute_sigma: bool,
    ) -> DMatrix<f64> {
        let (jtw_j, _) = normal_equations(j, w, &DVector::zeros(npnt));
        let inverse = jtw_j.clone().try_inverse().or_else(|| {
            // Near-singular: nudge the diagonal and retry once.
            let mut regularized = jtw_j;
            let trace_avg = regularized.trace() / ncof as f64;
            for i in 0..ncof {
                regularized[(i, i)] += 1e-6 * trace_avg.abs().max(1e-12);
            }
            regularized.try_inverse()
        });
        match inverse {
            Some(mut cov) => {
                let dof = npnt.saturating_sub(ncof);
                if !absolute_sigma && dof > 0 {
                    cov *= chi2 / dof as f64;
                }
                if cov.iter().all(|v| v.is_finite()) {
                    cov
                } else {
                    DMatrix::zeros(ncof, ncof)
                }
            }
            None => DMatrix::zeros(ncof, ncof),
        }
    }
}

fn weighted_ssr(y: &DVector<f64>, y_hat: &DVector<f64>, w: &DVector<f64>) -> f64 {
    let delta = y - y_hat;
    delta.component_mul(w).dot(&delta)
}

/// JtWJ and JtWdy for the damped normal equations.
fn normal_equations(
    j: &DMatrix<f64>,
    w: &DVector<f64>,
    delta_y: &DVector<f64>,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut jw = j.clone();
    for i in 0..jw.nrows() {
        let wi = w[i];
        for k in 0..jw.ncols() {
            jw[(i, k)] *= wi;
        }
    }
    let jtw_j = j.transpose() * &jw;
    let jtw_dy = jw.transpose() * delta_y;
    (jtw_j, jtw_dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_problem() -> (DVector<f64>, DVector<f64>) {
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = x.map(|xi| 2.0 * xi + 1.0);
        (x, y)
    }

    #[test]
    fn test_fits_linear_model() {
        let (x, y) = linear_problem();
        let model = |beta: &DVector<f64>| x.map(|xi| beta[0] * xi + beta[1]);
        let jac = |_beta: &DVector<f64>| {
            DMatrix::from_fn(x.len(), 2, |i, k| if k == 0 { x[i] } else { 1.0 })
        };
        let report = LevenbergMarquardt::new()
            .minimize(model, jac, &y, None, &DVector::from_vec(vec![0.5, 0.5]))
            .unwrap();
        assert!(report.converged);
        assert_relative_eq!(report.beta[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(report.beta[1], 1.0, epsilon = 1e-6);
        assert!(report.chi2 < 1e-12);
    }

    #[test]
    fn test_fits_exponential_model() {
        let x = DVector::from_vec((0..20).map(|i| i as f64 * 0.25).collect());
        let y = x.map(|xi| 3.0 * (0.4 * xi).exp());
        let model = |beta: &DVector<f64>| x.map(|xi| beta[0] * (beta[1] * xi).exp());
        let jac = |beta: &DVector<f64>| {
            DMatrix::from_fn(x.len(), 2, |i, k| {
                let e = (beta[1] * x[i]).exp();
                if k == 0 { e } else { beta[0] * x[i] * e }
            })
        };
        let report = LevenbergMarquardt::new()
            .minimize(model, jac, &y, None, &DVector::from_vec(vec![1.0, 1.0]))
            .unwrap();
        assert!(report.converged);
        assert_relative_eq!(report.beta[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(report.beta[1], 0.4, epsilon = 1e-5);
    }

    #[test]
    fn test_weighted_covariance_is_absolute() {
        let (x, y) = linear_problem();
        let model = |beta: &DVector<f64>| x.map(|xi| beta[0] * xi + beta[1]);
        let jac = |_beta: &DVector<f64>| {
            DMatrix::from_fn(x.len(), 2, |i, k| if k == 0 { x[i] } else { 1.0 })
        };
        let sigma = 0.1;
        let w = DVector::from_element(y.len(), 1.0 / (sigma * sigma));
        let report = LevenbergMarquardt::new()
            .minimize(model, jac, &y, Some(&w), &DVector::from_vec(vec![0.5, 0.5]))
            .unwrap();
        // Known closed form for a straight line with uniform sigma.
        let n = x.len() as f64;
        let sx: f64 = x.iter().sum();
        let sxx: f64 = x.iter().map(|v| v * v).sum();
        let det = n * sxx - sx * sx;
        assert_relative_eq!(report.cov[(0, 0)], sigma * sigma * n / det, max_relative = 1e-6);
    }

    #[test]
    fn test_progress_handle_updates() {
        let (x, y) = linear_problem();
        let model = |beta: &DVector<f64>| x.map(|xi| beta[0] * xi + beta[1]);
        let jac = |_beta: &DVector<f64>| {
            DMatrix::from_fn(x.len(), 2, |i, k| if k == 0 { x[i] } else { 1.0 })
        };
        let progress = FitProgress::new();
        let lm = LevenbergMarquardt::new().with_progress(&progress);
        lm.minimize(model, jac, &y, None, &DVector::from_vec(vec![0.0, 0.0])).unwrap();
        assert!(progress.iteration() > 0);
    }

    #[test]
    fn test_underdetermined_is_rejected() {
        let y = DVector::from_vec(vec![1.0]);
        let model = |beta: &DVector<f64>| DVector::from_vec(vec![beta[0] + beta[1]]);
        let jac = |_: &DVector<f64>| DMatrix::from_element(1, 2, 1.0);
        let result = LevenbergMarquardt::new().minimize(
            model,
            jac,
            &y,
            None,
            &DVector::from_vec(vec![0.0, 0.0]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_non_finite_initial_guess_is_an_error() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let model = |_: &DVector<f64>| DVector::from_element(3, f64::NAN);
        let jac = |_: &DVector<f64>| DMatrix::zeros(3, 1);
        let result =
            LevenbergMarquardt::new().minimize(model, jac, &y, None, &DVector::from_vec(vec![1.0]));
        assert!(result.is_err());
    }
}
