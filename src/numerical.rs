/// # Levenberg-Marquardt curve fitting
/// Weighted nonlinear least squares with damped normal equations and an
/// analytic Jacobian. Single optimization routine shared by every fitting
/// strategy; exposes a pollable iteration counter for progress reporting.
pub mod lm;
