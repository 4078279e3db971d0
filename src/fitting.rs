/// # Dataset value objects
/// Four-column measured data (`x, sigma_x, y, sigma_y`); all-zero sigma
/// columns are converted to `None` at this boundary.
pub mod data;
///____________________________________________________________________________________________________________________________
/// # Strategy dispatcher
/// Closed method enum, exhaustive dispatch, shared statistics pass.
///# Example
/// ```
/// use ajuste::fitting::data::Dataset;
/// use ajuste::fitting::dispatcher::{fit, FitMethod, FitOptions};
/// use ajuste::fitting::model::ModelCompiler;
///
/// let compiler = ModelCompiler::new();
/// let params = compiler.extract_parameters("a*x+b").unwrap();
/// let model = compiler.create_model("a*x+b", &params).unwrap();
/// let data = Dataset::from_xy(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]).unwrap();
/// let (result, stats) = fit(
///     FitMethod::LeastSquares, &data, &model, &[1.0, 0.0],
///     &FitOptions::default(), None,
/// ).unwrap();
/// assert!(stats.r2 > 0.99);
/// assert!((result.beta[0] - 2.0).abs() < 1e-4);
/// ```
pub mod dispatcher;
///____________________________________________________________________________________________________________________________
/// # Error taxonomy
/// Compiler errors (parse, undefined function, invalid parameter) and
/// fitting errors (failure after fallbacks, invalid input).
pub mod error;
///____________________________________________________________________________________________________________________________
/// # Model compiler
/// Equation text to cached numeric model + analytic derivatives; the
/// sorted-parameter extraction that fixes positional order everywhere.
pub mod model;
///____________________________________________________________________________________________________________________________
/// # Result value objects
/// One result shape across strategies: beta, sd_beta, cov_beta, the
/// method that actually ran, and optional parameter samples.
pub mod result;
///____________________________________________________________________________________________________________________________
/// # Session facade
/// Equation + data + method bundled behind the flow a host UI drives.
pub mod session;
///____________________________________________________________________________________________________________________________
/// # Statistics evaluator
/// Chi-squared (masked weighting), reduced chi-squared, R-squared.
pub mod statistics;

// Strategy implementations.
pub mod bayesian;
pub mod bootstrap;
pub mod least_squares;
pub mod odr;
pub mod regularized;
pub mod robust;
