//! # Model Compiler
//!
//! Turns normalized equation text into a [`NumericModel`]: a vectorized
//! numeric callable plus analytic partial derivatives with respect to
//! each fit parameter. Compiled artifacts are cached by (equation text,
//! ordered parameter names) in an explicit, injectable [`ModelCache`];
//! identical requests return the same `Arc` without re-differentiating.
//!
//! Parameter extraction and ordering live here too: the free symbols of
//! the right-hand side, minus the reserved independent variable `x`,
//! sorted lexicographically. That ordering is the positional contract
//! between parameter lists, initial-guess vectors and fitted vectors.

use std::sync::Arc;

use dashmap::DashMap;
use lazy_static::lazy_static;
use nalgebra::{DMatrix, DVector};
use regex::Regex;

use crate::fitting::error::ModelError;
use crate::symbolic::normalize::normalize;
use crate::symbolic::parse_expr::{ParseError, parse_expression};
use crate::symbolic::registry::is_reserved;

/// Reserved name of the independent variable.
pub const INDEPENDENT_VAR: &str = "x";

/// Preset textbook models offered to host UIs as (label, equation).
pub static PRESET_MODELS: &[(&str, &str)] = &[
    ("Linear: a*x + b", "a*x + b"),
    ("Quadrático: a*x² + b*x + c", "a*x**2 + b*x + c"),
    ("Exponencial: a*exp(b*x)", "a*exp(b*x)"),
    ("Logarítmico: a*log(x) + b", "a*log(x) + b"),
    ("Potência: a*x^b", "a*x**b"),
    ("Senoidal: a*sin(b*x + c) + d", "a*sin(b*x + c) + d"),
];

lazy_static! {
    static ref PARAM_NAME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9]*$").unwrap();
}

type Callable = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Compiled numeric model: `f(params, x)` and its analytic partial
/// derivatives, in parameter order. Owned by the compiler cache and
/// shared via `Arc`, so a fit result keeps its model callable alive.
pub struct NumericModel {
    equation: String,
    parameters: Vec<String>,
    function: Callable,
    derivatives: Vec<Callable>,
}

impl std::fmt::Debug for NumericModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumericModel")
            .field("equation", &self.equation)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl PartialEq for NumericModel {
    fn eq(&self, other: &Self) -> bool {
        self.equation == other.equation && self.parameters == other.parameters
    }
}

impl NumericModel {
    /// Normalized right-hand side this model was compiled from.
    pub fn equation(&self) -> &str {
        &self.equation
    }

    /// Parameter names in the positional order of `beta`.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn eval_scalar(&self, beta: &[f64], x: f64) -> f64 {
        let mut args = beta.to_vec();
        args.push(x);
        (self.function)(&args)
    }

    /// Vectorized model evaluation over an x-grid.
    pub fn eval(&self, beta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        let mut args = beta.to_vec();
        args.push(0.0);
        let last = args.len() - 1;
        DVector::from_iterator(
            x.len(),
            x.iter().map(|xi| {
                args[last] = *xi;
                (self.function)(&args)
            }),
        )
    }

    /// Partial derivative with respect to parameter `index`, evaluated
    /// over an x-grid.
    pub fn derivative(&self, index: usize, beta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        let mut args = beta.to_vec();
        args.push(0.0);
        let last = args.len() - 1;
        DVector::from_iterator(
            x.len(),
            x.iter().map(|xi| {
                args[last] = *xi;
                (self.derivatives[index])(&args)
            }),
        )
    }

    /// Analytic Jacobian d y_hat / d beta over an x-grid (n rows, one
    /// column per parameter).
    pub fn jacobian(&self, beta: &[f64], x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(x.len(), self.parameters.len());
        for k in 0..self.parameters.len() {
            jac.set_column(k, &self.derivative(k, beta, x));
        }
        jac
    }
}

/// Explicit compiled-model cache. Never evicts; a host wanting isolation
/// (parallel test runs, long sessions with many equations) supplies a
/// fresh one. Concurrent reads are safe; racing inserts of the same key
/// recompute the same artifact, last write wins.
#[derive(Default)]
pub struct ModelCache {
    inner: DashMap<(String, Vec<String>), Arc<NumericModel>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Compiles equations into numeric models, owning the cache.
#[derive(Default)]
pub struct ModelCompiler {
    cache: ModelCache,
}

impl ModelCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: ModelCache) -> Self {
        ModelCompiler { cache }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Fit parameters of an equation: free symbols of the (normalized)
    /// right-hand side minus `x`, sorted lexicographically.
    pub fn extract_parameters(&self, equation: &str) -> Result<Vec<String>, ModelError> {
        let rhs = right_hand_side(equation)?;
        let expr = parse_expression(&rhs)?;
        let parameters: Vec<String> = expr
            .free_symbols()
            .into_iter()
            .filter(|name| name != INDEPENDENT_VAR)
            .collect();
        for name in &parameters {
            validate_parameter_name(name)?;
        }
        Ok(parameters)
    }

    /// Compile the equation and its analytic derivatives with respect to
    /// each entry of `parameters` (in that order). Cached.
    pub fn create_model(
        &self,
        equation: &str,
        parameters: &[String],
    ) -> Result<Arc<NumericModel>, ModelError> {
        let rhs = right_hand_side(equation)?;
        let key = (rhs.clone(), parameters.to_vec());
        if let Some(model) = self.cache.inner.get(&key) {
            return Ok(model.value().clone());
        }

        for name in parameters {
            validate_parameter_name(name)?;
        }
        let expr = parse_expression(&rhs)?;
        for name in expr.free_symbols() {
            if name != INDEPENDENT_VAR && !parameters.contains(&name) {
                return Err(ModelError::InvalidParameter(name));
            }
        }

        let mut vars: Vec<&str> = parameters.iter().map(|p| p.as_str()).collect();
        vars.push(INDEPENDENT_VAR);

        let function = expr.lambdify(&vars);
        let derivatives = parameters
            .iter()
            .map(|p| expr.diff(p).lambdify(&vars))
            .collect();

        let model = Arc::new(NumericModel {
            equation: rhs,
            parameters: parameters.to_vec(),
            function,
            derivatives,
        });
        self.cache.inner.insert(key, model.clone());
        Ok(model)
    }
}

/// Normalize and reduce an equation to its right-hand side. More than one
/// `=` is malformed.
fn right_hand_side(equation: &str) -> Result<String, ModelError> {
    let normalized = normalize(equation);
    let mut parts = normalized.split('=');
    let first = parts.next().unwrap_or_default().to_string();
    match (parts.next(), parts.next()) {
        (None, _) => Ok(first),
        (Some(rhs), None) => Ok(rhs.trim().to_string()),
        (Some(_), Some(_)) => Err(ModelError::Parse(ParseError::MultipleEquals)),
    }
}

fn validate_parameter_name(name: &str) -> Result<(), ModelError> {
    if is_reserved(name) || !PARAM_NAME.is_match(name) {
        return Err(ModelError::InvalidParameter(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_extract_parameters_sorted() {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("b*x+a").unwrap();
        assert_eq!(params, vec!["a", "b"]);
    }

    #[test]
    fn test_extract_parameters_from_equation_with_lhs() {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("y = a*exp(-b*x)+c").unwrap();
        assert_eq!(params, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multiple_equals_rejected() {
        let compiler = ModelCompiler::new();
        assert_eq!(
            compiler.extract_parameters("y = a*x = b"),
            Err(ModelError::Parse(ParseError::MultipleEquals))
        );
    }

    #[test]
    fn test_reserved_parameter_name_rejected() {
        let compiler = ModelCompiler::new();
        // `gamma` is a registry function; as a bare symbol it collides.
        let result = compiler.extract_parameters("gamma*x");
        assert_eq!(result, Err(ModelError::InvalidParameter("gamma".to_string())));
    }

    #[test]
    fn test_undeclared_symbol_rejected_at_compile() {
        let compiler = ModelCompiler::new();
        let result = compiler.create_model("a*x+q", &["a".to_string()]);
        assert_eq!(result, Err(ModelError::InvalidParameter("q".to_string())));
    }

    #[test]
    fn test_model_evaluates_vectorized() {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("a*x+b").unwrap();
        let model = compiler.create_model("a*x+b", &params).unwrap();
        let x = DVector::from_vec(vec![0.0, 1.0, 2.0]);
        let y = model.eval(&[2.0, 1.0], &x);
        assert_eq!(y.as_slice(), &[1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_derivative_order_matches_parameter_order() {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("b*x+a").unwrap();
        let model = compiler.create_model("b*x+a", &params).unwrap();
        let x = DVector::from_vec(vec![3.0, 5.0]);
        // params are [a, b]: d/da = 1, d/db = x
        assert_eq!(model.derivative(0, &[0.0, 0.0], &x).as_slice(), &[1.0, 1.0]);
        assert_eq!(model.derivative(1, &[0.0, 0.0], &x).as_slice(), &[3.0, 5.0]);
    }

    #[test]
    fn test_jacobian_matches_central_difference() {
        let compiler = ModelCompiler::new();
        let equation = "a*exp(-b*x)+c";
        let params = compiler.extract_parameters(equation).unwrap();
        let model = compiler.create_model(equation, &params).unwrap();
        let beta = [1.7, 0.3, 0.5];
        let x = DVector::from_vec(vec![0.0, 0.5, 1.0, 2.0, 4.0]);
        let jac = model.jacobian(&beta, &x);
        let h = 1e-6;
        for k in 0..3 {
            let mut plus = beta.to_vec();
            let mut minus = beta.to_vec();
            plus[k] += h;
            minus[k] -= h;
            let numeric = (model.eval(&plus, &x) - model.eval(&minus, &x)) / (2.0 * h);
            for i in 0..x.len() {
                assert_relative_eq!(jac[(i, k)], numeric[i], max_relative = 1e-4, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_cache_returns_same_artifact() {
        let compiler = ModelCompiler::new();
        let params = compiler.extract_parameters("a*x+b").unwrap();
        let first = compiler.create_model("a*x+b", &params).unwrap();
        let second = compiler.create_model("a * x + b", &params).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.cache().len(), 1);
    }

    #[test]
    fn test_presets_all_compile() {
        let compiler = ModelCompiler::new();
        for (label, equation) in PRESET_MODELS {
            let params = compiler
                .extract_parameters(equation)
                .unwrap_or_else(|e| panic!("preset '{label}' failed: {e}"));
            assert!(!params.is_empty());
            compiler.create_model(equation, &params).unwrap();
        }
    }
}
