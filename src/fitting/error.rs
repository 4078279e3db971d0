//! Error taxonomy of the fitting core. Compiler errors surface before any
//! fitting is attempted; `FittingFailure` is raised only after a
//! strategy's documented fallback chain has been exhausted.

use std::fmt;

use crate::symbolic::parse_expr::ParseError;

/// Errors raised while compiling an equation into a numeric model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Malformed expression text (includes undefined functions).
    Parse(ParseError),
    /// A free symbol that collides with a registry name or does not match
    /// the `letter (letter|digit)*` naming pattern.
    InvalidParameter(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::Parse(err) => write!(f, "{}", err),
            ModelError::InvalidParameter(name) => {
                write!(f, "invalid parameter name '{}'", name)
            }
        }
    }
}

impl std::error::Error for ModelError {}

impl From<ParseError> for ModelError {
    fn from(err: ParseError) -> Self {
        ModelError::Parse(err)
    }
}

/// Errors raised while fitting a compiled model to data.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// The underlying optimizer raised or failed to converge after the
    /// documented fallbacks were tried. User-actionable (bad initial
    /// guess, ill-posed model), not a system fault.
    FittingFailure(String),
    /// Shape or length violations at the input boundary.
    InvalidInput(String),
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FitError::FittingFailure(msg) => write!(f, "fitting failed: {}", msg),
            FitError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for FitError {}
