//! # Symbolic Engine
//!
//! The expression tree at the heart of the model compiler. An [`Expr`] is
//! built by the parser from normalized equation text, differentiated
//! analytically with respect to each fit parameter, and finally lambdified
//! into numeric closures used by every regression strategy.
//!
//! The tree supports the arithmetic operations plus the unary functions of
//! the registry; all function behavior (numeric evaluation, derivative
//! rules) lives in one place, [`crate::symbolic::registry`].

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;

use crate::symbolic::registry::UnaryFunc;

/// Symbolic expression tree. `Box<Expr>` keeps the recursive variants
/// heap-allocated so arbitrarily deep expressions are representable.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Symbolic variable with a name (the independent variable `x` or a
    /// fit parameter such as `a`, `k0`).
    Var(String),
    /// Numerical constant.
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// Power operation: base ** exponent.
    Pow(Box<Expr>, Box<Expr>),
    /// Application of a registry function to an argument.
    Fun(UnaryFunc, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(val) => write!(f, "{}", val),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exp) => write!(f, "({} ** {})", base, exp),
            Expr::Fun(func, arg) => write!(f, "{}({})", func, arg),
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(self))
    }
}

impl Expr {
    /// Convenience wrapper for the recursive variants.
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::Pow(self.boxed(), rhs.boxed())
    }

    pub fn fun(func: UnaryFunc, arg: Expr) -> Expr {
        Expr::Fun(func, arg.boxed())
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(val) if *val == 0.0)
    }

    /// Names of all variables appearing in the expression, sorted
    /// lexicographically and de-duplicated. This ordering is the single
    /// source of truth for positional parameter correspondence downstream.
    pub fn free_symbols(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_symbols(&mut names);
        names.into_iter().sorted().dedup().collect()
    }

    fn collect_symbols(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var(name) => out.push(name.clone()),
            Expr::Const(_) => {}
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Fun(_, arg) => arg.collect_symbols(out),
        }
    }

    pub fn contains_variable(&self, var_name: &str) -> bool {
        match self {
            Expr::Var(name) => name == var_name,
            Expr::Const(_) => false,
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.contains_variable(var_name) || rhs.contains_variable(var_name)
            }
            Expr::Fun(_, arg) => arg.contains_variable(var_name),
        }
    }

    /// Direct evaluation against a variable map, without building a
    /// closure. Unknown variables evaluate to NaN.
    pub fn eval(&self, vars: &HashMap<String, f64>) -> f64 {
        match self {
            Expr::Var(name) => vars.get(name).copied().unwrap_or(f64::NAN),
            Expr::Const(val) => *val,
            Expr::Add(lhs, rhs) => lhs.eval(vars) + rhs.eval(vars),
            Expr::Sub(lhs, rhs) => lhs.eval(vars) - rhs.eval(vars),
            Expr::Mul(lhs, rhs) => lhs.eval(vars) * rhs.eval(vars),
            Expr::Div(lhs, rhs) => lhs.eval(vars) / rhs.eval(vars),
            Expr::Pow(base, exp) => base.eval(vars).powf(exp.eval(vars)),
            Expr::Fun(func, arg) => func.eval(arg.eval(vars)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_overloads() {
        let x = Expr::var("x");
        let expr = x.clone() * x.clone() + Expr::Const(2.0) * x - Expr::Const(1.0);
        let vars = HashMap::from([("x".to_string(), 3.0)]);
        assert_eq!(expr.eval(&vars), 14.0); // 9 + 6 - 1
    }

    #[test]
    fn test_free_symbols_sorted_and_deduped() {
        let expr = Expr::var("b") * Expr::var("x") + Expr::var("a") + Expr::var("b");
        assert_eq!(expr.free_symbols(), vec!["a", "b", "x"]);
    }

    #[test]
    fn test_display_roundtrips_function_names() {
        let expr = Expr::fun(UnaryFunc::Asin, Expr::var("x"));
        assert_eq!(expr.to_string(), "asin(x)");
        let expr = Expr::fun(UnaryFunc::Log10, Expr::var("x"));
        assert_eq!(expr.to_string(), "log10(x)");
    }

    #[test]
    fn test_eval_function_application() {
        let expr = Expr::fun(UnaryFunc::Exp, Expr::Const(0.0)) + Expr::Const(1.0);
        assert_eq!(expr.eval(&HashMap::new()), 2.0);
    }

    #[test]
    fn test_contains_variable() {
        let expr = Expr::fun(UnaryFunc::Sin, Expr::var("x") * Expr::var("a"));
        assert!(expr.contains_variable("x"));
        assert!(expr.contains_variable("a"));
        assert!(!expr.contains_variable("b"));
    }
}
