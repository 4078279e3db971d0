//! # Analytic Differentiation
//!
//! Recursive differentiation rules over the expression tree: sum, product
//! and quotient rules for the arithmetic variants, the generalized power
//! rule for `**`, and the chain rule through every registry function.
//!
//! The model compiler differentiates the fitted equation once per
//! parameter (never with respect to `x`), and the resulting trees are
//! lambdified into the analytic Jacobian used by the optimizers.

use crate::symbolic::registry::UnaryFunc;
use crate::symbolic::symbolic_engine::Expr;

impl Expr {
    /// Analytical partial derivative with respect to `var`.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Var(name) => {
                if name == var {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Add(lhs, rhs) => Expr::Add(lhs.diff(var).boxed(), rhs.diff(var).boxed()),
            Expr::Sub(lhs, rhs) => Expr::Sub(lhs.diff(var).boxed(), rhs.diff(var).boxed()),
            Expr::Mul(lhs, rhs) => Expr::Add(
                Expr::Mul(lhs.diff(var).boxed(), rhs.clone()).boxed(),
                Expr::Mul(lhs.clone(), rhs.diff(var).boxed()).boxed(),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Expr::Sub(
                    Expr::Mul(lhs.diff(var).boxed(), rhs.clone()).boxed(),
                    Expr::Mul(rhs.diff(var).boxed(), lhs.clone()).boxed(),
                )
                .boxed(),
                Expr::Mul(rhs.clone(), rhs.clone()).boxed(),
            ),
            Expr::Pow(base, exp) => {
                if exp.contains_variable(var) {
                    // General case: d(u^v) = u^v * (v' ln u + v u'/u)
                    let u = base.clone();
                    let v = exp.clone();
                    let term = Expr::Add(
                        Expr::Mul(
                            v.diff(var).boxed(),
                            Expr::Fun(UnaryFunc::Ln, u.clone()).boxed(),
                        )
                        .boxed(),
                        Expr::Div(Expr::Mul(v.clone(), base.diff(var).boxed()).boxed(), u.clone())
                            .boxed(),
                    );
                    Expr::Mul(self.clone().boxed(), term.boxed())
                } else {
                    // Power rule: d(u^c) = c * u^(c-1) * u'
                    Expr::Mul(
                        Expr::Mul(
                            exp.clone(),
                            Expr::Pow(
                                base.clone(),
                                Expr::Sub(exp.clone(), Expr::Const(1.0).boxed()).boxed(),
                            )
                            .boxed(),
                        )
                        .boxed(),
                        base.diff(var).boxed(),
                    )
                }
            }
            Expr::Fun(func, arg) => {
                // Chain rule: (f(u))' = f'(u) * u'
                Expr::Mul(func.diff_outer(arg).boxed(), arg.diff(var).boxed())
            }
        }
    }
}

impl UnaryFunc {
    /// Derivative of the function with respect to its argument, as an
    /// expression in the argument (the chain-rule factor `u'` is applied
    /// by [`Expr::diff`]).
    pub fn diff_outer(&self, u: &Expr) -> Expr {
        let u = u.clone();
        let f = |func: UnaryFunc, arg: Expr| Expr::Fun(func, arg.boxed());
        match self {
            UnaryFunc::Sin => f(UnaryFunc::Cos, u),
            UnaryFunc::Cos => -f(UnaryFunc::Sin, u),
            UnaryFunc::Tan => Expr::Const(1.0) / f(UnaryFunc::Cos, u).pow(Expr::Const(2.0)),
            UnaryFunc::Cot => Expr::Const(-1.0) / f(UnaryFunc::Sin, u).pow(Expr::Const(2.0)),
            UnaryFunc::Sec => f(UnaryFunc::Sec, u.clone()) * f(UnaryFunc::Tan, u),
            UnaryFunc::Csc => -(f(UnaryFunc::Csc, u.clone()) * f(UnaryFunc::Cot, u)),
            UnaryFunc::Asin => {
                Expr::Const(1.0)
                    / f(
                        UnaryFunc::Sqrt,
                        Expr::Const(1.0) - u.pow(Expr::Const(2.0)),
                    )
            }
            UnaryFunc::Acos => {
                Expr::Const(-1.0)
                    / f(
                        UnaryFunc::Sqrt,
                        Expr::Const(1.0) - u.pow(Expr::Const(2.0)),
                    )
            }
            UnaryFunc::Atan => Expr::Const(1.0) / (Expr::Const(1.0) + u.pow(Expr::Const(2.0))),
            UnaryFunc::Acot => Expr::Const(-1.0) / (Expr::Const(1.0) + u.pow(Expr::Const(2.0))),
            UnaryFunc::Sinh => f(UnaryFunc::Cosh, u),
            UnaryFunc::Cosh => f(UnaryFunc::Sinh, u),
            UnaryFunc::Tanh => Expr::Const(1.0) / f(UnaryFunc::Cosh, u).pow(Expr::Const(2.0)),
            UnaryFunc::Coth => Expr::Const(-1.0) / f(UnaryFunc::Sinh, u).pow(Expr::Const(2.0)),
            UnaryFunc::Asinh => {
                Expr::Const(1.0)
                    / f(
                        UnaryFunc::Sqrt,
                        u.pow(Expr::Const(2.0)) + Expr::Const(1.0),
                    )
            }
            UnaryFunc::Acosh => {
                Expr::Const(1.0)
                    / f(
                        UnaryFunc::Sqrt,
                        u.pow(Expr::Const(2.0)) - Expr::Const(1.0),
                    )
            }
            UnaryFunc::Atanh => Expr::Const(1.0) / (Expr::Const(1.0) - u.pow(Expr::Const(2.0))),
            UnaryFunc::Acoth => Expr::Const(1.0) / (Expr::Const(1.0) - u.pow(Expr::Const(2.0))),
            UnaryFunc::Exp => f(UnaryFunc::Exp, u),
            UnaryFunc::Ln => Expr::Const(1.0) / u,
            UnaryFunc::Log10 => Expr::Const(1.0) / (u * Expr::Const(std::f64::consts::LN_10)),
            UnaryFunc::Log2 => Expr::Const(1.0) / (u * Expr::Const(std::f64::consts::LN_2)),
            UnaryFunc::Sqrt => {
                Expr::Const(1.0) / (Expr::Const(2.0) * f(UnaryFunc::Sqrt, u))
            }
            UnaryFunc::Cbrt => {
                Expr::Const(1.0)
                    / (Expr::Const(3.0) * f(UnaryFunc::Cbrt, u).pow(Expr::Const(2.0)))
            }
            UnaryFunc::Square => Expr::Const(2.0) * u,
            UnaryFunc::Abs => f(UnaryFunc::Sign, u),
            // Piecewise-constant functions: zero almost everywhere.
            UnaryFunc::Sign | UnaryFunc::Floor | UnaryFunc::Ceil | UnaryFunc::Heaviside => {
                Expr::Const(0.0)
            }
            UnaryFunc::Erf => {
                Expr::Const(2.0 / std::f64::consts::PI.sqrt())
                    * f(UnaryFunc::Exp, -(u.pow(Expr::Const(2.0))))
            }
            UnaryFunc::Erfc => {
                Expr::Const(-2.0 / std::f64::consts::PI.sqrt())
                    * f(UnaryFunc::Exp, -(u.pow(Expr::Const(2.0))))
            }
            // The digamma family is not represented in the tree; a central
            // difference on the tree keeps diff total (error O(h^2)).
            UnaryFunc::Gamma => {
                let h = 1e-6;
                (f(UnaryFunc::Gamma, u.clone() + Expr::Const(h))
                    - f(UnaryFunc::Gamma, u - Expr::Const(h)))
                    / Expr::Const(2.0 * h)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse_expr::parse_expression;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use strum::IntoEnumIterator;

    fn diff_matches_numeric(expr: &Expr, var: &str, at: &[(&str, f64)], tol: f64) {
        let analytic = expr.diff(var);
        let mut vars: HashMap<String, f64> =
            at.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let x0 = vars[var];
        let h = 1e-6 * (1.0 + x0.abs());
        vars.insert(var.to_string(), x0 + h);
        let fp = expr.eval(&vars);
        vars.insert(var.to_string(), x0 - h);
        let fm = expr.eval(&vars);
        vars.insert(var.to_string(), x0);
        let numeric = (fp - fm) / (2.0 * h);
        let value = analytic.eval(&vars);
        assert_relative_eq!(value, numeric, max_relative = tol, epsilon = tol);
    }

    #[test]
    fn test_polynomial_derivative() {
        let expr = parse_expression("x**3+2*x").unwrap();
        let vars = HashMap::from([("x".to_string(), 2.0)]);
        assert_relative_eq!(expr.diff("x").eval(&vars), 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_derivative_ignores_other_vars() {
        let expr = parse_expression("a*x+b").unwrap();
        let vars =
            HashMap::from([("a".to_string(), 3.0), ("b".to_string(), 1.0), ("x".to_string(), 7.0)]);
        assert_eq!(expr.diff("a").eval(&vars), 7.0);
        assert_eq!(expr.diff("b").eval(&vars), 1.0);
    }

    #[test]
    fn test_exponential_chain_rule() {
        // d/db [a*exp(b*x)] = a*x*exp(b*x)
        let expr = parse_expression("a*exp(b*x)").unwrap();
        let vars = HashMap::from([
            ("a".to_string(), 2.0),
            ("b".to_string(), 0.5),
            ("x".to_string(), 1.5),
        ]);
        let expected = 2.0 * 1.5 * (0.5f64 * 1.5).exp();
        assert_relative_eq!(expr.diff("b").eval(&vars), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_variable_exponent() {
        // d/db [x**b] = x**b * ln(x)
        let expr = parse_expression("x**b").unwrap();
        let vars = HashMap::from([("b".to_string(), 2.0), ("x".to_string(), 3.0)]);
        assert_relative_eq!(expr.diff("b").eval(&vars), 9.0 * 3.0f64.ln(), max_relative = 1e-12);
    }

    #[test]
    fn test_every_function_against_central_difference() {
        for func in UnaryFunc::iter() {
            // Stay inside every domain: acosh/acoth need |u| > 1.
            let at = match func {
                UnaryFunc::Acosh | UnaryFunc::Acoth => 1.7,
                _ => 0.6,
            };
            // Skip piecewise-constant functions; their derivative is 0 by
            // convention, not by limit.
            if matches!(
                func,
                UnaryFunc::Sign | UnaryFunc::Floor | UnaryFunc::Ceil | UnaryFunc::Heaviside
            ) {
                continue;
            }
            let expr = Expr::fun(func, Expr::var("x"));
            diff_matches_numeric(&expr, "x", &[("x", at)], 1e-4);
        }
    }

    #[test]
    fn test_quotient_rule() {
        let expr = parse_expression("sin(x)/x").unwrap();
        diff_matches_numeric(&expr, "x", &[("x", 1.3)], 1e-6);
    }
}
