//! # Lambdification
//!
//! Converts symbolic expressions into executable closures. The closure is
//! assembled once, by recursive composition over the tree; evaluation does
//! no parsing, hashing or name lookup — variables are resolved to slice
//! indices at build time.

use crate::symbolic::symbolic_engine::Expr;

impl Expr {
    /// Compile the expression into a closure over a flat argument slice.
    ///
    /// `vars` fixes the positional meaning of the slice: argument `i`
    /// supplies the value of `vars[i]`. Every variable appearing in the
    /// expression must be present in `vars`; the model compiler validates
    /// this before lambdifying.
    pub fn lambdify(&self, vars: &[&str]) -> Box<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        match self {
            Expr::Var(name) => {
                let index = vars
                    .iter()
                    .position(|v| v == name)
                    .unwrap_or_else(|| panic!("unbound variable '{}' in lambdify", name));
                Box::new(move |args| args[index])
            }
            Expr::Const(val) => {
                let val = *val;
                Box::new(move |_| val)
            }
            Expr::Add(lhs, rhs) => {
                let lf = lhs.lambdify(vars);
                let rf = rhs.lambdify(vars);
                Box::new(move |args| lf(args) + rf(args))
            }
            Expr::Sub(lhs, rhs) => {
                let lf = lhs.lambdify(vars);
                let rf = rhs.lambdify(vars);
                Box::new(move |args| lf(args) - rf(args))
            }
            Expr::Mul(lhs, rhs) => {
                let lf = lhs.lambdify(vars);
                let rf = rhs.lambdify(vars);
                Box::new(move |args| lf(args) * rf(args))
            }
            Expr::Div(lhs, rhs) => {
                let lf = lhs.lambdify(vars);
                let rf = rhs.lambdify(vars);
                Box::new(move |args| lf(args) / rf(args))
            }
            Expr::Pow(base, exp) => {
                let bf = base.lambdify(vars);
                let ef = exp.lambdify(vars);
                Box::new(move |args| bf(args).powf(ef(args)))
            }
            Expr::Fun(func, arg) => {
                let func = *func;
                let af = arg.lambdify(vars);
                Box::new(move |args| func.eval(af(args)))
            }
        }
    }

    /// Single-variable convenience wrapper used by plotting helpers and
    /// tests. Panics when the expression has more than one free symbol.
    pub fn lambdify1d(&self) -> Box<dyn Fn(f64) -> f64 + Send + Sync> {
        let vars = self.free_symbols();
        match vars.len() {
            0 => {
                let f = self.lambdify(&[]);
                Box::new(move |_| f(&[]))
            }
            1 => {
                let name = vars[0].clone();
                let f = self.lambdify(&[name.as_str()]);
                Box::new(move |x| f(&[x]))
            }
            _ => panic!(
                "lambdify1d requires at most one free variable, found: {:?}",
                vars
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse_expr::parse_expression;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_lambdify_polynomial() {
        let expr = parse_expression("x**2+2*x+1").unwrap();
        let f = expr.lambdify1d();
        assert_eq!(f(3.0), 16.0);
    }

    #[test]
    fn test_lambdify_multiple_variables() {
        let expr = parse_expression("a*exp(-b*x)+c").unwrap();
        let f = expr.lambdify(&["a", "b", "c", "x"]);
        assert_relative_eq!(f(&[2.0, 0.5, 1.0, 0.0]), 3.0, epsilon = 1e-12);
        assert_relative_eq!(
            f(&[2.0, 0.5, 1.0, 2.0]),
            2.0 * (-1.0f64).exp() + 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_lambdify_trigonometric() {
        let expr = parse_expression("sin(x)").unwrap();
        let f = expr.lambdify1d();
        assert_relative_eq!(f(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(f(PI / 2.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lambdify_constant_expression() {
        let expr = parse_expression("2*pi").unwrap();
        let f = expr.lambdify1d();
        assert_relative_eq!(f(123.0), 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_normalized_text_evaluates_correctly() {
        // normalize("2sin(x)+3x") must evaluate to 0 at x=0 and 2 at pi/2.
        let text = crate::symbolic::normalize::normalize("2sin(x)+3x");
        let expr = parse_expression(&text).unwrap();
        let f = expr.lambdify1d();
        assert_relative_eq!(f(0.0), 0.0, epsilon = 1e-12);
        // sine term contributes exactly 2 on top of the linear term
        assert_relative_eq!(f(PI / 2.0) - 3.0 * PI / 2.0, 2.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "lambdify1d requires at most one free variable")]
    fn test_lambdify1d_rejects_multivariate() {
        let expr = parse_expression("x+y").unwrap();
        let _ = expr.lambdify1d();
    }
}
