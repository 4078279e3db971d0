//! # Function Registry
//!
//! Single source of truth for every function and constant the expression
//! layer understands. The normalizer, the parser and the differentiation
//! rules all consult this table, so a name recognized in one place is
//! recognized everywhere.

use std::f64::consts::PI;

use strum_macros::{Display, EnumIter};

/// Unary functions supported by the symbolic engine.
///
/// The `strum` display form is the canonical lowercase spelling used when
/// printing expressions (`Asin` prints as `asin`, `Log10` as `log10`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryFunc {
    Sin,
    Cos,
    Tan,
    Cot,
    Sec,
    Csc,
    Asin,
    Acos,
    Atan,
    Acot,
    Sinh,
    Cosh,
    Tanh,
    Coth,
    Asinh,
    Acosh,
    Atanh,
    Acoth,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Cbrt,
    Square,
    Abs,
    Sign,
    Floor,
    Ceil,
    Erf,
    Erfc,
    Gamma,
    Heaviside,
}

impl UnaryFunc {
    /// Numeric evaluation of the function at `v`.
    pub fn eval(&self, v: f64) -> f64 {
        match self {
            UnaryFunc::Sin => v.sin(),
            UnaryFunc::Cos => v.cos(),
            UnaryFunc::Tan => v.tan(),
            UnaryFunc::Cot => 1.0 / v.tan(),
            UnaryFunc::Sec => 1.0 / v.cos(),
            UnaryFunc::Csc => 1.0 / v.sin(),
            UnaryFunc::Asin => v.asin(),
            UnaryFunc::Acos => v.acos(),
            UnaryFunc::Atan => v.atan(),
            UnaryFunc::Acot => PI / 2.0 - v.atan(),
            UnaryFunc::Sinh => v.sinh(),
            UnaryFunc::Cosh => v.cosh(),
            UnaryFunc::Tanh => v.tanh(),
            UnaryFunc::Coth => 1.0 / v.tanh(),
            UnaryFunc::Asinh => v.asinh(),
            UnaryFunc::Acosh => v.acosh(),
            UnaryFunc::Atanh => v.atanh(),
            UnaryFunc::Acoth => (1.0 / v).atanh(),
            UnaryFunc::Exp => v.exp(),
            UnaryFunc::Ln => v.ln(),
            UnaryFunc::Log10 => v.log10(),
            UnaryFunc::Log2 => v.log2(),
            UnaryFunc::Sqrt => v.sqrt(),
            UnaryFunc::Cbrt => v.cbrt(),
            UnaryFunc::Square => v * v,
            UnaryFunc::Abs => v.abs(),
            UnaryFunc::Sign => {
                if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            UnaryFunc::Floor => v.floor(),
            UnaryFunc::Ceil => v.ceil(),
            UnaryFunc::Erf => erf(v),
            UnaryFunc::Erfc => 1.0 - erf(v),
            UnaryFunc::Gamma => gamma(v),
            UnaryFunc::Heaviside => {
                if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    0.0
                } else {
                    0.5
                }
            }
        }
    }
}

/// Registry entry for one function: canonical name, alternate spellings
/// accepted by the parser, and the Portuguese spellings the normalizer
/// rewrites to the canonical name.
pub struct FunctionDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub portuguese: &'static [&'static str],
    pub func: UnaryFunc,
}

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "sin", aliases: &[], portuguese: &["sen"], func: UnaryFunc::Sin },
    FunctionDef { name: "cos", aliases: &[], portuguese: &[], func: UnaryFunc::Cos },
    FunctionDef { name: "tan", aliases: &[], portuguese: &["tg"], func: UnaryFunc::Tan },
    FunctionDef { name: "cot", aliases: &[], portuguese: &["cotg"], func: UnaryFunc::Cot },
    FunctionDef { name: "sec", aliases: &[], portuguese: &[], func: UnaryFunc::Sec },
    FunctionDef { name: "csc", aliases: &[], portuguese: &[], func: UnaryFunc::Csc },
    FunctionDef {
        name: "asin",
        aliases: &["arcsin"],
        portuguese: &["arcsen"],
        func: UnaryFunc::Asin,
    },
    FunctionDef { name: "acos", aliases: &["arccos"], portuguese: &[], func: UnaryFunc::Acos },
    FunctionDef {
        name: "atan",
        aliases: &["arctan"],
        portuguese: &["arctg"],
        func: UnaryFunc::Atan,
    },
    FunctionDef {
        name: "acot",
        aliases: &["arccot"],
        portuguese: &["arccotg"],
        func: UnaryFunc::Acot,
    },
    FunctionDef { name: "sinh", aliases: &[], portuguese: &["senh"], func: UnaryFunc::Sinh },
    FunctionDef { name: "cosh", aliases: &[], portuguese: &[], func: UnaryFunc::Cosh },
    FunctionDef { name: "tanh", aliases: &[], portuguese: &["tgh"], func: UnaryFunc::Tanh },
    FunctionDef { name: "coth", aliases: &[], portuguese: &[], func: UnaryFunc::Coth },
    FunctionDef {
        name: "asinh",
        aliases: &["arcsinh"],
        portuguese: &["arcsenh"],
        func: UnaryFunc::Asinh,
    },
    FunctionDef { name: "acosh", aliases: &["arccosh"], portuguese: &[], func: UnaryFunc::Acosh },
    FunctionDef { name: "atanh", aliases: &["arctanh"], portuguese: &[], func: UnaryFunc::Atanh },
    FunctionDef { name: "acoth", aliases: &["arccoth"], portuguese: &[], func: UnaryFunc::Acoth },
    FunctionDef { name: "exp", aliases: &[], portuguese: &[], func: UnaryFunc::Exp },
    FunctionDef { name: "ln", aliases: &["log"], portuguese: &[], func: UnaryFunc::Ln },
    FunctionDef { name: "log10", aliases: &[], portuguese: &[], func: UnaryFunc::Log10 },
    FunctionDef { name: "log2", aliases: &[], portuguese: &[], func: UnaryFunc::Log2 },
    FunctionDef { name: "sqrt", aliases: &[], portuguese: &["raiz"], func: UnaryFunc::Sqrt },
    FunctionDef { name: "cbrt", aliases: &[], portuguese: &[], func: UnaryFunc::Cbrt },
    FunctionDef { name: "square", aliases: &[], portuguese: &[], func: UnaryFunc::Square },
    FunctionDef { name: "abs", aliases: &[], portuguese: &[], func: UnaryFunc::Abs },
    FunctionDef { name: "sign", aliases: &[], portuguese: &[], func: UnaryFunc::Sign },
    FunctionDef { name: "floor", aliases: &[], portuguese: &[], func: UnaryFunc::Floor },
    FunctionDef { name: "ceil", aliases: &[], portuguese: &[], func: UnaryFunc::Ceil },
    FunctionDef { name: "erf", aliases: &[], portuguese: &[], func: UnaryFunc::Erf },
    FunctionDef { name: "erfc", aliases: &[], portuguese: &[], func: UnaryFunc::Erfc },
    FunctionDef { name: "gamma", aliases: &[], portuguese: &[], func: UnaryFunc::Gamma },
    FunctionDef { name: "heaviside", aliases: &[], portuguese: &[], func: UnaryFunc::Heaviside },
];

/// Named constants resolved at parse time.
pub static CONSTANTS: &[(&str, f64)] =
    &[("pi", PI), ("e", std::f64::consts::E), ("inf", f64::INFINITY), ("infinity", f64::INFINITY)];

/// Resolve a function name (canonical or alias) to its function tag.
pub fn lookup_function(name: &str) -> Option<UnaryFunc> {
    FUNCTIONS
        .iter()
        .find(|def| def.name == name || def.aliases.contains(&name))
        .map(|def| def.func)
}

/// Resolve a constant name to its value.
pub fn lookup_constant(name: &str) -> Option<f64> {
    CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// True when `name` collides with any function or constant spelling
/// (canonical, alias or Portuguese); such names are not valid parameters.
pub fn is_reserved(name: &str) -> bool {
    lookup_function(name).is_some()
        || lookup_constant(name).is_some()
        || FUNCTIONS.iter().any(|def| def.portuguese.contains(&name))
}

/// Every spelling the parser accepts, longest first, for tokenizing and
/// implicit-multiplication matching.
pub fn parser_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = FUNCTIONS
        .iter()
        .flat_map(|def| std::iter::once(def.name).chain(def.aliases.iter().copied()))
        .collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    names
}

/// Abramowitz & Stegun 7.1.26 rational approximation, |error| < 1.5e-7.
fn erf(v: f64) -> f64 {
    let sign = if v < 0.0 { -1.0 } else { 1.0 };
    let v = v.abs();
    let t = 1.0 / (1.0 + 0.3275911 * v);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-v * v).exp())
}

/// Lanczos approximation (g = 7, n = 9) with the reflection formula for
/// the negative half-axis.
fn gamma(v: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if v < 0.5 {
        PI / ((PI * v).sin() * gamma(1.0 - v))
    } else {
        let v = v - 1.0;
        let mut acc = COEFFS[0];
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            acc += c / (v + i as f64);
        }
        let t = v + G + 0.5;
        (2.0 * PI).sqrt() * t.powf(v + 0.5) * (-t).exp() * acc
    }
}
