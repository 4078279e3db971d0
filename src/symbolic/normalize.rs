//! # Expression Normalizer
//!
//! Pure string-to-string rewriting that turns hand-typed equations into
//! the canonical form the parser accepts: whitespace removed, Portuguese
//! function spellings replaced by canonical names, `^` rewritten to `**`,
//! and every implicit multiplication made explicit (`2sin(x)` becomes
//! `2*sin(x)`, `3x` becomes `3*x`, `(x+1)(x-1)` becomes `(x+1)*(x-1)`).
//!
//! The transform is total (never fails) and idempotent. Function names are
//! matched longest-first against the registry so that e.g. `arcsin` is
//! never mis-split into `arc` and `sin`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::symbolic::registry::{FUNCTIONS, parser_names};

// Recognized function calls are replaced by single placeholder characters
// from the private use area while the insertion patterns run, so that no
// pattern can ever split a multi-character function name. The placeholder
// at MASK_BASE + i stands for FUNCTIONS[i].
const MASK_BASE: u32 = 0xE100;

fn mask_char(def_index: usize) -> char {
    char::from_u32(MASK_BASE + def_index as u32).unwrap()
}

lazy_static! {
    /// (pattern, canonical replacement) for each Portuguese spelling,
    /// longest spelling first. The left guard accepts a digit before the
    /// alias (`2sen(` must still alias) while refusing a letter (`xsen`
    /// is an identifier, not a function call).
    static ref PORTUGUESE: Vec<(Regex, String)> = {
        let mut aliases: Vec<(&str, &str)> = FUNCTIONS
            .iter()
            .flat_map(|def| def.portuguese.iter().map(move |pt| (*pt, def.name)))
            .collect();
        aliases.sort_by_key(|(pt, _)| std::cmp::Reverse(pt.len()));
        aliases
            .into_iter()
            .map(|(pt, name)| {
                let re = Regex::new(&format!(r"(^|[^A-Za-z]){pt}\b")).unwrap();
                (re, format!("${{1}}{name}"))
            })
            .collect()
    };

    /// Alternation over every parser-recognized spelling, longest first.
    static ref NAME_ALTERNATION: String = parser_names().join("|");

    /// digit immediately followed by a function call: `2sin(` -> `2*sin(`.
    static ref DIGIT_FUNC: Regex =
        Regex::new(&format!(r"(\d)((?:{})\()", &*NAME_ALTERNATION)).unwrap();

    /// a recognized function call, to be masked.
    static ref FUNC_CALL: Regex =
        Regex::new(&format!(r"\b((?:{}))\(", &*NAME_ALTERNATION)).unwrap();

    /// digit followed by a letter: `3x` -> `3*x` (function names are
    /// masked by now, so this can no longer corrupt a call).
    static ref DIGIT_LETTER: Regex = Regex::new(r"(\d)([a-zA-Z])").unwrap();

    /// single-letter variable followed by `(`: `x(` -> `x*(`.
    static ref LETTER_PAREN: Regex = Regex::new(r"\b([a-zA-Z])\(").unwrap();

    /// `)(` -> `)*(`.
    static ref PAREN_PAREN: Regex = Regex::new(r"\)\(").unwrap();

    /// `)` followed by a letter or digit: `)x` -> `)*x`.
    static ref PAREN_LETTER: Regex = Regex::new(r"\)([0-9A-Za-z])").unwrap();

    /// digit followed by `(`: `2(` -> `2*(`.
    static ref DIGIT_PAREN: Regex = Regex::new(r"(\d)\(").unwrap();

    /// `)` followed by a masked function call: `sin(x)cos(` needs a `*`.
    static ref PAREN_FUNC: Regex = Regex::new(r"\)([\x{E100}-\x{E1FF}])").unwrap();
}

/// Normalize a raw equation string into canonical parser input.
pub fn normalize(expression: &str) -> String {
    if expression.is_empty() {
        return String::new();
    }

    let mut expr: String = expression.chars().filter(|c| !c.is_whitespace()).collect();

    for (re, replacement) in PORTUGUESE.iter() {
        expr = re.replace_all(&expr, replacement.as_str()).into_owned();
    }

    expr = expr.replace('^', "**");

    expr = DIGIT_FUNC.replace_all(&expr, "$1*$2").into_owned();

    // Mask recognized calls, run the insertion patterns, unmask.
    expr = FUNC_CALL
        .replace_all(&expr, |caps: &regex::Captures| {
            let name = caps.get(1).unwrap().as_str();
            let idx = FUNCTIONS
                .iter()
                .position(|def| def.name == name || def.aliases.contains(&name))
                .unwrap();
            format!("{}(", mask_char(idx))
        })
        .into_owned();

    expr = DIGIT_LETTER.replace_all(&expr, "$1*$2").into_owned();
    expr = LETTER_PAREN.replace_all(&expr, "$1*(").into_owned();
    expr = PAREN_PAREN.replace_all(&expr, ")*(").into_owned();
    expr = PAREN_LETTER.replace_all(&expr, ")*$1").into_owned();
    expr = DIGIT_PAREN.replace_all(&expr, "$1*(").into_owned();
    expr = PAREN_FUNC.replace_all(&expr, ")*$1").into_owned();

    expr.chars()
        .map(|c| {
            let code = c as u32;
            if (MASK_BASE..MASK_BASE + FUNCTIONS.len() as u32).contains(&code) {
                FUNCTIONS[(code - MASK_BASE) as usize].name.to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_power() {
        assert_eq!(normalize("a * x ^ 2 + b"), "a*x**2+b");
    }

    #[test]
    fn test_digit_function() {
        assert_eq!(normalize("2sin(x)"), "2*sin(x)");
        assert_eq!(normalize("10exp(-x)"), "10*exp(-x)");
    }

    #[test]
    fn test_digit_variable() {
        assert_eq!(normalize("3x"), "3*x");
        assert_eq!(normalize("2a+3b"), "2*a+3*b");
    }

    #[test]
    fn test_longest_function_name_wins() {
        assert_eq!(normalize("2arcsin(x)"), "2*asin(x)");
        assert_eq!(normalize("3asinh(x)"), "3*asinh(x)");
    }

    #[test]
    fn test_adjacent_parentheses() {
        assert_eq!(normalize("(x+1)(x-1)"), "(x+1)*(x-1)");
        assert_eq!(normalize("x(x+1)"), "x*(x+1)");
        assert_eq!(normalize("2(x+1)"), "2*(x+1)");
    }

    #[test]
    fn test_function_times_function() {
        assert_eq!(normalize("sin(x)cos(x)"), "sin(x)*cos(x)");
    }

    #[test]
    fn test_paren_followed_by_symbol() {
        assert_eq!(normalize("(x+1)y"), "(x+1)*y");
        assert_eq!(normalize("sin(x)2"), "sin(x)*2");
        assert_eq!(normalize("sin(x)x"), "sin(x)*x");
    }

    #[test]
    fn test_portuguese_aliases() {
        assert_eq!(normalize("sen(x)"), "sin(x)");
        assert_eq!(normalize("2sen(x)"), "2*sin(x)");
        assert_eq!(normalize("arcsen(x)"), "asin(x)");
        assert_eq!(normalize("tg(x)+senh(x)"), "tan(x)+sinh(x)");
        assert_eq!(normalize("a*sen(b*x)"), "a*sin(b*x)");
    }

    #[test]
    fn test_alias_inside_identifier_untouched() {
        // `xsen` is an identifier, not a Portuguese sine.
        assert_eq!(normalize("xsen*2"), "xsen*2");
    }

    #[test]
    fn test_log2_call_not_split() {
        assert_eq!(normalize("log2(x)"), "log2(x)");
        assert_eq!(normalize("2log10(x)"), "2*log10(x)");
    }

    #[test]
    fn test_idempotence() {
        let cases = [
            "a*exp(-b*x)+c",
            "2sin(x)+3x",
            "(x+1)(x-1)sin(x)",
            "sen(a x) + 10cos(b)",
            "a*x^2 + b*x + c",
            "log2(x)heaviside(x)",
        ];
        for case in cases {
            let once = normalize(case);
            assert_eq!(normalize(&once), once, "not idempotent for {case}");
        }
    }

    #[test]
    fn test_mixed_function_and_variable_products() {
        assert_eq!(normalize("2sin(x)+3x"), "2*sin(x)+3*x");
    }

    #[test]
    fn test_constants_get_separated() {
        assert_eq!(normalize("2pi*x"), "2*pi*x");
        assert_eq!(normalize("3e"), "3*e");
    }
}
