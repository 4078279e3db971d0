//! # Expression Parser
//!
//! Turns normalized equation text (see [`crate::symbolic::normalize`])
//! into an [`Expr`] tree. Operators are split outside brackets, lowest
//! precedence first: the rightmost `+`/`-`, then the rightmost `*`/`/`,
//! then the leftmost `**` (power is right-associative), then function
//! calls, constants and variables.
//
//                  search recursion diagram
//                "y**2+exp(x)+ln(x)/y"             |
//                |       left   | right            |
//                |_________________________________|
//                |        split at rightmost +     |
//                |_________________________________|
//                | y**2+exp(x)  |  ln(x)/y         |
//                |      |       |      |           |
//                |     \|/      |     \|/          |
//                |  split at +  |  split at /      |
//                |______________|__________________|
//                |  y**2|exp(x) | ln(x) | y        |
//                |   etc...     |                  |

use std::fmt;

use crate::symbolic::registry::{lookup_constant, lookup_function};
use crate::symbolic::symbolic_engine::Expr;

/// Errors produced while parsing normalized expression text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Text that matches no production (empty operand, stray operator...).
    Malformed(String),
    UnbalancedParentheses,
    DisallowedCharacter(char),
    /// More than one `=` in the equation.
    MultipleEquals,
    /// An identifier applied to `(` that is not in the function registry.
    UndefinedFunction(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Malformed(text) => write!(f, "malformed expression: '{}'", text),
            ParseError::UnbalancedParentheses => write!(f, "unbalanced parentheses"),
            ParseError::DisallowedCharacter(c) => write!(f, "disallowed character '{}'", c),
            ParseError::MultipleEquals => write!(f, "more than one '=' in equation"),
            ParseError::UndefinedFunction(name) => write!(f, "undefined function '{}'", name),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse normalized expression text into a symbolic tree.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let input = input.trim();
    check_characters(input)?;
    check_brackets(input)?;
    parse_inner(input)
}

fn check_characters(input: &str) -> Result<(), ParseError> {
    if let Some(c) = input
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "+-*/().".contains(*c)))
    {
        return Err(ParseError::DisallowedCharacter(c));
    }
    Ok(())
}

fn check_brackets(input: &str) -> Result<(), ParseError> {
    let mut depth: i32 = 0;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(ParseError::UnbalancedParentheses);
        }
    }
    if depth != 0 {
        return Err(ParseError::UnbalancedParentheses);
    }
    Ok(())
}

/// Position of the rightmost binary `+`/`-` outside brackets. A sign is
/// binary only when something evaluable precedes it: a sign at position 0,
/// after another operator (`*-`, `(-`, `**-`) or inside a float exponent
/// (`1e-3`) is part of the operand, not a split point.
fn find_rightmost_add_sub(input: &str) -> Option<(usize, char)> {
    let bytes = input.as_bytes();
    let mut depth = 0;
    let mut found = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'+' | b'-' if depth == 0 && i > 0 => {
                let prev = bytes[i - 1];
                let in_exponent = (prev == b'e' || prev == b'E')
                    && i >= 2
                    && bytes[i - 2].is_ascii_digit();
                if !matches!(prev, b'*' | b'/' | b'(' | b'+' | b'-') && !in_exponent {
                    found = Some((i, b as char));
                }
            }
            _ => {}
        }
    }
    found
}

/// Position of the rightmost `*` (not part of `**`) or `/` outside
/// brackets.
fn find_rightmost_mul_div(input: &str) -> Option<(usize, char)> {
    let bytes = input.as_bytes();
    let mut depth = 0;
    let mut found = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'/' if depth == 0 => found = Some((i, '/')),
            b'*' if depth == 0 => {
                let part_of_pow = (i > 0 && bytes[i - 1] == b'*')
                    || (i + 1 < bytes.len() && bytes[i + 1] == b'*');
                if !part_of_pow {
                    found = Some((i, '*'));
                }
            }
            _ => {}
        }
    }
    found
}

/// Position of the leftmost `**` outside brackets (right-associativity:
/// `a**b**c` parses as `a**(b**c)`).
fn find_leftmost_pow(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'*' if depth == 0 && bytes[i + 1] == b'*' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn parse_inner(input: &str) -> Result<Expr, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Malformed(String::new()));
    }

    if let Some((pos, op)) = find_rightmost_add_sub(input) {
        let left = parse_inner(&input[..pos])?;
        let right = parse_inner(&input[pos + 1..])?;
        return Ok(match op {
            '+' => Expr::Add(left.boxed(), right.boxed()),
            _ => Expr::Sub(left.boxed(), right.boxed()),
        });
    }

    // Leading sign with no binary split point: unary minus/plus.
    if let Some(rest) = input.strip_prefix('-') {
        return Ok(-parse_inner(rest)?);
    }
    if let Some(rest) = input.strip_prefix('+') {
        return parse_inner(rest);
    }

    if let Some((pos, op)) = find_rightmost_mul_div(input) {
        let left = parse_inner(&input[..pos])?;
        let right = parse_inner(&input[pos + 1..])?;
        return Ok(match op {
            '*' => Expr::Mul(left.boxed(), right.boxed()),
            _ => Expr::Div(left.boxed(), right.boxed()),
        });
    }

    if let Some(pos) = find_leftmost_pow(input) {
        let base = parse_inner(&input[..pos])?;
        let exponent = parse_inner(&input[pos + 2..])?;
        return Ok(Expr::Pow(base.boxed(), exponent.boxed()));
    }

    // Whole input wrapped in brackets.
    if input.starts_with('(') && input.ends_with(')') {
        return parse_inner(&input[1..input.len() - 1]);
    }

    if let Ok(value) = input.parse::<f64>() {
        return Ok(Expr::Const(value));
    }

    // Function call covering the whole input: name(...).
    if let Some(open) = input.find('(') {
        if input.ends_with(')') {
            let name = &input[..open];
            let inner = &input[open + 1..input.len() - 1];
            return match lookup_function(name) {
                Some(func) => Ok(Expr::Fun(func, parse_inner(inner)?.boxed())),
                None => Err(ParseError::UndefinedFunction(name.to_string())),
            };
        }
        return Err(ParseError::Malformed(input.to_string()));
    }

    if is_identifier(input) {
        if let Some(value) = lookup_constant(input) {
            return Ok(Expr::Const(value));
        }
        return Ok(Expr::Var(input.to_string()));
    }

    Err(ParseError::Malformed(input.to_string()))
}
