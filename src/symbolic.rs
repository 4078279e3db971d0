/// # Function registry
/// Single source of truth for every function and constant the expression
/// layer understands: canonical names, English alternate spellings,
/// Portuguese aliases, numeric evaluators. The normalizer, the parser and
/// the differentiation rules all consult this table.
pub mod registry;
///____________________________________________________________________________________________________________________________
/// # Expression normalizer
/// Pure string-to-string transform applied before parsing: strips
/// whitespace, rewrites Portuguese function spellings, converts `^` to
/// `**` and inserts every implicit multiplication operator.
///# Example
/// ```
/// use ajuste::symbolic::normalize::normalize;
/// assert_eq!(normalize("2sen(x) + 3x"), "2*sin(x)+3*x");
/// ```
pub mod normalize;
///____________________________________________________________________________________________________________________________
/// # Expression parser
/// Turns normalized equation text into a symbolic expression tree,
/// reporting unbalanced parentheses, disallowed characters and unknown
/// functions as typed errors.
///# Example
/// ```
/// use ajuste::symbolic::parse_expr::parse_expression;
/// let expr = parse_expression("a*exp(-b*x)+c").unwrap();
/// assert_eq!(expr.free_symbols(), vec!["a", "b", "c", "x"]);
/// ```
pub mod parse_expr;
///____________________________________________________________________________________________________________________________
/// # Symbolic engine
/// The expression tree: arithmetic operations, registry function
/// application, variable collection and direct evaluation.
pub mod symbolic_engine;
///____________________________________________________________________________________________________________________________
/// # Analytic differentiation
/// Recursive differentiation rules (sum/product/quotient/power/chain)
/// producing the analytic Jacobians consumed by the fitting strategies.
///# Example
/// ```
/// use ajuste::symbolic::parse_expr::parse_expression;
/// let expr = parse_expression("a*x**2").unwrap();
/// let dda = expr.diff("a");
/// assert!(dda.contains_variable("x"));
/// ```
pub mod symbolic_engine_derivatives;
///____________________________________________________________________________________________________________________________
/// # Lambdification
/// Compiles expressions into `Fn(&[f64]) -> f64` closures with variables
/// resolved to slice positions at build time.
pub mod symbolic_lambdify;
