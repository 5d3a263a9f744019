//! Compiles and evaluates author expressions against a state map.
//!
//! Expressions see the state keys as bare identifiers plus a fixed set of pure
//! math built-ins. Nothing else is reachable from an expression, and every
//! failure comes back as an [`EvaluationError`].

use std::cmp::Ordering;
use std::collections::HashMap;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::format::round_half_up;
use crate::parser::{
    BinaryOperator, Expression, Input, Literal, ParseError, Parser, Span, Spanned, Token,
    UnaryOperator, lexer, parser, span_at,
};
use crate::state::StateMap;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("{message}")]
    Syntax { message: String, span: Span },
    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String, span: Span },
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String, span: Span },
    #[error("'{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
        span: Span,
    },
    #[error("{message}")]
    Type { message: String, span: Span },
    #[error("{message}")]
    TooComplex { message: String, span: Span },
}

impl EvaluationError {
    pub fn span(&self) -> Span {
        match self {
            Self::Syntax { span, .. }
            | Self::UnknownIdentifier { span, .. }
            | Self::UnknownFunction { span, .. }
            | Self::Arity { span, .. }
            | Self::Type { span, .. }
            | Self::TooComplex { span, .. } => *span,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "cannot parse here",
            Self::UnknownIdentifier { .. } => "not a state variable",
            Self::UnknownFunction { .. } => "not a built-in function",
            Self::Arity { .. } => "wrong number of arguments",
            Self::Type { .. } => "wrong value type",
            Self::TooComplex { .. } => "too complex from here on",
        }
    }

    /// Renders an ariadne report pointing at the failing part of `source`.
    pub fn report(&self, name: &str, source: &str) -> String {
        let range = self.span().into_range();
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (name, range.clone()))
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_message(self.to_string())
            .with_label(Label::new((name, range)).with_message(self.label()))
            .finish()
            .write((name, Source::from(source)), &mut report_bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(&report_bytes).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

fn syntax_error<T: std::fmt::Display>(error: &ParseError<'_, T>) -> EvaluationError {
    EvaluationError::Syntax {
        message: error.to_string(),
        span: *error.span(),
    }
}

/// Longest accepted expression source, in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 4096;
/// Most tokens accepted in one expression.
pub const MAX_EXPRESSION_TOKENS: usize = 512;
pub const DEFAULT_MAX_EXPRESSION_DEPTH: usize = 64;

/// A parsed expression ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    root: Spanned<Expression>,
}

pub fn compile(source: &str) -> Result<CompiledExpression, EvaluationError> {
    compile_bounded(source, DEFAULT_MAX_EXPRESSION_DEPTH)
}

/// Like [`compile`], rejecting expressions that nest deeper than `max_depth`.
///
/// Parsing and evaluation both recurse along the expression tree, so the size
/// and nesting checks run before the parser ever sees the tokens.
pub fn compile_bounded(
    source: &str,
    max_depth: usize,
) -> Result<CompiledExpression, EvaluationError> {
    if source.len() > MAX_EXPRESSION_BYTES {
        return Err(EvaluationError::TooComplex {
            message: format!(
                "expression is {} bytes long, the limit is {MAX_EXPRESSION_BYTES}",
                source.len()
            ),
            span: Span::from(MAX_EXPRESSION_BYTES..source.len()),
        });
    }
    let (tokens, errors) = lexer().parse(source).into_output_errors();
    if let Some(error) = errors.first() {
        return Err(syntax_error(error));
    }
    let tokens = tokens.unwrap_or_default();
    if let Some(extra) = tokens.get(MAX_EXPRESSION_TOKENS) {
        return Err(EvaluationError::TooComplex {
            message: format!(
                "expression has {} tokens, the limit is {MAX_EXPRESSION_TOKENS}",
                tokens.len()
            ),
            span: extra.span,
        });
    }
    check_token_nesting(&tokens, max_depth)?;
    let input = tokens.map(span_at(source.len()), |Spanned { node, span }| (node, span));
    let root = parser()
        .parse(input)
        .into_result()
        .map_err(|errors| match errors.first() {
            Some(error) => syntax_error(error),
            None => EvaluationError::Syntax {
                message: "invalid expression".to_owned(),
                span: span_at(0),
            },
        })?;
    if tree_depth(&root) > max_depth {
        return Err(EvaluationError::TooComplex {
            message: format!("expression nests deeper than {max_depth} levels"),
            span: root.span,
        });
    }
    Ok(CompiledExpression {
        source: source.to_owned(),
        root,
    })
}

/// Estimate of parser recursion: open parentheses, runs of prefix
/// operators, and every right-nesting `?` or `**` seen so far.
fn check_token_nesting(
    tokens: &[Spanned<Token<'_>>],
    max_depth: usize,
) -> Result<(), EvaluationError> {
    let mut parentheses = 0usize;
    let mut prefix_run = 0usize;
    let mut right_nesting = 0usize;
    for token in tokens {
        match token.node {
            Token::BracketRoundOpen => parentheses += 1,
            Token::BracketRoundClose => parentheses = parentheses.saturating_sub(1),
            Token::Question | Token::Power => right_nesting += 1,
            _ => {}
        }
        prefix_run = match token.node {
            Token::Not | Token::Minus | Token::Plus => prefix_run + 1,
            _ => 0,
        };
        if parentheses + prefix_run + right_nesting > max_depth {
            return Err(EvaluationError::TooComplex {
                message: format!("expression nests deeper than {max_depth} levels"),
                span: token.span,
            });
        }
    }
    Ok(())
}

fn tree_depth(expression: &Spanned<Expression>) -> usize {
    let children = match &expression.node {
        Expression::Literal(_) | Expression::Identifier(_) => 0,
        Expression::Call { arguments, .. } => {
            arguments.iter().map(tree_depth).max().unwrap_or(0)
        }
        Expression::Unary { operand, .. } => tree_depth(operand),
        Expression::Binary {
            operand_a,
            operand_b,
            ..
        } => tree_depth(operand_a).max(tree_depth(operand_b)),
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => tree_depth(condition)
            .max(tree_depth(then))
            .max(tree_depth(otherwise)),
    };
    children + 1
}

/// Compiles and evaluates `source` in one go.
pub fn evaluate(source: &str, state: &StateMap) -> Result<Value, EvaluationError> {
    compile(source)?.evaluate(state)
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, state: &StateMap) -> Result<Value, EvaluationError> {
        eval(&self.root, state)
    }

    /// Identifiers that must be present in state for this expression to evaluate.
    pub fn identifiers(&self) -> Vec<(&str, Span)> {
        let mut identifiers = Vec::new();
        collect_identifiers(&self.root, &mut identifiers);
        identifiers
    }
}

fn collect_identifiers<'a>(expression: &'a Spanned<Expression>, out: &mut Vec<(&'a str, Span)>) {
    match &expression.node {
        Expression::Literal(_) => {}
        Expression::Identifier(name) => {
            if constant(name).is_none() && !out.iter().any(|(seen, _)| *seen == name.as_str()) {
                out.push((name.as_str(), expression.span));
            }
        }
        Expression::Call { arguments, .. } => {
            for argument in arguments {
                collect_identifiers(argument, out);
            }
        }
        Expression::Unary { operand, .. } => collect_identifiers(operand, out),
        Expression::Binary {
            operand_a,
            operand_b,
            ..
        } => {
            collect_identifiers(operand_a, out);
            collect_identifiers(operand_b, out);
        }
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => {
            collect_identifiers(condition, out);
            collect_identifiers(then, out);
            collect_identifiers(otherwise, out);
        }
    }
}

fn eval(expression: &Spanned<Expression>, state: &StateMap) -> Result<Value, EvaluationError> {
    let span = expression.span;
    match &expression.node {
        Expression::Literal(literal) => Ok(match literal {
            Literal::Number(number) => Value::Number(*number),
            Literal::Text(text) => Value::Text(text.clone()),
            Literal::Bool(value) => Value::Bool(*value),
            Literal::Undefined => Value::Undefined,
        }),
        Expression::Identifier(name) => state
            .get(name)
            .cloned()
            .or_else(|| constant(name).map(Value::Number))
            .ok_or_else(|| EvaluationError::UnknownIdentifier {
                name: name.clone(),
                span,
            }),
        Expression::Call { name, arguments } => {
            if !is_function(name) {
                return Err(EvaluationError::UnknownFunction {
                    name: name.clone(),
                    span,
                });
            }
            let arguments = arguments
                .iter()
                .map(|argument| {
                    let value = eval(argument, state)?;
                    value.as_number().ok_or_else(|| EvaluationError::Type {
                        message: format!("'{name}' expects numbers, got {}", value.kind()),
                        span: argument.span,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &arguments, span).map(Value::Number)
        }
        Expression::Unary { operator, operand } => {
            let value = eval(operand, state)?;
            match operator {
                UnaryOperator::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOperator::Negate | UnaryOperator::Plus => {
                    let number = value.as_number().ok_or_else(|| EvaluationError::Type {
                        message: format!("cannot apply '{operator}' to {}", value.kind()),
                        span,
                    })?;
                    Ok(Value::Number(if *operator == UnaryOperator::Negate {
                        -number
                    } else {
                        number
                    }))
                }
            }
        }
        Expression::Binary {
            operator,
            operand_a,
            operand_b,
        } => {
            let a = eval(operand_a, state)?;
            match operator {
                BinaryOperator::Or if a.is_truthy() => return Ok(a),
                BinaryOperator::And if !a.is_truthy() => return Ok(a),
                BinaryOperator::Or | BinaryOperator::And => return eval(operand_b, state),
                _ => {}
            }
            let b = eval(operand_b, state)?;
            binary(*operator, &a, &b, span)
        }
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if eval(condition, state)?.is_truthy() {
                eval(then, state)
            } else {
                eval(otherwise, state)
            }
        }
    }
}

fn binary(operator: BinaryOperator, a: &Value, b: &Value, span: Span) -> Result<Value, EvaluationError> {
    let ordering = || match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let result = match operator {
        BinaryOperator::Equal => Value::Bool(values_equal(a, b)),
        BinaryOperator::NotEqual => Value::Bool(!values_equal(a, b)),
        BinaryOperator::Greater => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOperator::GreaterOrEqual => Value::Bool(matches!(
            ordering(),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOperator::Less => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOperator::LessOrEqual => {
            Value::Bool(matches!(ordering(), Some(Ordering::Less | Ordering::Equal)))
        }
        BinaryOperator::Add => match (a, b) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Text(_), _) | (_, Value::Text(_)) => Value::Text(format!("{a}{b}")),
            _ => return Err(type_error(operator, a, b, span)),
        },
        BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Remainder
        | BinaryOperator::Power => {
            let (Value::Number(x), Value::Number(y)) = (a, b) else {
                return Err(type_error(operator, a, b, span));
            };
            Value::Number(match operator {
                BinaryOperator::Subtract => x - y,
                BinaryOperator::Multiply => x * y,
                BinaryOperator::Divide => x / y,
                BinaryOperator::Remainder => x % y,
                _ => x.powf(*y),
            })
        }
        // Only reached when the left operand did not decide the result.
        BinaryOperator::Or | BinaryOperator::And => b.clone(),
    };
    Ok(result)
}

fn type_error(operator: BinaryOperator, a: &Value, b: &Value, span: Span) -> EvaluationError {
    EvaluationError::Type {
        message: format!("cannot apply '{operator}' to {} and {}", a.kind(), b.kind()),
        span,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Undefined, Value::Undefined) => true,
        _ => false,
    }
}

fn constant(name: &str) -> Option<f64> {
    match name.strip_prefix("Math.").unwrap_or(name) {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        _ => None,
    }
}

const UNARY_FUNCTIONS: [&str; 10] = [
    "abs", "round", "floor", "ceil", "sqrt", "sin", "cos", "tan", "log", "exp",
];

fn is_function(name: &str) -> bool {
    let function = name.strip_prefix("Math.").unwrap_or(name);
    matches!(function, "min" | "max" | "pow") || UNARY_FUNCTIONS.contains(&function)
}

fn call(name: &str, arguments: &[f64], span: Span) -> Result<f64, EvaluationError> {
    let arity = |expected: &'static str| EvaluationError::Arity {
        name: name.to_owned(),
        expected,
        found: arguments.len(),
        span,
    };
    let function = name.strip_prefix("Math.").unwrap_or(name);
    match (function, arguments) {
        ("min", [first, rest @ ..]) => Ok(rest.iter().fold(*first, |min, x| min.min(*x))),
        ("max", [first, rest @ ..]) => Ok(rest.iter().fold(*first, |max, x| max.max(*x))),
        ("min" | "max", _) => Err(arity("at least 1")),
        ("pow", [base, exponent]) => Ok(base.powf(*exponent)),
        ("pow", _) => Err(arity("2")),
        (function, [x]) if UNARY_FUNCTIONS.contains(&function) => {
            Ok(match function {
                "abs" => x.abs(),
                "round" => round_half_up(*x),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                "sqrt" => x.sqrt(),
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "log" => x.ln(),
                _ => x.exp(),
            })
        }
        (function, _) if UNARY_FUNCTIONS.contains(&function) => Err(arity("1")),
        _ => Err(EvaluationError::UnknownFunction {
            name: name.to_owned(),
            span,
        }),
    }
}

/// Per-session memo of compiled expressions, keyed by source text.
#[derive(Debug)]
pub struct ExpressionCache {
    compiled: HashMap<String, Result<CompiledExpression, EvaluationError>>,
    max_depth: usize,
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_EXPRESSION_DEPTH)
    }
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            compiled: HashMap::new(),
            max_depth,
        }
    }

    pub fn compile(&mut self, source: &str) -> &Result<CompiledExpression, EvaluationError> {
        if !self.compiled.contains_key(source) {
            let compiled = compile_bounded(source, self.max_depth);
            self.compiled.insert(source.to_owned(), compiled);
        }
        &self.compiled[source]
    }

    pub fn evaluate(&mut self, source: &str, state: &StateMap) -> Result<Value, EvaluationError> {
        match self.compile(source) {
            Ok(expression) => expression.evaluate(state),
            Err(error) => Err(error.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn clear(&mut self) {
        self.compiled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entries: &[(&str, Value)]) -> StateMap {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_arithmetic_over_state() {
        let state = state(&[("a", Value::Number(2.0)), ("b", Value::Number(3.0))]);
        assert_eq!(evaluate("a + b * 2", &state), Ok(Value::Number(8.0)));
        assert_eq!(evaluate("(a + b) % 3", &state), Ok(Value::Number(2.0)));
        assert_eq!(evaluate("-a ** 2", &state), Ok(Value::Number(-4.0)));
    }

    #[test]
    fn test_comparison_and_logic() {
        let state = state(&[("count", Value::Number(5.0)), ("on", Value::Bool(false))]);
        assert_eq!(evaluate("count > 3", &state), Ok(Value::Bool(true)));
        assert_eq!(evaluate("count > 3 && on", &state), Ok(Value::Bool(false)));
        assert_eq!(evaluate("on || 'fallback'", &state), Ok(Value::text("fallback")));
        assert_eq!(evaluate("!on", &state), Ok(Value::Bool(true)));
        assert_eq!(evaluate("count === 5", &state), Ok(Value::Bool(true)));
        assert_eq!(evaluate("count == '5'", &state), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_undefined_compares_false() {
        let state = state(&[("x", Value::Undefined)]);
        assert_eq!(evaluate("x > 3", &state), Ok(Value::Bool(false)));
        assert_eq!(evaluate("x <= 3", &state), Ok(Value::Bool(false)));
        assert_eq!(evaluate("x == undefined", &state), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_unknown_identifier_is_an_error() {
        let error = evaluate("missing + 1", &StateMap::new()).unwrap_err();
        assert!(matches!(
            error,
            EvaluationError::UnknownIdentifier { ref name, .. } if name == "missing"
        ));
        assert_eq!(error.span().into_range(), 0..7);
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        let state = state(&[("on", Value::Bool(false))]);
        assert_eq!(evaluate("on && missing", &state), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            evaluate("a +", &StateMap::new()),
            Err(EvaluationError::Syntax { .. })
        ));
        assert!(matches!(
            evaluate("", &StateMap::new()),
            Err(EvaluationError::Syntax { .. })
        ));
        assert!(matches!(
            evaluate("a = 1", &StateMap::new()),
            Err(EvaluationError::Syntax { .. })
        ));
    }

    #[test]
    fn test_type_errors() {
        let state = state(&[("flag", Value::Bool(true))]);
        assert!(matches!(
            evaluate("flag * 2", &state),
            Err(EvaluationError::Type { .. })
        ));
        assert_eq!(evaluate("'n = ' + 2", &state), Ok(Value::text("n = 2")));
    }

    #[test]
    fn test_builtins() {
        let state = state(&[("a", Value::Number(3.0)), ("b", Value::Number(4.0))]);
        assert_eq!(evaluate("Math.sqrt(a * a + b * b)", &state), Ok(Value::Number(5.0)));
        assert_eq!(evaluate("max(a, b, 1)", &state), Ok(Value::Number(4.0)));
        assert_eq!(evaluate("Math.round(2.5)", &state), Ok(Value::Number(3.0)));
        assert_eq!(evaluate("round(-2.5)", &state), Ok(Value::Number(-2.0)));
        assert!(matches!(
            evaluate("pow(a)", &state),
            Err(EvaluationError::Arity { found: 1, .. })
        ));
        assert!(matches!(
            evaluate("eval('1')", &state),
            Err(EvaluationError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_ternary_only_evaluates_taken_branch() {
        let state = state(&[("x", Value::Number(1.0))]);
        assert_eq!(
            evaluate("x > 0 ? 'positive' : missing", &state),
            Ok(Value::text("positive"))
        );
    }

    #[test]
    fn test_identifiers_skip_constants_and_duplicates() {
        let expression = compile("a * PI + a / b").unwrap();
        let names: Vec<_> = expression.identifiers().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_cache_reuses_compilation() {
        let mut cache = ExpressionCache::new();
        let state = state(&[("a", Value::Number(1.0))]);
        assert_eq!(cache.evaluate("a + 1", &state), Ok(Value::Number(2.0)));
        assert_eq!(cache.evaluate("a + 1", &state), Ok(Value::Number(2.0)));
        assert!(cache.evaluate("a +", &state).is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_report_points_at_identifier() {
        let source = "total / count";
        let error = evaluate(source, &StateMap::new()).unwrap_err();
        let report = error.report("compute", source);
        assert!(report.contains("unknown identifier 'total'"));
        assert!(report.contains("not a state variable"));
    }

    #[test]
    fn test_long_flat_chain_is_rejected_not_overflowed() {
        let state = state(&[("a", Value::Number(1.0))]);
        let short = vec!["a"; 40].join(" + ");
        assert_eq!(evaluate(&short, &state), Ok(Value::Number(40.0)));

        for terms in [200, 1000, 5000] {
            let long = vec!["a"; terms].join(" + ");
            assert!(matches!(
                evaluate(&long, &state),
                Err(EvaluationError::TooComplex { .. })
            ));
        }
    }

    #[test]
    fn test_deep_prefix_and_parentheses_are_rejected() {
        let state = state(&[("a", Value::Bool(true))]);
        assert_eq!(
            evaluate(&format!("{}a", "!".repeat(10)), &state),
            Ok(Value::Bool(true))
        );
        for depth in [100, 1000] {
            assert!(matches!(
                evaluate(&format!("{}a", "!".repeat(depth)), &state),
                Err(EvaluationError::TooComplex { .. })
            ));
            let nested = format!("{}a{}", "(".repeat(depth), ")".repeat(depth));
            assert!(matches!(
                evaluate(&nested, &state),
                Err(EvaluationError::TooComplex { .. })
            ));
        }
    }

    #[test]
    fn test_cache_applies_its_depth_limit() {
        let state = state(&[("a", Value::Number(1.0))]);
        let mut cache = ExpressionCache::with_max_depth(3);
        assert_eq!(cache.evaluate("a + a", &state), Ok(Value::Number(2.0)));
        assert!(matches!(
            cache.evaluate("a + a + a + a", &state),
            Err(EvaluationError::TooComplex { .. })
        ));
        let expression = compile("a + a + a + a").unwrap();
        assert_eq!(expression.source(), "a + a + a + a");
    }
}
