//! Expression syntax: tokens, spanned AST and the chumsky parser.
//!
//! The grammar is a small JavaScript-flavoured subset: literals, identifiers,
//! calls to built-in functions, unary and binary operators, and the ternary
//! conditional. There are no assignments, member accesses on values, or
//! lambdas, so parsed expressions can only read state.

use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::fmt;

mod lexer;
pub use lexer::{Token, lexer};

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

pub fn span_at(position: usize) -> Span {
    Span::from(position..position)
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Spanned<Expression>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let comma = just(Token::Comma);
        let dot = just(Token::Dot);
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);

        let identifier = select! { Token::Identifier(identifier) => identifier };

        let literal = select! {
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(text.to_owned()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Undefined,
            Token::Undefined => Literal::Undefined,
        };
        let expression_literal = literal.map(Expression::Literal);

        // `Math.sqrt(x)` and `sqrt(x)` name the same built-in, so the path is
        // kept as written and resolved by the evaluator.
        let path = identifier
            .separated_by(dot)
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|parts| parts.join("."));

        let arguments = expression
            .clone()
            .separated_by(comma)
            .collect::<Vec<_>>()
            .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

        let call_or_identifier = path.then(arguments.or_not()).map(|(name, arguments)| {
            match arguments {
                Some(arguments) => Expression::Call { name, arguments },
                None => Expression::Identifier(name),
            }
        });

        let nested = expression
            .clone()
            .delimited_by(bracket_round_open, bracket_round_close);

        let atom = choice((expression_literal, call_or_identifier))
            .map_with(|expression, extra| Spanned {
                node: expression,
                span: extra.span(),
            })
            .or(nested);

        let operators = atom.pratt((
            // Precedence 1 (lowest): logical or
            infix(left(1), just(Token::Or), |l, _, r, extra| {
                binary(BinaryOperator::Or, l, r, extra.span())
            }),
            // Precedence 2: logical and
            infix(left(2), just(Token::And), |l, _, r, extra| {
                binary(BinaryOperator::And, l, r, extra.span())
            }),
            // Precedence 3: equality
            infix(left(3), just(Token::Equal), |l, _, r, extra| {
                binary(BinaryOperator::Equal, l, r, extra.span())
            }),
            infix(left(3), just(Token::NotEqual), |l, _, r, extra| {
                binary(BinaryOperator::NotEqual, l, r, extra.span())
            }),
            // Precedence 4: ordering
            infix(left(4), just(Token::Greater), |l, _, r, extra| {
                binary(BinaryOperator::Greater, l, r, extra.span())
            }),
            infix(left(4), just(Token::GreaterOrEqual), |l, _, r, extra| {
                binary(BinaryOperator::GreaterOrEqual, l, r, extra.span())
            }),
            infix(left(4), just(Token::Less), |l, _, r, extra| {
                binary(BinaryOperator::Less, l, r, extra.span())
            }),
            infix(left(4), just(Token::LessOrEqual), |l, _, r, extra| {
                binary(BinaryOperator::LessOrEqual, l, r, extra.span())
            }),
            // Precedence 5: additive
            infix(left(5), just(Token::Plus), |l, _, r, extra| {
                binary(BinaryOperator::Add, l, r, extra.span())
            }),
            infix(left(5), just(Token::Minus), |l, _, r, extra| {
                binary(BinaryOperator::Subtract, l, r, extra.span())
            }),
            // Precedence 6: multiplicative
            infix(left(6), just(Token::Asterisk), |l, _, r, extra| {
                binary(BinaryOperator::Multiply, l, r, extra.span())
            }),
            infix(left(6), just(Token::Slash), |l, _, r, extra| {
                binary(BinaryOperator::Divide, l, r, extra.span())
            }),
            infix(left(6), just(Token::Percent), |l, _, r, extra| {
                binary(BinaryOperator::Remainder, l, r, extra.span())
            }),
            // Precedence 7: unary prefix
            prefix(7, just(Token::Minus), |_, operand, extra| {
                unary(UnaryOperator::Negate, operand, extra.span())
            }),
            prefix(7, just(Token::Plus), |_, operand, extra| {
                unary(UnaryOperator::Plus, operand, extra.span())
            }),
            prefix(7, just(Token::Not), |_, operand, extra| {
                unary(UnaryOperator::Not, operand, extra.span())
            }),
            // Precedence 8 (highest): exponent, right associative
            infix(right(8), just(Token::Power), |l, _, r, extra| {
                binary(BinaryOperator::Power, l, r, extra.span())
            }),
        ));

        operators
            .then(
                just(Token::Question)
                    .ignore_then(expression.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expression)
                    .or_not(),
            )
            .map_with(|(condition, branches), extra| match branches {
                Some((then, otherwise)) => Spanned {
                    node: Expression::Conditional {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    span: extra.span(),
                },
                None => condition,
            })
    })
}

fn binary(
    operator: BinaryOperator,
    operand_a: Spanned<Expression>,
    operand_b: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Binary {
            operator,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
    }
}

fn unary(operator: UnaryOperator, operand: Spanned<Expression>, span: Span) -> Spanned<Expression> {
    Spanned {
        span,
        node: Expression::Unary {
            operator,
            operand: Box::new(operand),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Call {
        name: String,
        arguments: Vec<Spanned<Self>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    Binary {
        operator: BinaryOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
    Conditional {
        condition: Box<Spanned<Self>>,
        then: Box<Spanned<Self>>,
        otherwise: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Power => "**",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negate => "-",
            Self::Plus => "+",
            Self::Not => "!",
        })
    }
}
