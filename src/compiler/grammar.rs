//! Expression grammar for directive arguments and output tags, using logos + chumsky

use chumsky::error::{RichPattern, RichReason};
use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use logos::Logos;
use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, LoopHeader};
use crate::error::CompileError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum ExprToken {
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("as")]
    As,

    // Operators (longer first)
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=>")]
    FatArrow,

    // Delimiters
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote(lex.slice()))]
    Str(String),

    /// Kept as written: after a `.` the digits are path segments, not a fraction
    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),
}

/// Strip the quotes of a string literal and resolve backslash escapes
fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Integral literals stay integers so they print as `3`, not `3.0`
fn number(text: &str) -> Value {
    let Ok(n) = text.parse::<f64>() else {
        return Value::Null;
    };
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Parse an expression such as `user.name` or `count > 0 && !hidden`
///
/// `offset` is the byte position of `input` in the template, used for error spans.
pub fn parse_expression(input: &str, offset: usize) -> Result<Expr, CompileError> {
    match parse_fragment(input, offset, FragmentKind::Expression)? {
        Fragment::Expr(expr) => Ok(expr),
        _ => unreachable!("expression parser yields expressions"),
    }
}

/// Parse a `@foreach` header
pub fn parse_loop(input: &str, offset: usize) -> Result<LoopHeader, CompileError> {
    match parse_fragment(input, offset, FragmentKind::Loop)? {
        Fragment::Loop(header) => Ok(header),
        _ => unreachable!("loop parser yields loop headers"),
    }
}

/// Parse a comma separated argument list such as `'nav', {active: true}`
pub fn parse_arguments(input: &str, offset: usize) -> Result<Vec<Expr>, CompileError> {
    match parse_fragment(input, offset, FragmentKind::Arguments)? {
        Fragment::Args(args) => Ok(args),
        _ => unreachable!("argument parser yields argument lists"),
    }
}

#[derive(Debug, Clone, Copy)]
enum FragmentKind {
    Expression,
    Loop,
    Arguments,
}

enum Fragment {
    Expr(Expr),
    Loop(LoopHeader),
    Args(Vec<Expr>),
}

fn parse_fragment(input: &str, offset: usize, kind: FragmentKind) -> Result<Fragment, CompileError> {
    let len = input.len();

    let mut tokens = Vec::new();
    for (tok, span) in ExprToken::lexer(input).spanned() {
        match tok {
            Ok(tok) => tokens.push((tok, SimpleSpan::from(span))),
            Err(()) => {
                return Err(CompileError::syntax(
                    offset + span.start..offset + span.end,
                    format!("unexpected character '{}'", &input[span]),
                    vec![],
                ))
            }
        }
    }

    let token_stream = Stream::from_iter(tokens.into_iter())
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    let result = match kind {
        FragmentKind::Expression => expression()
            .then_ignore(end())
            .map(Fragment::Expr)
            .parse(token_stream)
            .into_result(),
        FragmentKind::Loop => loop_header()
            .then_ignore(end())
            .map(Fragment::Loop)
            .parse(token_stream)
            .into_result(),
        FragmentKind::Arguments => arguments()
            .then_ignore(end())
            .map(Fragment::Args)
            .parse(token_stream)
            .into_result(),
    };

    result.map_err(|errs| match errs.into_iter().next() {
        Some(err) => from_rich(&err, offset),
        None => CompileError::syntax(offset..offset + len, "invalid expression", vec![]),
    })
}

fn expression<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, ExprToken>>> + Clone
where
    I: ValueInput<'a, Token = ExprToken, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            ExprToken::Str(s) => Expr::Literal(Value::String(s)),
            ExprToken::Number(n) => Expr::Literal(number(&n)),
            ExprToken::True => Expr::Literal(Value::Bool(true)),
            ExprToken::False => Expr::Literal(Value::Bool(false)),
            ExprToken::Null => Expr::Literal(Value::Null),
        };

        // Path segments after the first may be list indices: `items.0`.
        // `m.0.1` lexes its tail as the number `0.1`, which is two indices.
        let segment = select! {
            ExprToken::Ident(s) => vec![s],
            ExprToken::Number(n) if !n.starts_with('-') => {
                n.split('.').map(str::to_string).collect()
            },
        };

        let path = select! { ExprToken::Ident(s) => s }
            .then(
                just(ExprToken::Dot)
                    .ignore_then(segment)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(head, tail): (String, Vec<Vec<String>>)| {
                let mut segments = Vec::with_capacity(tail.len() + 1);
                segments.push(head);
                segments.extend(tail.into_iter().flatten());
                Expr::Path(segments)
            });

        let key = select! {
            ExprToken::Ident(s) => s,
            ExprToken::Str(s) => s,
        };

        let map = key
            .then_ignore(just(ExprToken::Colon))
            .then(expr.clone())
            .separated_by(just(ExprToken::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(ExprToken::BraceOpen), just(ExprToken::BraceClose))
            .map(Expr::Map);

        let list = expr
            .clone()
            .separated_by(just(ExprToken::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(ExprToken::BracketOpen), just(ExprToken::BracketClose))
            .map(Expr::List);

        let atom = choice((
            literal,
            path,
            map,
            list,
            expr.clone()
                .delimited_by(just(ExprToken::ParenOpen), just(ExprToken::ParenClose)),
        ))
        .boxed();

        let unary = just(ExprToken::Bang)
            .repeated()
            .foldr(atom, |_, operand| Expr::Not(Box::new(operand)))
            .boxed();

        let comparison_op = choice((
            just(ExprToken::EqEq).to(BinaryOp::Eq),
            just(ExprToken::NotEq).to(BinaryOp::Ne),
            just(ExprToken::LessOrEqual).to(BinaryOp::Le),
            just(ExprToken::GreaterOrEqual).to(BinaryOp::Ge),
            just(ExprToken::Less).to(BinaryOp::Lt),
            just(ExprToken::Greater).to(BinaryOp::Gt),
        ));

        let comparison = unary
            .clone()
            .foldl(comparison_op.then(unary).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            })
            .boxed();

        let conjunction = comparison
            .clone()
            .foldl(
                just(ExprToken::AndAnd)
                    .to(BinaryOp::And)
                    .then(comparison)
                    .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed();

        conjunction
            .clone()
            .foldl(
                just(ExprToken::OrOr)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed()
    })
}

fn loop_header<'a, I>() -> impl Parser<'a, I, LoopHeader, extra::Err<Rich<'a, ExprToken>>> + Clone
where
    I: ValueInput<'a, Token = ExprToken, Span = SimpleSpan>,
{
    let binding = select! { ExprToken::Ident(s) => s };

    expression()
        .then_ignore(just(ExprToken::As))
        .then(
            binding
                .clone()
                .then_ignore(just(ExprToken::FatArrow))
                .or_not(),
        )
        .then(binding)
        .map(|((iterable, key), value)| LoopHeader {
            iterable,
            key,
            value,
        })
}

fn arguments<'a, I>() -> impl Parser<'a, I, Vec<Expr>, extra::Err<Rich<'a, ExprToken>>> + Clone
where
    I: ValueInput<'a, Token = ExprToken, Span = SimpleSpan>,
{
    expression()
        .separated_by(just(ExprToken::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
}

fn from_rich(err: &Rich<'_, ExprToken>, offset: usize) -> CompileError {
    let message = match err.reason() {
        RichReason::Custom(msg) => msg.to_string(),
        _ => match err.found() {
            Some(tok) => format!("unexpected {}", format_token(tok)),
            None => "unexpected end of expression".to_string(),
        },
    };

    let expected: Vec<String> = err
        .expected()
        .filter_map(|e| match e {
            RichPattern::Token(tok) => Some(format_token(tok)),
            RichPattern::Label(label) => Some(label.to_string()),
            RichPattern::EndOfInput => Some("end of expression".to_string()),
            _ => None,
        })
        .collect();

    let span = err.span().into_range();
    CompileError::syntax(offset + span.start..offset + span.end, message, expected)
}

/// Format a token for human-readable error messages
fn format_token(tok: &ExprToken) -> String {
    match tok {
        ExprToken::Ident(s) => format!("identifier '{}'", s),
        ExprToken::Str(s) => format!("string \"{}\"", s),
        ExprToken::Number(n) => format!("number {}", n),
        ExprToken::True => "'true'".to_string(),
        ExprToken::False => "'false'".to_string(),
        ExprToken::Null => "'null'".to_string(),
        ExprToken::As => "keyword 'as'".to_string(),
        ExprToken::EqEq => "'=='".to_string(),
        ExprToken::NotEq => "'!='".to_string(),
        ExprToken::LessOrEqual => "'<='".to_string(),
        ExprToken::GreaterOrEqual => "'>='".to_string(),
        ExprToken::Less => "'<'".to_string(),
        ExprToken::Greater => "'>'".to_string(),
        ExprToken::AndAnd => "'&&'".to_string(),
        ExprToken::OrOr => "'||'".to_string(),
        ExprToken::Bang => "'!'".to_string(),
        ExprToken::FatArrow => "'=>'".to_string(),
        ExprToken::Dot => "'.'".to_string(),
        ExprToken::Comma => "','".to_string(),
        ExprToken::Colon => "':'".to_string(),
        ExprToken::ParenOpen => "'('".to_string(),
        ExprToken::ParenClose => "')'".to_string(),
        ExprToken::BracketOpen => "'['".to_string(),
        ExprToken::BracketClose => "']'".to_string(),
        ExprToken::BraceOpen => "'{'".to_string(),
        ExprToken::BraceClose => "'}'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Expr {
        Expr::Path(segments.iter().map(|s| s.to_string()).collect())
    }

    fn lit(value: Value) -> Expr {
        Expr::Literal(value)
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(
            parse_expression(" user.name ", 0).unwrap(),
            path(&["user", "name"])
        );
        assert_eq!(
            parse_expression("items.0.title", 0).unwrap(),
            path(&["items", "0", "title"])
        );
    }

    #[test]
    fn test_consecutive_index_segments() {
        assert_eq!(parse_expression("m.0.1", 0).unwrap(), path(&["m", "0", "1"]));
        assert_eq!(
            parse_expression("m.0.10.2", 0).unwrap(),
            path(&["m", "0", "10", "2"])
        );
        assert!(parse_expression("m.-1", 0).is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression("'it\\'s'", 0).unwrap(),
            lit(Value::String("it's".into()))
        );
        assert_eq!(parse_expression("42", 0).unwrap(), lit(Value::from(42)));
        assert_eq!(parse_expression("1.5", 0).unwrap(), lit(Value::from(1.5)));
        assert_eq!(parse_expression("null", 0).unwrap(), lit(Value::Null));
    }

    #[test]
    fn test_precedence_or_binds_loosest() {
        let expr = parse_expression("a || b && c == 1", 0).unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Or,
                path(&["a"]),
                Expr::binary(
                    BinaryOp::And,
                    path(&["b"]),
                    Expr::binary(BinaryOp::Eq, path(&["c"]), lit(Value::from(1))),
                ),
            )
        );
    }

    #[test]
    fn test_negation_and_grouping() {
        let expr = parse_expression("!(a || b)", 0).unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::binary(
                BinaryOp::Or,
                path(&["a"]),
                path(&["b"])
            )))
        );
    }

    #[test]
    fn test_map_and_list_literals() {
        let expr = parse_expression("{title: page.title, 'tags': [1, 2,]}", 0).unwrap();
        assert_eq!(
            expr,
            Expr::Map(vec![
                ("title".to_string(), path(&["page", "title"])),
                (
                    "tags".to_string(),
                    Expr::List(vec![lit(Value::from(1)), lit(Value::from(2))])
                ),
            ])
        );
    }

    #[test]
    fn test_loop_header_forms() {
        let header = parse_loop("items as item", 0).unwrap();
        assert_eq!(header.iterable, path(&["items"]));
        assert_eq!(header.key, None);
        assert_eq!(header.value, "item");

        let header = parse_loop("rows as key => row", 0).unwrap();
        assert_eq!(header.key.as_deref(), Some("key"));
        assert_eq!(header.value, "row");
    }

    #[test]
    fn test_arguments() {
        let args = parse_arguments("'nav', {active: true}", 0).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].as_str_literal(), Some("nav"));
    }

    #[test]
    fn test_error_span_is_offset() {
        let err = parse_expression("a ==", 10).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
        assert!(err.span().start >= 10);
    }

    #[test]
    fn test_bad_character() {
        let err = parse_expression("a # b", 5).unwrap_err();
        assert_eq!(err.span(), &(7..8));
    }
}
