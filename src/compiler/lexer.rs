//! Directive lexer for template sources using logos
//!
//! Template text is mostly literal output. The lexer only carves out directive
//! markers and leaves everything else as [`Token::Text`]. A directive must not
//! touch a word character on either side, and directives that take arguments
//! need a well-formed argument list. Anything else lexes as text, so
//! `info@elsevier.com`, `ops@endif.io` or an unterminated `{{` pass through
//! verbatim.

use logos::{Lexer, Logos};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Raw argument text of a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub text: String,
    /// Byte offset of `text` in the lexed source
    pub offset: usize,
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    // Layout directives
    #[token("@extends", directive_args)]
    Extends(Args),
    #[token("@section", directive_args)]
    Section(Args),
    #[token("@endsection", bare_directive)]
    EndSection,
    #[token("@yield", directive_args)]
    Yield(Args),

    // Composition directives
    #[token("@partial", directive_args)]
    Partial(Args),
    #[token("@include", directive_args)]
    Include(Args),

    // Control flow
    #[token("@if", directive_args)]
    If(Args),
    #[token("@elseif", directive_args)]
    ElseIf(Args),
    #[token("@else", bare_directive)]
    Else,
    #[token("@endif", bare_directive)]
    EndIf,
    #[token("@foreach", directive_args)]
    Foreach(Args),
    #[token("@endforeach", bare_directive)]
    EndForeach,

    // Output tags (longer delimiters win)
    #[token("{{--", comment)]
    Comment,
    #[token("{{", |lex| delimited(lex, "}}"))]
    Echo(Args),
    #[token("{!!", |lex| delimited(lex, "!!}"))]
    RawEcho(Args),

    // Literal output
    #[regex(r"[^@{]+")]
    #[token("@")]
    #[token("{")]
    Text,
}

impl Token {
    fn args_mut(&mut self) -> Option<&mut Args> {
        match self {
            Token::Extends(args)
            | Token::Section(args)
            | Token::Yield(args)
            | Token::Partial(args)
            | Token::Include(args)
            | Token::If(args)
            | Token::ElseIf(args)
            | Token::Foreach(args)
            | Token::Echo(args)
            | Token::RawEcho(args) => Some(args),
            _ => None,
        }
    }
}

/// A token together with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Span,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The `@` of the current match does not follow a word character
fn starts_at_boundary(lex: &Lexer<Token>) -> bool {
    let before = lex.source()[..lex.span().start].chars().next_back();
    !before.is_some_and(is_word_char)
}

/// Argument-less directive standing on its own: `@endif`, not `ops@endif` or `@endifx`
fn bare_directive(lex: &mut Lexer<Token>) -> bool {
    let after = lex.remainder().chars().next();
    starts_at_boundary(lex) && !after.is_some_and(is_word_char)
}

/// Parenthesised argument list directly after a directive name
fn directive_args(lex: &mut Lexer<Token>) -> Option<Args> {
    if !starts_at_boundary(lex) {
        return None;
    }
    let rest = lex.remainder();
    let open = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    if !rest[open..].starts_with('(') {
        return None;
    }
    let close = matching_paren(&rest[open..])?;
    let text = rest[open + 1..open + close].to_string();
    let offset = lex.span().end + open + 1;
    lex.bump(open + close + 1);
    Some(Args { text, offset })
}

/// Text up to the closing delimiter of an output tag
fn delimited(lex: &mut Lexer<Token>, close: &str) -> Option<Args> {
    let rest = lex.remainder();
    let end = find_close(rest, close)?;
    let text = rest[..end].to_string();
    let offset = lex.span().end;
    lex.bump(end + close.len());
    Some(Args { text, offset })
}

/// Position of `close` outside quotes and nested braces, so `{{ {a: {b: 1}} }}`
/// ends at the last `}}`
fn find_close(s: &str, close: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && s[i..].starts_with(close) {
            return Some(i);
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

fn comment(lex: &mut Lexer<Token>) -> bool {
    match lex.remainder().find("--}}") {
        Some(end) => {
            lex.bump(end + 4);
            true
        }
        None => false,
    }
}

/// Index of the parenthesis closing the one `s` starts with, skipping quoted text
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Tokenize a template source. Never fails: unrecognised input becomes text.
pub fn lex(input: &str) -> Vec<Lexeme> {
    lex_at(input, 0)
}

/// Tokenize a slice of a larger source, reporting spans relative to that source
pub fn lex_at(input: &str, base: usize) -> Vec<Lexeme> {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| {
            let mut token = tok.unwrap_or(Token::Text);
            if let Some(args) = token.args_mut() {
                args.offset += base;
            }
            Lexeme {
                token,
                span: span.start + base..span.end + base,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).into_iter().map(|l| l.token).collect()
    }

    fn args(text: &str, offset: usize) -> Args {
        Args {
            text: text.to_string(),
            offset,
        }
    }

    #[test]
    fn test_layout_directives() {
        let toks = tokens("@extends('main')@section('body')<x>@endsection");
        assert_eq!(
            toks,
            vec![
                Token::Extends(args("'main'", 9)),
                Token::Section(args("'body'", 25)),
                Token::Text,
                Token::EndSection,
            ]
        );
    }

    #[test]
    fn test_echo_variants() {
        let toks = tokens("{{ name }}{!! html !!}{{-- note --}}");
        assert_eq!(
            toks,
            vec![
                Token::Echo(args(" name ", 2)),
                Token::RawEcho(args(" html ", 13)),
                Token::Comment,
            ]
        );
    }

    #[test]
    fn test_nested_parens_and_quotes() {
        let toks = tokens("@if((a || b) && c == ')')ok\n@endif");
        assert_eq!(toks[0], Token::If(args("(a || b) && c == ')'", 4)));
        assert_eq!(toks[1], Token::Text);
        assert_eq!(toks[2], Token::EndIf);
    }

    #[test]
    fn test_else_versus_elseif() {
        let toks = tokens("@elseif(x)@else @endif");
        assert_eq!(
            toks,
            vec![
                Token::ElseIf(args("x", 8)),
                Token::Else,
                Token::Text,
                Token::EndIf
            ]
        );
    }

    #[test]
    fn test_marker_without_arguments_is_text() {
        let lexemes = lex("mail me@if.com");
        assert!(lexemes.iter().all(|l| l.token == Token::Text));
        let rebuilt: String = lexemes
            .iter()
            .map(|l| &"mail me@if.com"[l.span.clone()])
            .collect();
        assert_eq!(rebuilt, "mail me@if.com");
    }

    #[test]
    fn test_directive_inside_word_is_text() {
        for source in ["info@elsevier.com", "ops@endif.io", "a@endifx", "@endifx", "cc@section('x')"] {
            let lexemes = lex(source);
            assert!(
                lexemes.iter().all(|l| l.token == Token::Text),
                "{} lexed as {:?}",
                source,
                lexemes
            );
        }
        assert_eq!(
            tokens("(@endif) @else."),
            vec![Token::Text, Token::EndIf, Token::Text, Token::Else, Token::Text]
        );
    }

    #[test]
    fn test_echo_skips_nested_braces() {
        let toks = tokens("{{ {a: {b: 1}} }}!");
        assert_eq!(toks, vec![Token::Echo(args(" {a: {b: 1}} ", 2)), Token::Text]);

        let toks = tokens("{{ '}}' }}{!! {x: 1} !!}");
        assert_eq!(
            toks,
            vec![
                Token::Echo(args(" '}}' ", 2)),
                Token::RawEcho(args(" {x: 1} ", 13)),
            ]
        );
    }

    #[test]
    fn test_unterminated_echo_is_text() {
        let toks = tokens("a {{ b");
        assert!(toks.iter().all(|t| *t == Token::Text));
    }

    #[test]
    fn test_lex_at_shifts_spans_and_offsets() {
        let lexemes = lex_at("{{ x }}", 10);
        assert_eq!(lexemes[0].span, 10..17);
        assert_eq!(lexemes[0].token, Token::Echo(args(" x ", 12)));
    }

    #[test]
    fn test_directive_allows_space_before_paren() {
        let toks = tokens("@partial ('nav')");
        assert_eq!(toks, vec![Token::Partial(args("'nav'", 10))]);
    }
}
