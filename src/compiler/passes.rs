//! Template compiler: layout inheritance, section capture and block structure
//!
//! Compilation runs in a fixed order:
//!
//! 1. the first `@extends('id')` is recorded and every `@extends` is removed;
//! 2. `@section('name') ... @endsection` blocks are captured by name and removed;
//! 3. when a layout was recorded, its source replaces whatever is left of the
//!    template (markup outside sections is dropped);
//! 4. `@yield` sites are replaced by captured section text, then output tags,
//!    conditionals, loops, partials and includes are built into [`Node`]s.
//!
//! Unmatched `@section`s and yields of undeclared sections are not errors; they
//! simply produce no output.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::debug;

use super::ast::{Branch, Expr, Node, Program};
use super::grammar::{parse_arguments, parse_expression, parse_loop};
use super::lexer::{lex, lex_at, Args, Lexeme, Span, Token};
use crate::error::CompileError;
use crate::template::{SourceLoader, TemplateError};

/// Compiles template sources into [`Program`]s
///
/// The compiler holds no state between calls; the loader is only consulted to
/// read the layout named by `@extends`.
#[derive(Debug, Clone)]
pub struct Compiler<L> {
    loader: L,
}

impl<L: SourceLoader> Compiler<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Compile template source text
    pub fn compile(&self, source: &str) -> Result<Program, TemplateError> {
        let (layout, lexemes) = extract_layout(lex(source))?;
        let (sections, body) = capture_sections(lexemes)?;

        let nodes = match &layout {
            Some(layout_id) => {
                debug!(layout = %layout_id, sections = sections.len(), "substituting layout");
                let layout_source = self.loader.load(layout_id)?;
                // Layouts are single-level: a layout's own @extends is ignored
                let layout_lexemes = lex(&layout_source)
                    .into_iter()
                    .filter(|l| !matches!(l.token, Token::Extends(_)))
                    .collect();
                let pieces =
                    expand_yields(&layout_source, layout_lexemes, source, &sections, true)
                        .map_err(|e| e.in_layout(layout_id.as_str()))?;
                Builder::new(&pieces, Some(layout_id)).build()?
            }
            None => {
                let pieces = expand_yields(source, body, source, &sections, false)?;
                Builder::new(&pieces, None).build()?
            }
        };

        Ok(Program { layout, nodes })
    }

    /// Compile straight to the serialized artifact form
    pub fn compile_to_artifact(&self, source: &str) -> Result<String, TemplateError> {
        let program = self.compile(source)?;
        program
            .to_artifact()
            .map_err(|source| TemplateError::Serialize { source })
    }
}

/// Split a directive's arguments into its leading quoted name and the rest
fn named_arguments(directive: &str, args: &Args) -> Result<(String, Vec<Expr>), CompileError> {
    let mut exprs = parse_arguments(&args.text, args.offset)?.into_iter();
    match exprs.next() {
        Some(Expr::Literal(serde_json::Value::String(name))) => Ok((name, exprs.collect())),
        _ => Err(CompileError::syntax(
            args.offset..args.offset + args.text.len(),
            format!("{} expects a quoted name", directive),
            vec!["string".to_string()],
        )),
    }
}

/// Phase 1: record the first `@extends` and strip every occurrence
fn extract_layout(lexemes: Vec<Lexeme>) -> Result<(Option<String>, Vec<Lexeme>), CompileError> {
    let mut layout = None;
    let mut rest = Vec::with_capacity(lexemes.len());

    for lexeme in lexemes {
        match &lexeme.token {
            Token::Extends(args) => {
                if layout.is_none() {
                    layout = Some(named_arguments("@extends", args)?.0);
                }
            }
            _ => rest.push(lexeme),
        }
    }

    Ok((layout, rest))
}

/// Phase 2: capture section bodies as ranges of `source`
fn capture_sections(
    lexemes: Vec<Lexeme>,
) -> Result<(HashMap<String, Span>, Vec<Lexeme>), CompileError> {
    let mut sections = HashMap::new();
    let mut body = Vec::with_capacity(lexemes.len());
    let mut i = 0;

    while i < lexemes.len() {
        match &lexemes[i].token {
            Token::Section(args) => {
                let close = lexemes[i + 1..]
                    .iter()
                    .position(|l| l.token == Token::EndSection)
                    .map(|p| i + 1 + p);
                match close {
                    Some(close) => {
                        let (name, _) = named_arguments("@section", args)?;
                        let range = lexemes[i].span.end..lexemes[close].span.start;
                        debug!(section = %name, bytes = range.len(), "captured section");
                        sections.insert(name, range);
                        i = close + 1;
                    }
                    // an unterminated section runs to the end of the template
                    None => {
                        let (name, _) = named_arguments("@section", args)?;
                        let end = lexemes.last().map_or(lexemes[i].span.end, |l| l.span.end);
                        debug!(
                            section = %name,
                            at = lexemes[i].span.start,
                            "unterminated section captured to end of template"
                        );
                        sections.insert(name, lexemes[i].span.end..end);
                        break;
                    }
                }
            }
            // stray terminator
            Token::EndSection => i += 1,
            _ => {
                body.push(lexemes[i].clone());
                i += 1;
            }
        }
    }

    Ok((sections, body))
}

/// Template text ready for block building, with yields already substituted
#[derive(Debug)]
enum Piece<'s> {
    Literal(Cow<'s, str>),
    Directive {
        token: Token,
        span: Span,
        in_layout: bool,
    },
}

/// Phase 4a: replace `@yield` sites with the captured sections of `child`
fn expand_yields<'s>(
    source: &'s str,
    lexemes: Vec<Lexeme>,
    child: &'s str,
    sections: &HashMap<String, Span>,
    in_layout: bool,
) -> Result<Vec<Piece<'s>>, CompileError> {
    let mut pieces = Vec::with_capacity(lexemes.len());

    for lexeme in lexemes {
        match lexeme.token {
            Token::Text => pieces.push(Piece::Literal(Cow::Borrowed(&source[lexeme.span]))),
            Token::Yield(args) => {
                let (name, rest) = named_arguments("@yield", &args)?;
                match sections.get(&name) {
                    Some(range) => {
                        for inner in lex_at(&child[range.clone()], range.start) {
                            match inner.token {
                                Token::Text => {
                                    pieces.push(Piece::Literal(Cow::Borrowed(&child[inner.span])))
                                }
                                // sections don't nest layouts
                                Token::Yield(_)
                                | Token::Extends(_)
                                | Token::Section(_)
                                | Token::EndSection => {}
                                token => pieces.push(Piece::Directive {
                                    token,
                                    span: inner.span,
                                    in_layout: false,
                                }),
                            }
                        }
                    }
                    None => {
                        let default = rest.first().and_then(Expr::as_str_literal);
                        if let Some(default) = default {
                            pieces.push(Piece::Literal(Cow::Owned(default.to_string())));
                        }
                    }
                }
            }
            token => pieces.push(Piece::Directive {
                token,
                span: lexeme.span,
                in_layout,
            }),
        }
    }

    Ok(pieces)
}

/// Block terminator met while building a block
#[derive(Debug)]
enum Closer {
    ElseIf(Expr),
    Else,
    EndIf,
    EndForeach,
}

impl Closer {
    fn directive(&self) -> &'static str {
        match self {
            Closer::ElseIf(_) => "@elseif",
            Closer::Else => "@else",
            Closer::EndIf => "@endif",
            Closer::EndForeach => "@endforeach",
        }
    }
}

#[derive(Debug)]
struct Stop {
    closer: Closer,
    span: Span,
    in_layout: bool,
}

/// Phase 4b: turn pieces into a node tree
struct Builder<'p, 's> {
    pieces: std::slice::Iter<'p, Piece<'s>>,
    layout: Option<&'p str>,
}

impl<'p, 's> Builder<'p, 's> {
    fn new(pieces: &'p [Piece<'s>], layout: Option<&'p String>) -> Self {
        Self {
            pieces: pieces.iter(),
            layout: layout.map(String::as_str),
        }
    }

    fn build(mut self) -> Result<Vec<Node>, CompileError> {
        let (nodes, stop) = self.block()?;
        match stop {
            Some(stop) => Err(self.unexpected(&stop)),
            None => Ok(nodes),
        }
    }

    /// Attribute an error to the layout when the offending piece came from it
    fn locate(&self, err: CompileError, in_layout: bool) -> CompileError {
        match (in_layout, self.layout) {
            (true, Some(layout)) => err.in_layout(layout),
            _ => err,
        }
    }

    fn unexpected(&self, stop: &Stop) -> CompileError {
        self.locate(
            CompileError::unbalanced(
                stop.span.clone(),
                format!("{} without a matching opening directive", stop.closer.directive()),
            ),
            stop.in_layout,
        )
    }

    fn unclosed(&self, directive: &str, span: Span, in_layout: bool) -> CompileError {
        self.locate(
            CompileError::unbalanced(span, format!("{} is never closed", directive)),
            in_layout,
        )
    }

    fn expression(&self, args: &Args, in_layout: bool) -> Result<Expr, CompileError> {
        parse_expression(&args.text, args.offset).map_err(|e| self.locate(e, in_layout))
    }

    fn named(
        &self,
        directive: &str,
        args: &Args,
        in_layout: bool,
    ) -> Result<(String, Vec<Expr>), CompileError> {
        named_arguments(directive, args).map_err(|e| self.locate(e, in_layout))
    }

    /// Build nodes until the pieces run out or a block terminator shows up
    fn block(&mut self) -> Result<(Vec<Node>, Option<Stop>), CompileError> {
        let mut nodes = Vec::new();

        while let Some(piece) = self.pieces.next() {
            let (token, span, in_layout) = match piece {
                Piece::Literal(text) => {
                    push_text(&mut nodes, text);
                    continue;
                }
                Piece::Directive {
                    token,
                    span,
                    in_layout,
                } => (token, span, *in_layout),
            };

            let stop = |closer| Stop {
                closer,
                span: span.clone(),
                in_layout,
            };

            let node = match token {
                Token::Echo(args) => Node::Echo {
                    expr: self.expression(args, in_layout)?,
                    escape: true,
                },
                Token::RawEcho(args) => Node::Echo {
                    expr: self.expression(args, in_layout)?,
                    escape: false,
                },
                Token::Partial(args) => Node::Partial {
                    name: self.named("@partial", args, in_layout)?.0,
                },
                Token::Include(args) => {
                    let (path, rest) = self.named("@include", args, in_layout)?;
                    Node::Include {
                        path,
                        data: rest.into_iter().next(),
                    }
                }
                Token::If(args) => {
                    let condition = self.expression(args, in_layout)?;
                    self.conditional(condition, span.clone(), in_layout)?
                }
                Token::Foreach(args) => {
                    let header = parse_loop(&args.text, args.offset)
                        .map_err(|e| self.locate(e, in_layout))?;
                    let (body, end) = self.block()?;
                    match end {
                        Some(Stop {
                            closer: Closer::EndForeach,
                            ..
                        }) => Node::Foreach {
                            iterable: header.iterable,
                            key: header.key,
                            value: header.value,
                            body,
                        },
                        Some(other) => return Err(self.unexpected(&other)),
                        None => return Err(self.unclosed("@foreach", span.clone(), in_layout)),
                    }
                }
                Token::ElseIf(args) => {
                    let condition = self.expression(args, in_layout)?;
                    return Ok((nodes, Some(stop(Closer::ElseIf(condition)))));
                }
                Token::Else => return Ok((nodes, Some(stop(Closer::Else)))),
                Token::EndIf => return Ok((nodes, Some(stop(Closer::EndIf)))),
                Token::EndForeach => return Ok((nodes, Some(stop(Closer::EndForeach)))),
                // Stripped: comments, and layout directives left over in a layout
                Token::Comment
                | Token::Text
                | Token::Extends(_)
                | Token::Section(_)
                | Token::EndSection
                | Token::Yield(_) => continue,
            };
            nodes.push(node);
        }

        Ok((nodes, None))
    }

    fn conditional(
        &mut self,
        first: Expr,
        open: Span,
        in_layout: bool,
    ) -> Result<Node, CompileError> {
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, stop) = self.block()?;
            branches.push(Branch { condition, body });

            match stop {
                Some(Stop {
                    closer: Closer::ElseIf(next),
                    ..
                }) => condition = next,
                Some(Stop {
                    closer: Closer::Else,
                    ..
                }) => {
                    let (otherwise, end) = self.block()?;
                    return match end {
                        Some(Stop {
                            closer: Closer::EndIf,
                            ..
                        }) => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        Some(other) => Err(self.unexpected(&other)),
                        None => Err(self.unclosed("@if", open, in_layout)),
                    };
                }
                Some(Stop {
                    closer: Closer::EndIf,
                    ..
                }) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    })
                }
                Some(other) => return Err(self.unexpected(&other)),
                None => return Err(self.unclosed("@if", open, in_layout)),
            }
        }
    }
}

/// Append literal output, merging with a preceding text node
fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    match nodes.last_mut() {
        Some(Node::Text { text: existing }) => existing.push_str(text),
        _ => nodes.push(Node::Text {
            text: text.to_string(),
        }),
    }
}
