//! Template compiler
//!
//! Source text is lexed into directives and literal text, layout inheritance is
//! resolved, and the result is built into a [`Program`] tree.

pub mod ast;
pub mod grammar;
pub mod lexer;
mod passes;

pub use ast::{BinaryOp, Branch, Expr, LoopHeader, Node, Program};
pub use passes::Compiler;
