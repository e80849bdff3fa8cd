//! Compiled program representation
//!
//! A [`Program`] is what the compiler produces and what the cache persists. It is
//! a tree of output instructions; layout inheritance and `@yield` have already
//! been resolved, so executing it needs nothing but data and a render-time bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A compiled template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Layout the source extended, kept for diagnostics only
    pub layout: Option<String>,
    pub nodes: Vec<Node>,
}

impl Program {
    /// Serialize into the on-disk compiled artifact
    pub fn to_artifact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a compiled artifact written by [`Program::to_artifact`]
    pub fn from_artifact(artifact: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(artifact)
    }
}

/// Output instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Node {
    Text {
        text: String,
    },
    Echo {
        expr: Expr,
        escape: bool,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        iterable: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
    },
    /// Render a named partial of the current renderable
    Partial {
        name: String,
    },
    /// Render another template in isolation
    Include {
        path: String,
        data: Option<Expr>,
    },
}

/// One `@if`/`@elseif` arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    /// Dotted lookup like `user.name` or `items.0`
    Path(Vec<String>),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// The string value of a quoted literal
    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// `@foreach` header: `items as item` or `items as key => item`
#[derive(Debug, Clone, PartialEq)]
pub struct LoopHeader {
    pub iterable: Expr,
    pub key: Option<String>,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_tags_nodes_by_op() {
        let program = Program {
            layout: None,
            nodes: vec![Node::Partial {
                name: "nav".to_string(),
            }],
        };
        let artifact = program.to_artifact().unwrap();
        assert!(artifact.contains(r#""op": "partial""#));
        assert_eq!(Program::from_artifact(&artifact).unwrap(), program);
    }

    #[test]
    fn test_str_literal() {
        assert_eq!(
            Expr::Literal(Value::String("x".into())).as_str_literal(),
            Some("x")
        );
        assert_eq!(Expr::Path(vec!["x".into()]).as_str_literal(), None);
    }
}
