//! Expression AST and the builder folding the recognizer's action stream.
//!
//! The builder is a pure state machine over the token store: it walks the
//! tokens in the order the recognizer committed them, remembers the most
//! recent `Text` capture, and pushes/pops a single expression stack on each
//! action marker. A well-formed parse leaves exactly one expression on the
//! stack; anything else is a broken action stream and reported as an
//! invariant violation, not a parse error.

use std::fmt;

use crate::error::{RangeError, Result};
use crate::grammar::{RangeQuery, Rule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Union,
    Intersect,
    Subtract,
}

/// A range expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Null,
    /// Quoted constant from `q(...)`; the body is taken verbatim.
    Const(String),
    /// Bare literal value.
    Value(String),
    /// Regex filter from `/.../`.
    Regex(String),
    /// `$KEY`: a key looked up in the current cluster.
    LocalClusterLookup(String),
    /// `%expr` or `%expr:key`.
    ClusterLookup {
        cluster: Box<Expr>,
        key: Option<Box<Expr>>,
    },
    /// `@expr`: values of the named groups.
    GroupLookup(Box<Expr>),
    /// `?expr`: names of groups containing any of the members.
    GroupQuery(Box<Expr>),
    /// Brace expansion; any operand may be [`Expr::Null`].
    Braces {
        prefix: Box<Expr>,
        middle: Box<Expr>,
        suffix: Box<Expr>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    Op {
        kind: OpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

pub struct AstBuilder {
    stack: Vec<Expr>,
    text: String,
}

impl AstBuilder {
    /// Fold the action stream of a successfully parsed query into its AST.
    pub fn build(query: &RangeQuery) -> Result<Expr> {
        let mut builder = AstBuilder {
            stack: Vec::new(),
            text: String::new(),
        };
        for token in query.store().tokens() {
            builder.apply(token.rule, token.begin, token.end, query)?;
        }
        if builder.stack.len() == 1 {
            Ok(builder.stack.pop().expect("single expression"))
        } else {
            Err(RangeError::Invariant(format!(
                "expression stack holds {} nodes after the final action",
                builder.stack.len()
            )))
        }
    }

    fn apply(&mut self, rule: Rule, begin: u32, end: u32, query: &RangeQuery) -> Result<()> {
        match rule {
            Rule::Text => self.text = query.text(begin, end),
            Rule::Null | Rule::AddNull => self.stack.push(Expr::Null),
            Rule::AddValue => {
                let text = std::mem::take(&mut self.text);
                self.stack.push(Expr::Value(text));
            }
            Rule::AddConst => {
                let text = std::mem::take(&mut self.text);
                self.stack.push(Expr::Const(text));
            }
            Rule::AddRegex => {
                let text = std::mem::take(&mut self.text);
                self.stack.push(Expr::Regex(text));
            }
            Rule::AddLocalClusterLookup => {
                let text = std::mem::take(&mut self.text);
                self.stack.push(Expr::LocalClusterLookup(text));
            }
            Rule::AddClusterLookup => {
                let cluster = self.pop()?;
                self.stack.push(Expr::ClusterLookup {
                    cluster: Box::new(cluster),
                    key: None,
                });
            }
            Rule::AddKeyLookup => {
                let key = self.pop()?;
                match self.pop()? {
                    Expr::ClusterLookup { cluster, key: None } => {
                        self.stack.push(Expr::ClusterLookup {
                            cluster,
                            key: Some(Box::new(key)),
                        });
                    }
                    other => {
                        return Err(RangeError::Invariant(format!(
                            "key lookup applied to {other:?}"
                        )));
                    }
                }
            }
            Rule::AddGroupLookup => {
                let name = self.pop()?;
                self.stack.push(Expr::GroupLookup(Box::new(name)));
            }
            Rule::AddGroupQuery => {
                let member = self.pop()?;
                self.stack.push(Expr::GroupQuery(Box::new(member)));
            }
            Rule::AddFunction => {
                let name = std::mem::take(&mut self.text);
                self.stack.push(Expr::FunctionCall {
                    name,
                    args: Vec::new(),
                });
            }
            Rule::AddFuncArg | Rule::AddFuncArgLast => {
                let arg = self.pop()?;
                match self.stack.last_mut() {
                    Some(Expr::FunctionCall { args, .. }) => args.push(arg),
                    other => {
                        return Err(RangeError::Invariant(format!(
                            "function argument applied to {other:?}"
                        )));
                    }
                }
            }
            Rule::AddUnion => self.fold_op(OpKind::Union)?,
            Rule::AddIntersect => self.fold_op(OpKind::Intersect)?,
            Rule::AddSubtract => self.fold_op(OpKind::Subtract)?,
            Rule::AddBraces => {
                let suffix = self.pop()?;
                let middle = self.pop()?;
                let prefix = self.pop()?;
                self.stack.push(Expr::Braces {
                    prefix: Box::new(prefix),
                    middle: Box::new(middle),
                    suffix: Box::new(suffix),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn fold_op(&mut self, kind: OpKind) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.stack.push(Expr::Op {
            kind,
            left: Box::new(left),
            right: Box::new(right),
        });
        Ok(())
    }

    fn pop(&mut self) -> Result<Expr> {
        self.stack
            .pop()
            .ok_or_else(|| RangeError::Invariant("expression stack underflow".to_owned()))
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Union => f.write_str(","),
            OpKind::Intersect => f.write_str("&"),
            // A tight '-' would glue onto the left value (dashes are value
            // characters), so subtraction prints spaced.
            OpKind::Subtract => f.write_str(" - "),
        }
    }
}

/// Canonical form. Re-parsing the rendered string yields an identical AST
/// for every parser-produced expression (modulo whitespace); the evaluator
/// also uses it as the memoization key.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => Ok(()),
            Expr::Const(body) => write!(f, "q({body})"),
            Expr::Value(value) => f.write_str(value),
            Expr::Regex(pattern) => write!(f, "/{pattern}/"),
            Expr::LocalClusterLookup(key) => write!(f, "${key}"),
            Expr::ClusterLookup { cluster, key } => {
                write!(f, "%{cluster}")?;
                if let Some(key) = key {
                    write!(f, ":{key}")?;
                }
                Ok(())
            }
            Expr::GroupLookup(name) => write!(f, "@{name}"),
            Expr::GroupQuery(member) => write!(f, "?{member}"),
            Expr::Braces {
                prefix,
                middle,
                suffix,
            } => write!(f, "{prefix}{{{middle}}}{suffix}"),
            Expr::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Op { kind, left, right } => write!(f, "{left}{kind}{right}"),
        }
    }
}
