//! Query façade: parse once, evaluate once, discard.
//!
//! A [`Query`] owns its text, the recognizer's token store and the folded
//! AST; dropping it releases everything. Evaluation borrows the state and a
//! [`QueryOptions`] carrying the node ceiling, the default cluster key, an
//! optional absolute deadline and an optional [`CancelToken`]. Cancellation
//! is cooperative: the evaluator observes the token between nodes and before
//! state calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::ast::{AstBuilder, Expr};
use crate::error::Result;
use crate::eval::Evaluator;
use crate::grammar::RangeQuery;
use crate::state::State;
use crate::token::ParseTree;

/// Cancellation token shared between the caller and the evaluator.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-query evaluation options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Ceiling on AST nodes entered during evaluation.
    pub max_nodes: usize,
    /// Absolute cutoff; reaching it cancels the query.
    pub deadline: Option<Instant>,
    /// Cluster key used when a lookup names none.
    pub default_key: String,
    pub cancel: Option<CancelToken>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_nodes: 1000,
            deadline: None,
            default_key: "CLUSTER".to_owned(),
            cancel: None,
        }
    }
}

/// A parsed query, ready to evaluate against any [`State`].
#[derive(Debug)]
pub struct Query {
    text: String,
    grammar: RangeQuery,
    ast: Expr,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self> {
        let mut grammar = RangeQuery::new(text);
        grammar.parse()?;
        let ast = AstBuilder::build(&grammar)?;
        debug!(query = text, tokens = grammar.store().len(), "parsed");
        Ok(Self {
            text: text.to_owned(),
            grammar,
            ast,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn parse_tree(&self) -> Option<ParseTree> {
        self.grammar.parse_tree()
    }

    /// The parse tree rendered for inspection, one rule per line.
    pub fn render_tree(&self) -> Option<String> {
        self.grammar.render_tree()
    }

    pub fn evaluate(&self, state: &dyn State, options: &QueryOptions) -> Result<Vec<String>> {
        let mut evaluator = Evaluator::new(state, options);
        let result = evaluator.evaluate(&self.ast);
        match &result {
            Ok(rows) => {
                debug!(
                    query = %self.text,
                    rows = rows.len(),
                    nodes = evaluator.nodes(),
                    "evaluated"
                );
            }
            Err(error) => warn!(query = %self.text, %error, "evaluation failed"),
        }
        result
    }
}

/// Parse and evaluate in one shot; all transient storage is dropped before
/// the results are returned.
pub fn run(text: &str, state: &dyn State, options: &QueryOptions) -> Result<Vec<String>> {
    Query::parse(text)?.evaluate(state, options)
}
