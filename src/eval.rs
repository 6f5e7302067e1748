//! Range-expression evaluation.
//!
//! Evaluation turns an [`Expr`] into an ordered, duplicate-free set of
//! strings. Order is normative: the canonical result order is first-insertion
//! order, set operations preserve the left operand's order, and union appends
//! unseen right-hand elements. All cluster and group data comes from the
//! borrowed [`State`]; a `NotFound` answer is an empty list, a `Transient`
//! answer aborts the query.
//!
//! # Resource bounds
//! Every `eval` entry counts against the configured node ceiling and checks
//! the cancellation token and deadline; both are re-checked before each state
//! call, so a cancelled query never touches the state again. Identical
//! sub-expressions (by canonical form, per cluster context) are evaluated at
//! most once per query; failed evaluations are never cached.
//!
//! # Cluster context
//! `ClusterLookup` evaluates its key expression once per cluster name with
//! that cluster as the current context. Within a context, `$KEY` reads the
//! cluster's own key and a regex filters the cluster's key names; without
//! one, `$KEY` is an error and a regex filters all cluster names.

use std::collections::{HashMap, HashSet};
use std::ops::{BitAndAssign, BitOrAssign, SubAssign};
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::{Expr, OpKind};
use crate::error::{RangeError, Result};
use crate::query::QueryOptions;
use crate::state::{State, StateError, StateResult};

/// Insertion-ordered set of result strings. Later duplicates are dropped.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: String) -> bool {
        if self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }

    fn union_with(&mut self, other: &ResultSet) {
        for item in &other.items {
            self.insert(item.clone());
        }
    }

    fn intersect_with(&mut self, other: &ResultSet) {
        self.items.retain(|item| other.contains(item));
        self.seen = self.items.iter().cloned().collect();
    }

    fn difference_with(&mut self, other: &ResultSet) {
        self.items.retain(|item| !other.contains(item));
        self.seen = self.items.iter().cloned().collect();
    }
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}
impl Eq for ResultSet {}

impl BitOrAssign<&'_ ResultSet> for ResultSet {
    fn bitor_assign(&mut self, rhs: &ResultSet) {
        self.union_with(rhs);
    }
}
impl BitAndAssign<&'_ ResultSet> for ResultSet {
    fn bitand_assign(&mut self, rhs: &ResultSet) {
        self.intersect_with(rhs);
    }
}
impl SubAssign<&'_ ResultSet> for ResultSet {
    fn sub_assign(&mut self, rhs: &ResultSet) {
        self.difference_with(rhs);
    }
}

impl FromIterator<String> for ResultSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = ResultSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl Extend<String> for ResultSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

/// The cluster whose own keys `$KEY` and key-position regexes refer to.
struct Context<'a> {
    cluster: Option<&'a str>,
}

type BuiltinFn = fn(&mut Evaluator, &[Expr], &Context) -> Result<ResultSet>;

struct Builtin {
    arity: usize,
    run: BuiltinFn,
}

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin> = {
        let mut table = HashMap::new();
        table.insert("has", Builtin { arity: 2, run: builtin_has });
        table.insert("clusters", Builtin { arity: 1, run: builtin_clusters });
        table.insert("count", Builtin { arity: 1, run: builtin_count });
        table.insert("mem", Builtin { arity: 2, run: builtin_mem });
        table
    };
}

/// One-query evaluator borrowing the state and options.
pub struct Evaluator<'a> {
    state: &'a dyn State,
    options: &'a QueryOptions,
    nodes: usize,
    memo: HashMap<(String, Option<String>), ResultSet>,
    regexes: HashMap<String, Regex>,
}

impl<'a> Evaluator<'a> {
    pub fn new(state: &'a dyn State, options: &'a QueryOptions) -> Self {
        Self {
            state,
            options,
            nodes: 0,
            memo: HashMap::new(),
            regexes: HashMap::new(),
        }
    }

    /// Number of AST nodes entered so far.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Vec<String>> {
        let result = self.eval(expr, &Context { cluster: None })?;
        Ok(result.into_vec())
    }

    fn eval(&mut self, expr: &Expr, ctx: &Context) -> Result<ResultSet> {
        self.checkpoint()?;
        self.nodes += 1;
        if self.nodes > self.options.max_nodes {
            return Err(RangeError::EvalLimit(self.options.max_nodes));
        }
        // Constants are cheaper to rebuild than to hash.
        let memo_key = match expr {
            Expr::Null | Expr::Const(_) | Expr::Value(_) => None,
            _ => Some((expr.to_string(), ctx.cluster.map(str::to_owned))),
        };
        if let Some(key) = &memo_key {
            if let Some(hit) = self.memo.get(key) {
                return Ok(hit.clone());
            }
        }
        let result = self.eval_fresh(expr, ctx)?;
        if let Some(key) = memo_key {
            self.memo.insert(key, result.clone());
        }
        Ok(result)
    }

    fn eval_fresh(&mut self, expr: &Expr, ctx: &Context) -> Result<ResultSet> {
        match expr {
            Expr::Null => Ok(ResultSet::new()),
            Expr::Const(value) | Expr::Value(value) => {
                Ok(ResultSet::from_iter([value.clone()]))
            }
            Expr::Regex(pattern) => {
                let matcher = self.compile(pattern)?;
                let candidates = match ctx.cluster {
                    Some(cluster) => self.fetch(|s| s.cluster_keys(cluster))?,
                    None => self.fetch(|s| s.cluster_names())?,
                };
                Ok(candidates
                    .into_iter()
                    .filter(|candidate| matcher.is_match(candidate))
                    .collect())
            }
            Expr::LocalClusterLookup(key) => match ctx.cluster {
                None => Err(RangeError::NoClusterContext(key.clone())),
                Some(cluster) => {
                    let values = self.fetch(|s| s.cluster_lookup(cluster, key))?;
                    Ok(values.into_iter().collect())
                }
            },
            Expr::ClusterLookup { cluster, key } => {
                let names = self.eval(cluster, ctx)?;
                let mut out = ResultSet::new();
                for name in names.iter() {
                    let key_name = match key {
                        None => self.options.default_key.clone(),
                        Some(key_expr) => {
                            let keys =
                                self.eval(key_expr, &Context { cluster: Some(name) })?;
                            if keys.len() != 1 {
                                return Err(RangeError::KeyNotString {
                                    cluster: name.to_owned(),
                                    got: keys.len(),
                                });
                            }
                            let key_name = keys.iter().next().expect("single key").to_owned();
                            key_name
                        }
                    };
                    let values = self.fetch(|s| s.cluster_lookup(name, &key_name))?;
                    out.extend(values);
                }
                Ok(out)
            }
            Expr::GroupLookup(name_expr) => {
                let names = self.eval(name_expr, ctx)?;
                let mut out = ResultSet::new();
                for name in names.iter() {
                    let values = self.fetch(|s| s.group_values(name))?;
                    out.extend(values);
                }
                Ok(out)
            }
            Expr::GroupQuery(member_expr) => {
                let members = self.eval(member_expr, ctx)?;
                let mut out = ResultSet::new();
                for member in members.iter() {
                    let names = self.fetch(|s| s.groups_containing(member))?;
                    out.extend(names);
                }
                Ok(out)
            }
            Expr::Op { kind, left, right } => {
                let mut result = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                match kind {
                    OpKind::Union => result |= &right,
                    OpKind::Intersect => result &= &right,
                    OpKind::Subtract => result -= &right,
                }
                Ok(result)
            }
            Expr::Braces {
                prefix,
                middle,
                suffix,
            } => {
                let prefixes = self.expansion_operand(prefix, ctx)?;
                let middles = self.expansion_operand(middle, ctx)?;
                let suffixes = self.expansion_operand(suffix, ctx)?;
                let mut out = ResultSet::new();
                for p in &prefixes {
                    for m in &middles {
                        for s in &suffixes {
                            out.insert(format!("{p}{m}{s}"));
                        }
                    }
                }
                Ok(out)
            }
            Expr::FunctionCall { name, args } => {
                let builtin = BUILTINS
                    .get(name.as_str())
                    .ok_or_else(|| RangeError::FunctionUnknown(name.clone()))?;
                if args.len() != builtin.arity {
                    return Err(RangeError::FunctionArity {
                        name: name.clone(),
                        expected: builtin.arity,
                        got: args.len(),
                    });
                }
                (builtin.run)(self, args, ctx)
            }
        }
    }

    /// An empty expansion operand contributes the empty string once.
    fn expansion_operand(&mut self, expr: &Expr, ctx: &Context) -> Result<Vec<String>> {
        let values = self.eval(expr, ctx)?.into_vec();
        if values.is_empty() {
            Ok(vec![String::new()])
        } else {
            Ok(values)
        }
    }

    /// Run one state call, re-checking cancellation first. `NotFound` is a
    /// soft miss; `Transient` aborts the query.
    fn fetch<F>(&mut self, call: F) -> Result<Vec<String>>
    where
        F: FnOnce(&dyn State) -> StateResult,
    {
        self.checkpoint()?;
        match call(self.state) {
            Ok(values) => Ok(values),
            Err(StateError::NotFound) => Ok(Vec::new()),
            Err(StateError::Transient(message)) => Err(RangeError::State(message)),
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if let Some(cancel) = &self.options.cancel {
            if cancel.is_cancelled() {
                return Err(RangeError::Cancelled);
            }
        }
        if let Some(deadline) = self.options.deadline {
            if Instant::now() >= deadline {
                return Err(RangeError::Cancelled);
            }
        }
        Ok(())
    }

    fn compile(&mut self, pattern: &str) -> Result<Regex> {
        if let Some(matcher) = self.regexes.get(pattern) {
            return Ok(matcher.clone());
        }
        let matcher = Regex::new(pattern).map_err(|e| RangeError::RegexInvalid {
            pattern: pattern.to_owned(),
            message: e.to_string(),
        })?;
        self.regexes.insert(pattern.to_owned(), matcher.clone());
        Ok(matcher)
    }
}

/// `has(keys; values)`: clusters where any listed key's value list intersects
/// the value set.
fn builtin_has(ev: &mut Evaluator, args: &[Expr], ctx: &Context) -> Result<ResultSet> {
    let keys = ev.eval(&args[0], ctx)?;
    let values = ev.eval(&args[1], ctx)?;
    let names = ev.fetch(|s| s.cluster_names())?;
    let mut out = ResultSet::new();
    for name in names {
        let mut hit = false;
        for key in keys.iter() {
            let list = ev.fetch(|s| s.cluster_lookup(&name, key))?;
            if list.iter().any(|value| values.contains(value)) {
                hit = true;
                break;
            }
        }
        if hit {
            out.insert(name);
        }
    }
    Ok(out)
}

/// `clusters(values)`: clusters whose default-key list intersects the values.
fn builtin_clusters(ev: &mut Evaluator, args: &[Expr], ctx: &Context) -> Result<ResultSet> {
    let values = ev.eval(&args[0], ctx)?;
    let default_key = ev.options.default_key.clone();
    let names = ev.fetch(|s| s.cluster_names())?;
    let mut out = ResultSet::new();
    for name in names {
        let list = ev.fetch(|s| s.cluster_lookup(&name, &default_key))?;
        if list.iter().any(|value| values.contains(value)) {
            out.insert(name);
        }
    }
    Ok(out)
}

/// `count(expr)`: the decimal size of the evaluated set.
fn builtin_count(ev: &mut Evaluator, args: &[Expr], ctx: &Context) -> Result<ResultSet> {
    let result = ev.eval(&args[0], ctx)?;
    Ok(ResultSet::from_iter([result.len().to_string()]))
}

/// `mem(groups; values)`: group members that also appear in the value set,
/// in member order.
fn builtin_mem(ev: &mut Evaluator, args: &[Expr], ctx: &Context) -> Result<ResultSet> {
    let groups = ev.eval(&args[0], ctx)?;
    let values = ev.eval(&args[1], ctx)?;
    let mut members = ResultSet::new();
    for group in groups.iter() {
        let list = ev.fetch(|s| s.group_values(group))?;
        members.extend(list);
    }
    members &= &values;
    Ok(members)
}
