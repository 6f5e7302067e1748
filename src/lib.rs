//! rangeql – a query language and evaluator for range expressions.
//!
//! Range expressions are a compact notation for naming and computing over
//! sets of hosts in a fleet database. The fleet snapshot is a collection of
//! *clusters* (named maps from key to ordered value list) and *groups*
//! (named ordered value lists); a query resolves to a deterministic, ordered
//! set of strings:
//!
//! * `%web` – the default-key members of cluster `web`
//! * `%web:TYPE` – the `TYPE` key of cluster `web`
//! * `@prod` / `?web1` – group values, and the reverse: groups containing a value
//! * `%web&@prod`, `%web-@prod`, `%web,%db` – intersection, exclusion, union
//! * `web{1,2}.example.com` – brace expansion
//! * `count(%web,%db)`, `has(TYPE; frontend)` – built-in functions
//! * `/^web/` – regex filter over cluster names
//! * `q(anything goes)` – a quoted constant
//!
//! ## Modules
//! * [`grammar`] – Hand-written PEG recognizer emitting a post-order token
//!   stream with embedded action markers.
//! * [`token`] – Token store (16-bit records promoted to 32-bit on demand)
//!   and the containment-derived parse tree with its pre-order visitor.
//! * [`ast`] – Expression AST, the action-stream builder and the canonical
//!   pretty-printer.
//! * [`state`] – The read-only [`state::State`] trait the evaluator queries,
//!   plus an in-memory implementation.
//! * [`eval`] – Ordered set algebra and the bounded, memoizing evaluator.
//! * [`query`] – The one-shot [`query::Query`] façade and [`query::run`].
//! * [`error`] – [`error::RangeError`] covering parse, evaluation, state and
//!   cancellation failures.
//!
//! ## Quick Start
//! ```
//! use rangeql::query::{run, QueryOptions};
//! use rangeql::state::MemoryState;
//!
//! let mut state = MemoryState::new();
//! state.put_cluster_key("web", "CLUSTER", &["web1", "web2", "web3"]);
//! state.put_group("prod", &["web1", "db1"]);
//!
//! let rows = run("%web&@prod", &state, &QueryOptions::default()).unwrap();
//! assert_eq!(rows, vec!["web1".to_owned()]);
//! ```
//!
//! Evaluation is single-threaded per query; run queries in parallel by
//! giving each its own [`query::Query`]. The state is the only shared
//! resource and is only ever read.

pub mod ast;
pub mod error;
pub mod eval;
pub mod grammar;
pub mod query;
pub mod state;
pub mod token;
