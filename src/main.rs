//! Evaluates range expressions against a fleet snapshot loaded from a JSON
//! file, either one-shot from the command line or as a stdin loop.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::exit;

use serde::Deserialize;

use rangeql::query::{Query, QueryOptions};
use rangeql::state::MemoryState;

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    clusters: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
}

fn load_state(path: &str) -> Result<MemoryState, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    let snapshot: Snapshot =
        serde_json::from_str(&raw).map_err(|e| format!("cannot parse {path}: {e}"))?;
    let mut state = MemoryState::new();
    for (cluster, keys) in &snapshot.clusters {
        for (key, values) in keys {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            state.put_cluster_key(cluster, key, &values);
        }
    }
    for (group, values) in &snapshot.groups {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        state.put_group(group, &values);
    }
    Ok(state)
}

fn evaluate(text: &str, state: &MemoryState, options: &QueryOptions, tree: bool) -> bool {
    match Query::parse(text) {
        Ok(query) => {
            if tree {
                if let Some(rendered) = query.render_tree() {
                    print!("{rendered}");
                }
            }
            match query.evaluate(state, options) {
                Ok(rows) => {
                    for row in rows {
                        println!("{row}");
                    }
                    true
                }
                Err(error) => {
                    eprintln!("{error}");
                    false
                }
            }
        }
        Err(error) => {
            eprintln!("{error}");
            false
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut tree = false;
    let mut rest: Vec<String> = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--tree" {
            tree = true;
        } else {
            rest.push(arg);
        }
    }
    if rest.is_empty() {
        eprintln!("usage: rangeql [--tree] <state.json> [query]");
        exit(2);
    }

    let state = match load_state(&rest[0]) {
        Ok(state) => state,
        Err(message) => {
            eprintln!("{message}");
            exit(2);
        }
    };
    let options = QueryOptions::default();

    if rest.len() > 1 {
        let text = rest[1..].join(" ");
        if !evaluate(&text, &state, &options, tree) {
            exit(1);
        }
        return;
    }

    // No query argument: read one query per line.
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                evaluate(text, &state, &options, tree);
            }
        }
    }
}
