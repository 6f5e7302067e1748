use rangeql::query::{run, Query, QueryOptions};
use rangeql::state::MemoryState;

fn toy_state() -> MemoryState {
    let mut state = MemoryState::new();
    state.put_cluster_key("web", "CLUSTER", &["web1", "web2", "web3"]);
    state.put_cluster_key("web", "TYPE", &["frontend"]);
    state.put_cluster_key("db", "CLUSTER", &["db1", "db2"]);
    state.put_cluster_key("db", "TYPE", &["backend"]);
    state.put_group("prod", &["web1", "db1"]);
    state.put_group("staging", &["web2"]);
    state
}

fn rows(query: &str) -> Vec<String> {
    run(query, &toy_state(), &QueryOptions::default()).expect("query ok")
}

fn sorted(mut rows: Vec<String>) -> Vec<String> {
    rows.sort();
    rows
}

const CORPUS: &[&str] = &[
    "web1",
    "db-1.example.com",
    "%web",
    "%web:TYPE",
    "%{%all}:KEY",
    "%web,%db",
    "a,b,c",
    "a & b - c",
    "%web&@prod",
    "%web-@prod",
    "@prod",
    "@{prod,staging}",
    "?web1",
    "$KEY",
    "/^web/",
    "q(hello, world)",
    "q()",
    "web{1,2}.example.com",
    "{a,b}",
    "{}",
    "web{,1}",
    "a{b{1,2}}",
    "host{1,2}-{a,b}",
    "count(%web,%db)",
    "mem(prod;web1,web2)",
    "has(TYPE; frontend)",
    "clusters(web2)",
];

#[test]
fn rendered_queries_reparse_to_the_same_ast() {
    for query in CORPUS {
        let parsed = Query::parse(query).unwrap_or_else(|e| panic!("{query}: {e}"));
        let rendered = parsed.ast().to_string();
        let reparsed =
            Query::parse(&rendered).unwrap_or_else(|e| panic!("{query} -> {rendered}: {e}"));
        assert_eq!(
            parsed.ast(),
            reparsed.ast(),
            "{query} rendered as {rendered}"
        );
    }
}

#[test]
fn rendering_is_stable_under_a_second_round() {
    for query in CORPUS {
        let first = Query::parse(query).expect("parse").ast().to_string();
        let second = Query::parse(&first).expect("reparse").ast().to_string();
        assert_eq!(first, second, "for {query}");
    }
}

#[test]
fn union_with_the_empty_set_is_the_identity() {
    for query in ["%web", "@prod", "?web1", "/^w/", "web{1,2}"] {
        let with_empty = rows(&format!("{query},@nosuchgroup"));
        assert_eq!(with_empty, rows(query), "for {query}");
    }
}

#[test]
fn intersection_is_commutative_on_set_equality() {
    let pairs = [("%web", "@prod"), ("%web", "{web1,web3}"), ("@prod", "%db")];
    for (a, b) in pairs {
        assert_eq!(
            sorted(rows(&format!("{a}&{b}"))),
            sorted(rows(&format!("{b}&{a}"))),
            "for {a} and {b}"
        );
    }
}

#[test]
fn subtracting_a_union_is_intersecting_the_subtractions() {
    // A - (B,C) equals (A-B) & (A-C) as sets.
    let combined = sorted(rows("%web-{@prod,@staging}"));
    let left = rows("%web-@prod");
    let right = rows("%web-@staging");
    let mut both: Vec<String> = left.into_iter().filter(|v| right.contains(v)).collect();
    both.sort();
    assert_eq!(combined, both);
}

#[test]
fn evaluation_is_deterministic_across_runs() {
    let queries = ["%web,%db", "has(TYPE; frontend,backend)", "host{1,2}-{a,b}", "?web1"];
    for query in queries {
        let first = rows(query);
        for _ in 0..4 {
            assert_eq!(rows(query), first, "for {query}");
        }
    }
}
