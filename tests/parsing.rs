use rangeql::ast::{Expr, OpKind};
use rangeql::error::RangeError;
use rangeql::grammar::{RangeQuery, Rule};
use rangeql::query::Query;

fn value(s: &str) -> Expr {
    Expr::Value(s.to_owned())
}

fn op(kind: OpKind, left: Expr, right: Expr) -> Expr {
    Expr::Op {
        kind,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[test]
fn accepts_the_basic_forms() {
    let queries = [
        "web1",
        "%web",
        "%web:TYPE",
        "%web,%db",
        "%web&@prod",
        "%web-@prod",
        "?web1",
        "$KEY",
        "@prod",
        "/^web/",
        "q(hello, world)",
        "q()",
        "web{1,2}.example.com",
        "{a,b}",
        "{}",
        "count(%web)",
        "mem(prod;web1)",
        "has(TYPE; frontend)",
        "%{%all}:KEY",
        "  %web",
        "%web , %db",
        "",
    ];
    for query in queries {
        assert!(Query::parse(query).is_ok(), "should parse: {query}");
    }
}

#[test]
fn rejects_malformed_input() {
    let queries = ["%web&", "a,", "a -", "{a,}", "q(", "/unterminated", "web }"];
    for query in queries {
        assert!(
            matches!(Query::parse(query), Err(RangeError::Parse { .. })),
            "should not parse: {query}"
        );
    }
}

#[test]
fn dangling_operator_reports_line_and_symbol() {
    match Query::parse("%web&") {
        Err(RangeError::Parse { line, symbol, .. }) => {
            assert_eq!(line, 1);
            assert_eq!(symbol, 6);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn union_chains_fold_left() {
    let query = Query::parse("a,b,c").unwrap();
    let expected = op(
        OpKind::Union,
        op(OpKind::Union, value("a"), value("b")),
        value("c"),
    );
    assert_eq!(query.ast(), &expected);
}

#[test]
fn mixed_operators_fold_left() {
    // b-c would lex as one value, so the subtraction is spaced.
    let query = Query::parse("a,b & c - d").unwrap();
    let expected = op(
        OpKind::Subtract,
        op(
            OpKind::Intersect,
            op(OpKind::Union, value("a"), value("b")),
            value("c"),
        ),
        value("d"),
    );
    assert_eq!(query.ast(), &expected);
}

#[test]
fn dashes_and_dots_stay_inside_values() {
    let query = Query::parse("db-1.example.com").unwrap();
    assert_eq!(query.ast(), &value("db-1.example.com"));
}

#[test]
fn cluster_lookup_carries_its_key() {
    let query = Query::parse("%web:TYPE").unwrap();
    let expected = Expr::ClusterLookup {
        cluster: Box::new(value("web")),
        key: Some(Box::new(value("TYPE"))),
    };
    assert_eq!(query.ast(), &expected);
}

#[test]
fn braces_without_prefix_get_a_null_prefix() {
    let query = Query::parse("{a,b}").unwrap();
    let expected = Expr::Braces {
        prefix: Box::new(Expr::Null),
        middle: Box::new(op(OpKind::Union, value("a"), value("b"))),
        suffix: Box::new(Expr::Null),
    };
    assert_eq!(query.ast(), &expected);
}

#[test]
fn braces_after_a_value_use_it_as_prefix() {
    let query = Query::parse("web{1,2}.example.com").unwrap();
    let expected = Expr::Braces {
        prefix: Box::new(value("web")),
        middle: Box::new(op(OpKind::Union, value("1"), value("2"))),
        suffix: Box::new(value(".example.com")),
    };
    assert_eq!(query.ast(), &expected);
}

#[test]
fn function_arguments_are_separated_by_semicolons() {
    let query = Query::parse("f(a;b;c)").unwrap();
    match query.ast() {
        Expr::FunctionCall { name, args } => {
            assert_eq!(name, "f");
            assert_eq!(args.len(), 3);
        }
        other => panic!("expected function call, got {other:?}"),
    }
}

#[test]
fn one_function_argument_can_hold_a_union() {
    let query = Query::parse("count(%web,%db)").unwrap();
    match query.ast() {
        Expr::FunctionCall { name, args } => {
            assert_eq!(name, "count");
            assert_eq!(args.len(), 1);
            assert!(matches!(args[0], Expr::Op { kind: OpKind::Union, .. }));
        }
        other => panic!("expected function call, got {other:?}"),
    }
}

#[test]
fn quoted_constants_take_their_body_verbatim() {
    let query = Query::parse("q(hello, world)").unwrap();
    assert_eq!(query.ast(), &Expr::Const("hello, world".to_owned()));
}

#[test]
fn empty_input_parses_to_null() {
    let query = Query::parse("").unwrap();
    assert_eq!(query.ast(), &Expr::Null);
}

#[test]
fn nested_cluster_of_clusters_round_trips_through_display() {
    let query = Query::parse("%{%all}:KEY").unwrap();
    assert_eq!(query.ast().to_string(), "%{%all}:KEY");
}

#[test]
fn token_store_holds_the_parse_in_post_order() {
    let mut grammar = RangeQuery::new("%web");
    grammar.parse().unwrap();
    let rules: Vec<Rule> = grammar.store().tokens().map(|t| t.rule).collect();
    // The value finishes before the cluster that encloses it, which finishes
    // before the outermost expression.
    let value_at = rules.iter().position(|r| *r == Rule::Value).unwrap();
    let cluster_at = rules.iter().position(|r| *r == Rule::Cluster).unwrap();
    let expression_at = rules.iter().position(|r| *r == Rule::Expression).unwrap();
    assert!(value_at < cluster_at);
    assert!(cluster_at < expression_at);
    assert_eq!(expression_at, rules.len() - 1);
}

#[test]
fn token_offsets_survive_promotion_to_wide_records() {
    let long = "a".repeat(40_000);
    let mut grammar = RangeQuery::new(&long);
    grammar.parse().unwrap();
    assert!(grammar.store().tokens().any(|t| t.end as usize == 40_000));
    let ast = Query::parse(&long).unwrap();
    match ast.ast() {
        Expr::Value(v) => assert_eq!(v.len(), 40_000),
        other => panic!("expected value, got {other:?}"),
    }
}

#[test]
fn parse_tree_is_derived_by_containment() {
    let query = Query::parse("%web").unwrap();
    let tree = query.parse_tree().expect("tree");
    assert_eq!(tree.root().rule, Rule::Expression);
    let rendered = query.render_tree().expect("rendered tree");
    assert!(rendered.contains("cluster"));
    assert!(rendered.contains("value"));
    assert!(rendered.contains("\"web\""));
}

#[test]
fn pre_order_reports_uncovered_spans_as_markers() {
    // 'f' and '(' sit between and around the children of the function node.
    let query = Query::parse("f(a;b)").unwrap();
    let tree = query.parse_tree().expect("tree");
    let rules: Vec<Rule> = tree.pre_order().map(|v| v.rule).collect();
    assert!(rules.contains(&Rule::In), "expected an In marker in {rules:?}");
    assert!(rules.contains(&Rule::Suf), "expected a Suf marker in {rules:?}");

    let query = Query::parse("web{1,2}").unwrap();
    let tree = query.parse_tree().expect("tree");
    let rules: Vec<Rule> = tree.pre_order().map(|v| v.rule).collect();
    assert!(rules.contains(&Rule::Pre), "expected a Pre marker in {rules:?}");
}

#[test]
fn pre_order_covers_every_input_character_exactly_once_per_level() {
    let query = Query::parse("web{1,2}.example.com").unwrap();
    let tree = query.parse_tree().expect("tree");
    // The root spans the whole input; every visit stays inside it.
    let root = *tree.root();
    for visit in tree.pre_order() {
        assert!(visit.begin >= root.begin && visit.end <= root.end);
        assert!(visit.begin <= visit.end);
    }
}
