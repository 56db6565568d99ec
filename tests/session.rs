//! End-to-end tests: theories, sessions and exact inference.

use test_log::test;

use plp_rs::circuit::{Evaluation, Failure, TargetKind};
use plp_rs::engine::Engine;
use plp_rs::error::Error;
use plp_rs::program::{Goal, InlineQuery, Statement};
use plp_rs::query::{ExactResult, QueryOptions, QueryResult, QueryType};
use plp_rs::session::QuerySession;
use plp_rs::term::Term;
use plp_rs::theory::TheoryStore;

const EPS: f64 = 1e-9;

fn c(functor: &str, args: &[&str]) -> Term {
    Term::compound(functor, args.iter().map(|a| Term::atom(*a)))
}

fn coins() -> Vec<Statement> {
    vec![
        Statement::fact(c("coin", &["c1"])),
        Statement::fact(c("coin", &["c2"])),
        Statement::disjunction(
            [
                (0.4, Term::compound("heads", [Term::var("C")])),
                (0.6, Term::compound("tails", [Term::var("C")])),
            ],
            Goal::call(Term::compound("coin", [Term::var("C")])),
        ),
    ]
}

fn graph() -> Vec<Statement> {
    let path = |x: &str, y: &str| Term::compound("path", [Term::var(x), Term::var(y)]);
    let edge = |x: &str, y: &str| Term::compound("edge", [Term::var(x), Term::var(y)]);
    vec![
        Statement::prob_fact(0.5, c("edge", &["a", "b"])),
        Statement::prob_fact(0.5, c("edge", &["b", "c"])),
        Statement::prob_fact(0.5, c("edge", &["c", "a"])),
        Statement::clause(path("X", "Y"), Goal::call(edge("X", "Y"))),
        Statement::clause(
            path("X", "Y"),
            Goal::conj([Goal::call(edge("X", "Z")), Goal::call(path("Z", "Y"))]),
        ),
    ]
}

fn exact(result: &QueryResult) -> &ExactResult {
    match result {
        QueryResult::Exact(r) => r,
        other => panic!("expected an exact result, got {:?}", other),
    }
}

fn probability(store: &TheoryStore, query: Term, evidence: Vec<(Term, bool)>) -> Evaluation {
    let mut session = QuerySession::open(store, Engine::new());
    session
        .prepare(vec![query], evidence, QueryType::Probability, &QueryOptions::default())
        .unwrap();
    let results = session.evaluate_all().unwrap();
    exact(&results[0]).weights[0].1
}

#[test]
fn test_single_coin() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let p = probability(&store, c("heads", &["c1"]), vec![]);
    assert!((p.weight().unwrap() - 0.4).abs() < EPS);
}

#[test]
fn test_annotated_disjunction_with_evidence() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let p = probability(&store, c("heads", &["c1"]), vec![(c("tails", &["c1"]), false)]);
    assert!((p.weight().unwrap() - 1.0).abs() < EPS);
}

#[test]
fn test_independent_facts() {
    let mut store = TheoryStore::new();
    store
        .add(
            "t1",
            [
                Statement::prob_fact(0.4, c("heads", &["c1"])),
                Statement::prob_fact(0.6, c("tails", &["c1"])),
            ],
        )
        .unwrap();
    let p = probability(&store, c("heads", &["c1"]), vec![]);
    assert!((p.weight().unwrap() - 0.4).abs() < EPS);
    // Without an annotated disjunction the facts do not exclude each other.
    let p = probability(&store, c("heads", &["c1"]), vec![(c("tails", &["c1"]), false)]);
    assert!((p.weight().unwrap() - 0.4).abs() < EPS);
}

#[test]
fn test_evidence_on_other_coin_is_irrelevant() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let p = probability(&store, c("heads", &["c1"]), vec![(c("tails", &["c2"]), false)]);
    assert!((p.weight().unwrap() - 0.4).abs() < EPS);
}

#[test]
fn test_open_query_has_one_answer_per_instance() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    session
        .prepare(
            vec![Term::compound("heads", [Term::var("C")])],
            vec![],
            QueryType::Probability,
            &QueryOptions::default(),
        )
        .unwrap();
    let results = session.evaluate_all().unwrap();
    let result = exact(&results[0]);
    assert_eq!(result.weights.len(), 2);
    for coin in ["c1", "c2"] {
        assert!((result.weight(&c("heads", &[coin])).unwrap() - 0.4).abs() < EPS);
    }
}

#[test]
fn test_cyclic_program() {
    let mut store = TheoryStore::new();
    store.add("graph", graph()).unwrap();
    let p = probability(&store, c("path", &["a", "c"]), vec![]);
    assert!((p.weight().unwrap() - 0.25).abs() < EPS);
    // a -> b -> c -> a
    let p = probability(&store, c("path", &["a", "a"]), vec![]);
    assert!((p.weight().unwrap() - 0.125).abs() < EPS);
}

fn left_recursive_graph(edges: &[(&str, &str)]) -> Vec<Statement> {
    let path = |x: &str, y: &str| Term::compound("path", [Term::var(x), Term::var(y)]);
    let edge = |x: &str, y: &str| Term::compound("edge", [Term::var(x), Term::var(y)]);
    let mut statements: Vec<Statement> = edges
        .iter()
        .map(|&(x, y)| Statement::prob_fact(0.5, c("edge", &[x, y])))
        .collect();
    statements.push(Statement::clause(path("X", "Y"), Goal::call(edge("X", "Y"))));
    statements.push(Statement::clause(
        path("X", "Y"),
        Goal::conj([Goal::call(path("X", "Z")), Goal::call(edge("Z", "Y"))]),
    ));
    statements
}

#[test]
fn test_left_recursive_program() {
    let mut store = TheoryStore::new();
    store
        .add("chain", left_recursive_graph(&[("a", "b"), ("b", "c"), ("c", "d")]))
        .unwrap();

    let mut session = QuerySession::open(&store, Engine::new());
    session
        .prepare(
            vec![Term::compound("path", [Term::var("A"), Term::var("B")])],
            vec![],
            QueryType::Probability,
            &QueryOptions::default(),
        )
        .unwrap();
    let results = session.evaluate_all().unwrap();
    let result = exact(&results[0]);
    assert_eq!(result.weights.len(), 6);
    for (from, to, p) in [
        ("a", "b", 0.5),
        ("b", "c", 0.5),
        ("c", "d", 0.5),
        ("a", "c", 0.25),
        ("b", "d", 0.25),
        ("a", "d", 0.125),
    ] {
        let w = result.weight(&c("path", &[from, to])).unwrap();
        assert!((w - p).abs() < EPS, "path({}, {}) = {}", from, to, w);
    }

    let p = probability(&store, c("path", &["a", "d"]), vec![]);
    assert!((p.weight().unwrap() - 0.125).abs() < EPS);
}

#[test]
fn test_left_recursive_cycle() {
    let mut store = TheoryStore::new();
    store
        .add("cycle", left_recursive_graph(&[("a", "b"), ("b", "c"), ("c", "a")]))
        .unwrap();
    let p = probability(&store, c("path", &["a", "c"]), vec![]);
    assert!((p.weight().unwrap() - 0.25).abs() < EPS);
    let p = probability(&store, c("path", &["a", "a"]), vec![]);
    assert!((p.weight().unwrap() - 0.125).abs() < EPS);
}

#[test]
fn test_mpe_and_minpe() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    let heads = c("heads", &["c1"]);
    session
        .prepare_tagged(vec![heads.clone()], vec![], "mpe", &QueryOptions::default())
        .unwrap();
    session
        .prepare_tagged(vec![heads.clone()], vec![], "minpe", &QueryOptions::default())
        .unwrap();
    let results = session.evaluate_all().unwrap();
    assert!((exact(&results[0]).weight(&heads).unwrap() - 0.4).abs() < EPS);
    assert!((exact(&results[1]).weight(&heads).unwrap() - 0.4).abs() < EPS);
}

#[test]
fn test_inconsistent_evidence_fails_the_query() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let p = probability(
        &store,
        c("heads", &["c1"]),
        vec![(c("heads", &["c1"]), true), (c("tails", &["c1"]), true)],
    );
    assert_eq!(p, Evaluation::Failed(Failure::InconsistentEvidence));
}

#[test]
fn test_shared_cache_compiles_once() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    store.add("graph", graph()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    let options = QueryOptions::default();
    session
        .prepare(vec![c("heads", &["c1"])], vec![], QueryType::Probability, &options)
        .unwrap();
    session
        .prepare(vec![c("path", &["a", "c"])], vec![], QueryType::Probability, &options)
        .unwrap();
    session
        .prepare(vec![c("tails", &["c2"])], vec![], QueryType::Mpe, &options)
        .unwrap();
    assert_eq!(session.formula_cache().compilations(), 0);

    let first = session.evaluate_all().unwrap();
    assert_eq!(session.formula_cache().compilations(), 1);
    assert!((exact(&first[1]).weight(&c("path", &["a", "c"])).unwrap() - 0.25).abs() < EPS);

    // Re-evaluating a closed session reuses the circuit.
    let second = session.evaluate_all().unwrap();
    assert_eq!(first, second);
    assert_eq!(session.formula_cache().compilations(), 1);
}

#[test]
fn test_target_kinds_compile_separately() {
    let mut store = TheoryStore::new();
    store.add("graph", graph()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    let query = c("path", &["b", "a"]);
    session
        .prepare(
            vec![query.clone()],
            vec![],
            QueryType::Probability,
            &QueryOptions::default().with_target(TargetKind::Bdd),
        )
        .unwrap();
    session
        .prepare(
            vec![query.clone()],
            vec![],
            QueryType::Probability,
            &QueryOptions::default().with_target(TargetKind::BddDfs),
        )
        .unwrap();
    let results = session.evaluate_all().unwrap();
    assert_eq!(session.formula_cache().compilations(), 2);
    let a = exact(&results[0]).weight(&query).unwrap();
    let b = exact(&results[1]).weight(&query).unwrap();
    assert!((a - 0.25).abs() < EPS);
    assert!((a - b).abs() < EPS);
}

#[test]
fn test_session_is_frozen_after_evaluation() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    session
        .prepare(vec![c("heads", &["c1"])], vec![], QueryType::Probability, &QueryOptions::default())
        .unwrap();
    session.evaluate_all().unwrap();

    assert!(session.is_closed());
    assert_eq!(
        session.prepare(vec![c("heads", &["c2"])], vec![], QueryType::Probability, &QueryOptions::default()),
        Err(Error::SessionClosed)
    );
    assert_eq!(
        session.transform_inline_query(InlineQuery::new(Goal::call(c("heads", &["c2"])))),
        Err(Error::SessionClosed)
    );
    assert_eq!(session.len(), 1);
}

#[test]
fn test_inline_query() {
    let mut store = TheoryStore::new();
    store.add("graph", graph()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    let goal = Goal::conj([Goal::call(c("edge", &["a", "b"])), Goal::not(Goal::call(c("edge", &["b", "c"])))]);
    let (queries, evidence) = session.transform_inline_query(InlineQuery::new(goal)).unwrap();
    let query = queries[0].clone();
    session
        .prepare(queries, evidence, QueryType::Probability, &QueryOptions::default())
        .unwrap();

    // edge(a, b) | \+edge(c, a)
    let conditional =
        InlineQuery::new(Goal::call(c("edge", &["a", "b"]))).given(Goal::not(Goal::call(c("edge", &["c", "a"]))));
    let (queries, evidence) = session.transform_inline_query(conditional).unwrap();
    assert_eq!(evidence, vec![(c("edge", &["c", "a"]), false)]);
    let conditional = queries[0].clone();
    session
        .prepare(queries, evidence, QueryType::Probability, &QueryOptions::default())
        .unwrap();

    let results = session.evaluate_all().unwrap();
    assert!((exact(&results[0]).weight(&query).unwrap() - 0.25).abs() < EPS);
    assert!((exact(&results[1]).weight(&conditional).unwrap() - 0.5).abs() < EPS);
    assert_eq!(exact(&results[1]).evidence.get(&c("edge", &["c", "a"])), Some(&false));
}

#[test]
fn test_unknown_predicate() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    let mut session = QuerySession::open(&store, Engine::new());
    assert_eq!(
        session.prepare(vec![c("rain", &[])], vec![], QueryType::Probability, &QueryOptions::default()),
        Err(Error::UnknownPredicate {
            functor: "rain".to_string(),
            arity: 0,
        })
    );
    assert!(session.is_empty());
}

#[test]
fn test_query_after_retraction() {
    let mut store = TheoryStore::new();
    store.add("coins", coins()).unwrap();
    store.remove("coins").unwrap();

    // The predicate is still known, it just has no clauses left.
    let p = probability(&store, c("heads", &["c1"]), vec![]);
    assert_eq!(p, Evaluation::Failed(Failure::QueryFalse));
}

#[test]
fn test_readd_after_retraction() {
    let mut store = TheoryStore::new();
    store.add("t1", [Statement::prob_fact(0.4, c("rain", &[]))]).unwrap();
    store.remove("t1").unwrap();
    store.add("t1", [Statement::prob_fact(0.7, c("rain", &[]))]).unwrap();
    let p = probability(&store, c("rain", &[]), vec![]);
    assert!((p.weight().unwrap() - 0.7).abs() < EPS);
}

#[test]
fn test_replace_theory_between_sessions() {
    let mut store = TheoryStore::new();
    store.add("cell", [Statement::prob_fact(0.2, c("rain", &[]))]).unwrap();
    store.add("other", [Statement::prob_fact(0.9, c("wind", &[]))]).unwrap();
    assert!((probability(&store, c("rain", &[]), vec![]).weight().unwrap() - 0.2).abs() < EPS);

    store.replace("cell", [Statement::prob_fact(0.3, c("rain", &[]))]).unwrap();
    assert!((probability(&store, c("rain", &[]), vec![]).weight().unwrap() - 0.3).abs() < EPS);
    assert!((probability(&store, c("wind", &[]), vec![]).weight().unwrap() - 0.9).abs() < EPS);
}
