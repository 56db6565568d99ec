//! Query sessions: one batch of queries over one shared formula graph.
//!
//! A session borrows the theory store's database and puts a private layer on top of it for
//! session-local clauses. It stays open while queries are prepared (and grounded); the first
//! [`QuerySession::evaluate_all`] closes it and locks the formula cache, after which the circuit
//! of every target kind is compiled at most once.
//!
//! ```
//! use plp_rs::engine::Engine;
//! use plp_rs::program::Statement;
//! use plp_rs::query::{QueryOptions, QueryResult, QueryType};
//! use plp_rs::session::QuerySession;
//! use plp_rs::term::Term;
//! use plp_rs::theory::TheoryStore;
//!
//! let heads = Term::compound("heads", [Term::atom("c1")]);
//! let mut store = TheoryStore::new();
//! store.add("t1", [Statement::prob_fact(0.4, heads.clone())]).unwrap();
//!
//! let mut session = QuerySession::open(&store, Engine::new());
//! session
//!     .prepare(vec![heads.clone()], vec![], QueryType::Probability, &QueryOptions::default())
//!     .unwrap();
//! let results = session.evaluate_all().unwrap();
//! match &results[0] {
//!     QueryResult::Exact(r) => assert!((r.weight(&heads).unwrap() - 0.4).abs() < 1e-9),
//!     other => panic!("unexpected result: {:?}", other),
//! }
//! ```

use log::{debug, warn};

use crate::database::LayeredDb;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::formula_cache::FormulaCache;
use crate::program::{InlineQuery, Statement};
use crate::query::{Query, QueryOptions, QueryResult, QueryType};
use crate::term::Term;
use crate::theory::TheoryStore;

/// Head prefix of clauses generated for inline queries.
const INLINE_QUERY_PREFIX: &str = "_tiq";

/// Position of a prepared query within its session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct QueryHandle(usize);

impl QueryHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct QuerySession<'a> {
    engine: Engine,
    db: LayeredDb<'a>,
    cache: FormulaCache,
    queries: Vec<Query>,
    inline_queries: usize,
    closed: bool,
}

impl<'a> QuerySession<'a> {
    pub fn open(store: &'a TheoryStore, engine: Engine) -> Self {
        Self {
            engine,
            db: LayeredDb::new(store.database()),
            cache: FormulaCache::new(),
            queries: Vec::new(),
            inline_queries: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn formula_cache(&self) -> &FormulaCache {
        &self.cache
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn query(&self, handle: QueryHandle) -> Option<&Query> {
        self.queries.get(handle.0)
    }

    /// Create a query of `query_type` and ground it into the shared formula graph.
    pub fn prepare(
        &mut self,
        queries: Vec<Term>,
        evidence: Vec<(Term, bool)>,
        query_type: QueryType,
        options: &QueryOptions,
    ) -> Result<QueryHandle> {
        if self.closed {
            warn!("Trying to prepare a query in a closed session");
            return Err(Error::SessionClosed);
        }
        let mut query = Query::create(query_type, queries, evidence, options);
        query.ground(&self.engine, &self.db, &mut self.cache)?;
        let handle = QueryHandle(self.queries.len());
        debug!("prepared {} query {:?}", query_type, handle);
        self.queries.push(query);
        Ok(handle)
    }

    /// Like [`prepare`](Self::prepare), with the strategy named by a tag such as `"mpe"`.
    pub fn prepare_tagged(
        &mut self,
        queries: Vec<Term>,
        evidence: Vec<(Term, bool)>,
        tag: &str,
        options: &QueryOptions,
    ) -> Result<QueryHandle> {
        let query_type = tag.parse()?;
        self.prepare(queries, evidence, query_type, options)
    }

    /// Turn an inline query `goal | condition` into queries and evidence for [`prepare`](Self::prepare).
    ///
    /// Adds the session-local clause `_tiq_<n>(Vars) :- goal`, where `Vars` are the variables of
    /// the goal. Returns its head as the only query, together with the evidence of the condition.
    pub fn transform_inline_query(&mut self, query: InlineQuery) -> Result<(Vec<Term>, Vec<(Term, bool)>)> {
        if self.closed {
            warn!("Trying to add an inline query to a closed session");
            return Err(Error::SessionClosed);
        }
        let evidence = query.evidence()?;
        let functor = format!("{}_{}", INLINE_QUERY_PREFIX, self.inline_queries);
        self.inline_queries += 1;
        let head = Term::compound(functor, query.goal.variables().into_iter().map(Term::var));
        self.db.add_statement(Statement::clause(head.clone(), query.goal))?;
        debug!("inline query {} given {:?}", head, evidence);
        Ok((vec![head], evidence))
    }

    /// Close the session and evaluate every prepared query in order.
    pub fn evaluate_all(&mut self) -> Result<Vec<QueryResult>> {
        self.closed = true;
        self.cache.lock();
        let mut results = Vec::with_capacity(self.queries.len());
        for query in &mut self.queries {
            results.push(query.evaluate(&self.engine, &self.db, &mut self.cache)?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::Goal;

    fn heads(c: &str) -> Term {
        Term::compound("heads", [Term::atom(c)])
    }

    fn store() -> TheoryStore {
        let mut store = TheoryStore::new();
        store
            .add(
                "coins",
                [
                    Statement::fact(Term::compound("coin", [Term::atom("c1")])),
                    Statement::fact(Term::compound("coin", [Term::atom("c2")])),
                    Statement::disjunction(
                        [
                            (0.4, Term::compound("heads", [Term::var("C")])),
                            (0.6, Term::compound("tails", [Term::var("C")])),
                        ],
                        Goal::call(Term::compound("coin", [Term::var("C")])),
                    ),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_prepare_after_close_fails() {
        let store = store();
        let mut session = QuerySession::open(&store, Engine::new());
        session
            .prepare(vec![heads("c1")], vec![], QueryType::Probability, &QueryOptions::default())
            .unwrap();
        session.evaluate_all().unwrap();
        assert!(session.is_closed());
        assert_eq!(
            session.prepare(vec![heads("c1")], vec![], QueryType::Probability, &QueryOptions::default()),
            Err(Error::SessionClosed)
        );
        assert!(session.formula_cache().is_locked());
    }

    #[test]
    fn test_inline_query() {
        let store = store();
        let mut session = QuerySession::open(&store, Engine::new());
        // win :- heads(C), as an inline goal without free variables in the head
        let (queries, evidence) = session
            .transform_inline_query(InlineQuery::new(Goal::call(heads("c1"))))
            .unwrap();
        let q = Term::atom("_tiq_0");
        assert_eq!(queries, vec![q.clone()]);
        assert!(evidence.is_empty());
        let h = session
            .prepare(queries, evidence, QueryType::Probability, &QueryOptions::default())
            .unwrap();
        assert_eq!(h.index(), 0);

        let (open, _) = session
            .transform_inline_query(InlineQuery::new(Goal::call(Term::compound("heads", [Term::var("C")]))))
            .unwrap();
        assert_eq!(open, vec![Term::compound("_tiq_1", [Term::var("C")])]);

        let results = session.evaluate_all().unwrap();
        match &results[0] {
            QueryResult::Exact(r) => assert!((r.weight(&q).unwrap() - 0.4).abs() < 1e-9),
            other => panic!("unexpected result: {:?}", other),
        }
        // The session layer never leaks into the store.
        assert!(store.database().find("_tiq_0", 0).is_none());
    }

    #[test]
    fn test_conditional_inline_queries() {
        let mut store = store();
        store
            .add(
                "win",
                [Statement::clause(
                    Term::atom("win"),
                    Goal::call(Term::compound("heads", [Term::var("C")])),
                )],
            )
            .unwrap();
        let mut session = QuerySession::open(&store, Engine::new());
        let win = || Goal::call(Term::atom("win"));
        let inline = [
            InlineQuery::new(win()).given(Goal::call(heads("c1"))),
            InlineQuery::new(win()).given(Goal::not(Goal::call(heads("c1")))),
            InlineQuery::new(win()),
        ];
        for query in inline {
            let (queries, evidence) = session.transform_inline_query(query).unwrap();
            session
                .prepare(queries, evidence, QueryType::Probability, &QueryOptions::default())
                .unwrap();
        }

        let results = session.evaluate_all().unwrap();
        // P(win) = 1 - 0.6 * 0.6, and 0.4 once heads(c1) is ruled out.
        let expected = [("_tiq_0", 1.0), ("_tiq_1", 0.4), ("_tiq_2", 0.64)];
        for (result, (name, p)) in results.iter().zip(expected) {
            match result {
                QueryResult::Exact(r) => assert!((r.weight(&Term::atom(name)).unwrap() - p).abs() < 1e-9),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_unsupported_tag() {
        let store = store();
        let mut session = QuerySession::open(&store, Engine::new());
        assert_eq!(
            session.prepare_tagged(vec![heads("c1")], vec![], "marginal", &QueryOptions::default()),
            Err(Error::UnsupportedQueryType("marginal".to_string()))
        );
        assert!(session.is_empty());
    }
}
