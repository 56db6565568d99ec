//! # plp-rs: an incremental probabilistic logic knowledge base
//!
//! **`plp-rs`** keeps a shared, incrementally editable base of probabilistic logic statements
//! and answers probabilistic queries against it.
//!
//! ## Key Features
//!
//! - **Retractable theories**: named chunks of statements are appended to one shared
//!   [`ClauseDb`][crate::database::ClauseDb] by the [`TheoryStore`][crate::theory::TheoryStore]
//!   and can be removed again without rebuilding the database.
//! - **Versioned compilation**: queries of one session ground into a shared
//!   [`FormulaGraph`][crate::formula::FormulaGraph]; the [`FormulaCache`][crate::formula_cache::FormulaCache]
//!   compiles it into a BDD-based [`Circuit`][crate::circuit::Circuit] only when it is stale.
//! - **Two inference strategies**: exact algebraic model counting over a [`Semiring`][crate::semiring::Semiring]
//!   (probability, MPE, MinPE), and forward sampling with rejection, optional evidence propagation
//!   and cooperative cancellation.
//!
//! ## Basic Usage
//!
//! ```rust
//! use plp_rs::engine::Engine;
//! use plp_rs::program::{Goal, Statement};
//! use plp_rs::query::{QueryOptions, QueryResult, QueryType};
//! use plp_rs::session::QuerySession;
//! use plp_rs::term::Term;
//! use plp_rs::theory::TheoryStore;
//!
//! // 1. Add a theory: an annotated disjunction over one coin
//! let heads = Term::compound("heads", [Term::atom("c1")]);
//! let tails = Term::compound("tails", [Term::atom("c1")]);
//! let mut store = TheoryStore::new();
//! store
//!     .add("coin", [Statement::disjunction([(0.4, heads.clone()), (0.6, tails.clone())], Goal::True)])
//!     .unwrap();
//!
//! // 2. Prepare a query with evidence in a session
//! let mut session = QuerySession::open(&store, Engine::new());
//! session
//!     .prepare(vec![heads.clone()], vec![(tails, false)], QueryType::Probability, &QueryOptions::default())
//!     .unwrap();
//!
//! // 3. Evaluate: the session is closed afterwards
//! let results = session.evaluate_all().unwrap();
//! match &results[0] {
//!     QueryResult::Exact(r) => assert!((r.weight(&heads).unwrap() - 1.0).abs() < 1e-9),
//!     other => panic!("unexpected result: {:?}", other),
//! }
//! ```
//!
//! ## Core Components
//!
//! - **[`theory`]**: named statement ranges and their retraction.
//! - **[`engine`]**: grounding of terms against a [`database`] into a [`formula`] graph.
//! - **[`formula_cache`]** and **[`circuit`]**: versioned compilation and model counting on top of [`bdd`].
//! - **[`query`]** and **[`session`]**: query strategies and their batch lifecycle.

pub mod bdd;
pub mod cache;
pub mod circuit;
pub mod database;
pub mod dot;
pub mod engine;
pub mod error;
pub mod formula;
pub mod formula_cache;
pub mod program;
pub mod query;
pub mod reference;
pub mod semiring;
pub mod session;
pub mod table;
pub mod term;
pub mod theory;
