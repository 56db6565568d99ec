//! Query strategies.
//!
//! A [`Query`] is grounded once, while its session is open, and evaluated after the session closed.
//! The set of strategies is closed: exact algebraic model counting or forward sampling.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::circuit::{Evaluation, Failure, TargetKind};
use crate::database::Database;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::formula_cache::FormulaCache;
use crate::semiring::SemiringKind;
use crate::term::Term;

pub mod exact;
pub mod sample;

pub use exact::ExactQuery;
pub use sample::{CancellationToken, SampleQuery, SampledFormula};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryType {
    Probability,
    Mpe,
    MinPe,
    Sample,
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "probability" => Ok(QueryType::Probability),
            "mpe" => Ok(QueryType::Mpe),
            "minpe" => Ok(QueryType::MinPe),
            "sample" => Ok(QueryType::Sample),
            _ => Err(Error::UnsupportedQueryType(s.to_string())),
        }
    }
}

impl Display for QueryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            QueryType::Probability => "probability",
            QueryType::Mpe => "mpe",
            QueryType::MinPe => "minpe",
            QueryType::Sample => "sample",
        };
        write!(f, "{}", tag)
    }
}

/// Strategy options. Exact queries use `target`; sampling uses the rest.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub target: TargetKind,
    /// Number of accepted samples to draw; `0` runs until cancelled.
    pub samples: usize,
    pub propagate_evidence: bool,
    /// Seed for reproducible sampling; drawn from the OS when `None`.
    pub seed: Option<u64>,
    pub cancel: Option<CancellationToken>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            target: TargetKind::Bdd,
            samples: 1,
            propagate_evidence: false,
            seed: None,
            cancel: None,
        }
    }
}

impl QueryOptions {
    pub fn with_target(mut self, target: TargetKind) -> Self {
        self.target = target;
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_propagate_evidence(mut self, propagate: bool) -> Self {
        self.propagate_evidence = propagate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExactResult {
    /// Weight of every query answer, in grounding order.
    pub weights: Vec<(Term, Evaluation)>,
    pub evidence: BTreeMap<Term, bool>,
}

impl ExactResult {
    /// Weight of `term`, if it was answered with a weight.
    pub fn weight(&self, term: &Term) -> Option<f64> {
        self.weights.iter().find(|(t, _)| t == term).and_then(|(_, e)| e.weight())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub samples: Vec<BTreeMap<Term, bool>>,
    pub evidence: BTreeMap<Term, bool>,
    /// Sampling stopped early on cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Exact(ExactResult),
    Sample(SampleResult),
    /// The whole query failed, e.g. its evidence was proven inconsistent before sampling.
    Failed(Failure),
}

#[derive(Debug)]
pub enum Query {
    Exact(ExactQuery),
    Sample(SampleQuery),
}

impl Query {
    /// Construct the strategy for `query_type`.
    pub fn create(query_type: QueryType, queries: Vec<Term>, evidence: Vec<(Term, bool)>, options: &QueryOptions) -> Self {
        match query_type {
            QueryType::Probability => {
                Query::Exact(ExactQuery::new(queries, evidence, SemiringKind::Probability, options.target))
            }
            QueryType::Mpe => Query::Exact(ExactQuery::new(queries, evidence, SemiringKind::MaxProduct, options.target)),
            QueryType::MinPe => {
                Query::Exact(ExactQuery::new(queries, evidence, SemiringKind::MinProduct, options.target))
            }
            QueryType::Sample => Query::Sample(SampleQuery::new(queries, evidence, options)),
        }
    }

    /// Construct the strategy named by `tag`.
    pub fn from_tag(tag: &str, queries: Vec<Term>, evidence: Vec<(Term, bool)>, options: &QueryOptions) -> Result<Self> {
        let query_type = tag.parse()?;
        Ok(Self::create(query_type, queries, evidence, options))
    }

    pub fn queries(&self) -> &[Term] {
        match self {
            Query::Exact(q) => q.queries(),
            Query::Sample(q) => q.queries(),
        }
    }

    pub fn is_grounded(&self) -> bool {
        match self {
            Query::Exact(q) => q.is_grounded(),
            Query::Sample(q) => q.is_grounded(),
        }
    }

    pub fn ground<D: Database + ?Sized>(&mut self, engine: &Engine, db: &D, cache: &mut FormulaCache) -> Result<()> {
        match self {
            Query::Exact(q) => q.ground(engine, db, cache),
            Query::Sample(q) => q.ground(engine, db),
        }
    }

    pub fn evaluate<D: Database + ?Sized>(&mut self, engine: &Engine, db: &D, cache: &mut FormulaCache) -> Result<QueryResult> {
        match self {
            Query::Exact(q) => q.evaluate(cache).map(QueryResult::Exact),
            Query::Sample(q) => q.evaluate(engine, db),
        }
    }
}
