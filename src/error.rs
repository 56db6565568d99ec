//! Error types for the knowledge base and its query sessions.
//!
//! Usage errors (duplicate theories, closed sessions, evaluating before
//! grounding) and grounding errors are reported through [`Error`].
//! A query that grounds but cannot hold under its evidence is *not* an error:
//! it is reported as [`Failure`][crate::circuit::Failure] inside the result.

use thiserror::Error;

use crate::program::Goal;
use crate::term::Term;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("theory already exists: {0}")]
    TheoryExists(String),

    #[error("theory does not exist: {0}")]
    TheoryNotFound(String),

    #[error("query session is closed, no more queries can be prepared")]
    SessionClosed,

    #[error("query was evaluated before it was grounded")]
    NotGrounded,

    #[error("query was already grounded")]
    AlreadyGrounded,

    #[error("formula cache is locked, no new grounding batches are accepted")]
    CacheLocked,

    #[error("query type not supported: {0}")]
    UnsupportedQueryType(String),

    #[error("unknown predicate: {functor}/{arity}")]
    UnknownPredicate { functor: String, arity: usize },

    #[error("negated goal is not ground: {0}")]
    NonGroundNegation(Term),

    #[error("probabilistic atom is not ground: {0}")]
    NonGroundAtom(Term),

    #[error("not an evidence literal: {0:?}")]
    InvalidEvidence(Goal),

    #[error("grounding depth limit of {0} exceeded")]
    DepthLimit(usize),

    #[error("invalid probability {probability} in statement for {term}")]
    InvalidProbability { probability: f64, term: Term },
}

pub type Result<T> = std::result::Result<T, Error>;
