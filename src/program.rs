//! Statements and goals, as produced by a parser front end.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::term::Term;

/// Clause body.
#[derive(Debug, Clone, PartialEq)]
pub enum Goal {
    True,
    Fail,
    Call(Term),
    /// Negation as failure. The goal must be ground when it is called.
    Not(Box<Goal>),
    Conj(Vec<Goal>),
    Disj(Vec<Goal>),
    Unify(Term, Term),
    NotUnify(Term, Term),
}

impl Goal {
    pub fn call(term: Term) -> Self {
        Goal::Call(term)
    }

    pub fn not(goal: Goal) -> Self {
        Goal::Not(Box::new(goal))
    }

    pub fn conj(goals: impl IntoIterator<Item = Goal>) -> Self {
        Goal::Conj(goals.into_iter().collect())
    }

    pub fn disj(goals: impl IntoIterator<Item = Goal>) -> Self {
        Goal::Disj(goals.into_iter().collect())
    }

    pub fn rename(&self, tag: usize) -> Goal {
        match self {
            Goal::True => Goal::True,
            Goal::Fail => Goal::Fail,
            Goal::Call(t) => Goal::Call(t.rename(tag)),
            Goal::Not(g) => Goal::Not(Box::new(g.rename(tag))),
            Goal::Conj(gs) => Goal::Conj(gs.iter().map(|g| g.rename(tag)).collect()),
            Goal::Disj(gs) => Goal::Disj(gs.iter().map(|g| g.rename(tag)).collect()),
            Goal::Unify(a, b) => Goal::Unify(a.rename(tag), b.rename(tag)),
            Goal::NotUnify(a, b) => Goal::NotUnify(a.rename(tag), b.rename(tag)),
        }
    }

    /// Variables of the goal in order of first occurrence.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_variables(&mut seen, &mut out);
        out
    }

    fn collect_variables(&self, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match self {
            Goal::True | Goal::Fail => {}
            Goal::Call(t) => t.collect_variables(seen, out),
            Goal::Not(g) => g.collect_variables(seen, out),
            Goal::Conj(gs) | Goal::Disj(gs) => {
                for g in gs {
                    g.collect_variables(seen, out);
                }
            }
            Goal::Unify(a, b) | Goal::NotUnify(a, b) => {
                a.collect_variables(seen, out);
                b.collect_variables(seen, out);
            }
        }
    }
}

/// An inline query `goal | condition`.
///
/// The condition is a conjunction of literals `e` or `\+e`, read as positive and negative
/// evidence. `Goal::True` means no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineQuery {
    pub goal: Goal,
    pub condition: Goal,
}

impl InlineQuery {
    pub fn new(goal: Goal) -> Self {
        Self {
            goal,
            condition: Goal::True,
        }
    }

    pub fn given(mut self, condition: Goal) -> Self {
        self.condition = condition;
        self
    }

    /// Evidence pairs of the condition, in order.
    pub fn evidence(&self) -> Result<Vec<(Term, bool)>> {
        let mut out = Vec::new();
        collect_evidence(&self.condition, &mut out)?;
        Ok(out)
    }
}

fn collect_evidence(goal: &Goal, out: &mut Vec<(Term, bool)>) -> Result<()> {
    match goal {
        Goal::True => {}
        Goal::Call(t) => out.push((t.clone(), true)),
        Goal::Not(inner) => match inner.as_ref() {
            Goal::Call(t) => out.push((t.clone(), false)),
            other => return Err(Error::InvalidEvidence(Goal::Not(Box::new(other.clone())))),
        },
        Goal::Conj(goals) => {
            for g in goals {
                collect_evidence(g, out)?;
            }
        }
        other => return Err(Error::InvalidEvidence(other.clone())),
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `p::atom.` or `atom.`
    Fact { probability: Option<f64>, atom: Term },
    /// `p::head :- body.` or `head :- body.`
    Clause {
        probability: Option<f64>,
        head: Term,
        body: Goal,
    },
    /// Annotated disjunction `p1::h1; ...; pn::hn :- body.`
    Disjunction { heads: Vec<(f64, Term)>, body: Goal },
    /// `query(term).`
    Query(Term),
    /// `evidence(term, value).`
    Evidence(Term, bool),
}

impl Statement {
    pub fn fact(atom: Term) -> Self {
        Statement::Fact { probability: None, atom }
    }

    pub fn prob_fact(probability: f64, atom: Term) -> Self {
        Statement::Fact {
            probability: Some(probability),
            atom,
        }
    }

    pub fn clause(head: Term, body: Goal) -> Self {
        Statement::Clause {
            probability: None,
            head,
            body,
        }
    }

    pub fn prob_clause(probability: f64, head: Term, body: Goal) -> Self {
        Statement::Clause {
            probability: Some(probability),
            head,
            body,
        }
    }

    pub fn disjunction(heads: impl IntoIterator<Item = (f64, Term)>, body: Goal) -> Self {
        Statement::Disjunction {
            heads: heads.into_iter().collect(),
            body,
        }
    }

    pub fn is_directive(&self) -> bool {
        matches!(self, Statement::Query(_) | Statement::Evidence(..))
    }
}

/// A batch of statements split into knowledge and directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub statements: Vec<Statement>,
    pub queries: Vec<Term>,
    pub evidence: Vec<(Term, bool)>,
}

impl Cell {
    pub fn split(statements: impl IntoIterator<Item = Statement>) -> Self {
        let mut cell = Cell::default();
        for stmt in statements {
            match stmt {
                Statement::Query(t) => cell.queries.push(t),
                Statement::Evidence(t, value) => cell.evidence.push((t, value)),
                other => cell.statements.push(other),
            }
        }
        cell
    }
}
