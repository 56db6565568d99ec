//! Clause database: an append-only arena of index-addressed statement nodes.
//!
//! Every predicate signature gets a [`DefineNode`] the first time it is seen.
//! The define node lists, as indices, the fact and clause nodes implementing the predicate.
//! Retracting statements only erases indices from these sets; nodes themselves are never removed
//! and indices are never reused.
//!
//! An annotated disjunction `p1::h1; ...; pn::hn :- body` is stored as one [`ChoiceNode`] header
//! followed by one [`ClauseNode`] per head, each pointing back at the header.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::error::{Error, Result};
use crate::program::{Goal, Statement};
use crate::term::Term;

/// Tolerance for annotated-disjunction probabilities summing above one.
const PROBABILITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct FactNode {
    pub atom: Term,
    pub probability: Option<f64>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChoiceRef {
    /// Index of the [`ChoiceNode`] header.
    pub header: usize,
    /// Position of this head within the disjunction.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClauseNode {
    pub head: Term,
    pub body: Goal,
    pub probability: Option<f64>,
    pub choice: Option<ChoiceRef>,
    /// Variables of head and body, in order of first occurrence.
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefineNode {
    pub functor: String,
    pub arity: usize,
    pub children: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceNode {
    pub probabilities: Vec<f64>,
    /// Variables of all heads and the body, in order of first occurrence.
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Fact(FactNode),
    Clause(ClauseNode),
    Define(DefineNode),
    Choice(ChoiceNode),
}

impl Node {
    /// Head of a fact or clause node; `None` for nodes that define nothing.
    pub fn head(&self) -> Option<&Term> {
        match self {
            Node::Fact(fact) => Some(&fact.atom),
            Node::Clause(clause) => Some(&clause.head),
            Node::Define(_) | Node::Choice(_) => None,
        }
    }
}

/// Read access to a clause database, as needed by grounding.
pub trait Database {
    /// Number of node slots, i.e. the next index to be assigned.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, index: usize) -> &Node;

    /// Indices of the nodes implementing `functor/arity` in database order,
    /// or `None` if the predicate was never defined.
    fn clauses(&self, functor: &str, arity: usize) -> Option<Vec<usize>>;
}

#[derive(Debug, Clone, Default)]
pub struct ClauseDb {
    /// Index of the first node held by this database.
    offset: usize,
    nodes: Vec<Node>,
    defines: HashMap<(String, usize), usize>,
}

impl ClauseDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty database whose first index is `offset`.
    pub fn with_offset(offset: usize) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        index.checked_sub(self.offset).and_then(|i| self.nodes.get(i))
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Node> {
        index.checked_sub(self.offset).and_then(move |i| self.nodes.get_mut(i))
    }

    /// Index of the define node for `functor/arity`.
    pub fn find(&self, functor: &str, arity: usize) -> Option<usize> {
        self.defines.get(&(functor.to_string(), arity)).copied()
    }

    /// Index of the define node for the predicate of `head`.
    pub fn find_head(&self, head: &Term) -> Option<usize> {
        head.signature().and_then(|(functor, arity)| self.find(functor, arity))
    }

    fn push(&mut self, node: Node) -> usize {
        let index = self.offset + self.nodes.len();
        self.nodes.push(node);
        index
    }

    fn define(&mut self, head: &Term) -> usize {
        let (functor, arity) = match head.signature() {
            Some((functor, arity)) => (functor.to_string(), arity),
            None => panic!("Statement head must be a compound term, got {}", head),
        };
        if let Some(&index) = self.defines.get(&(functor.clone(), arity)) {
            return index;
        }
        let index = self.push(Node::Define(DefineNode {
            functor: functor.clone(),
            arity,
            children: BTreeSet::new(),
        }));
        debug!("define {}/{} at {}", functor, arity, index);
        self.defines.insert((functor, arity), index);
        index
    }

    fn add_child(&mut self, define: usize, child: usize) {
        match self.get_mut(define) {
            Some(Node::Define(node)) => {
                node.children.insert(child);
            }
            other => panic!("Node {} is not a define node: {:?}", define, other),
        }
    }

    fn add_implementation(&mut self, head: &Term, node: Node) -> usize {
        let define = self.define(head);
        let index = self.push(node);
        self.add_child(define, index);
        index
    }

    /// Append a statement. Directives are not knowledge and are skipped.
    pub fn add_statement(&mut self, statement: Statement) -> Result<()> {
        debug!("add_statement({:?})", statement);
        validate(&statement)?;
        match statement {
            Statement::Fact { probability, atom } => {
                self.add_implementation(&atom.clone(), Node::Fact(FactNode { atom, probability }));
            }
            Statement::Clause { probability, head, body } => {
                let mut variables = head.variables();
                for v in body.variables() {
                    if !variables.contains(&v) {
                        variables.push(v);
                    }
                }
                self.add_implementation(
                    &head.clone(),
                    Node::Clause(ClauseNode {
                        head,
                        body,
                        probability,
                        choice: None,
                        variables,
                    }),
                );
            }
            Statement::Disjunction { heads, body } => {
                let mut variables = Vec::new();
                for (_, head) in &heads {
                    for v in head.variables() {
                        if !variables.contains(&v) {
                            variables.push(v);
                        }
                    }
                }
                for v in body.variables() {
                    if !variables.contains(&v) {
                        variables.push(v);
                    }
                }
                let header = self.push(Node::Choice(ChoiceNode {
                    probabilities: heads.iter().map(|(p, _)| *p).collect(),
                    variables: variables.clone(),
                }));
                for (index, (_, head)) in heads.into_iter().enumerate() {
                    self.add_implementation(
                        &head.clone(),
                        Node::Clause(ClauseNode {
                            head,
                            body: body.clone(),
                            probability: None,
                            choice: Some(ChoiceRef { header, index }),
                            variables: variables.clone(),
                        }),
                    );
                }
            }
            Statement::Query(_) | Statement::Evidence(..) => {
                debug!("skipping directive");
            }
        }
        Ok(())
    }

    /// Erase `indices` from the children of define node `define`.
    ///
    /// Returns the number of children actually erased.
    pub fn erase_children(&mut self, define: usize, indices: impl IntoIterator<Item = usize>) -> usize {
        match self.get_mut(define) {
            Some(Node::Define(node)) => indices.into_iter().filter(|i| node.children.remove(i)).count(),
            _ => 0,
        }
    }

    /// Iterate over `(index, node)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Node)> + '_ {
        self.nodes.iter().enumerate().map(move |(i, n)| (self.offset + i, n))
    }

    /// Iterate over all define nodes.
    pub fn defines(&self) -> impl Iterator<Item = (usize, &DefineNode)> + '_ {
        self.iter().filter_map(|(i, n)| match n {
            Node::Define(d) => Some((i, d)),
            _ => None,
        })
    }

    fn children_of(&self, functor: &str, arity: usize) -> Option<&BTreeSet<usize>> {
        match self.find(functor, arity).and_then(|d| self.get(d)) {
            Some(Node::Define(node)) => Some(&node.children),
            _ => None,
        }
    }
}

/// Check that `statement` can be added to a database: callable heads and probabilities in
/// `[0, 1]`, with the heads of an annotated disjunction summing to at most one.
pub fn validate(statement: &Statement) -> Result<()> {
    match statement {
        Statement::Fact { probability, atom } => {
            check_head(atom)?;
            check_probability(*probability, atom)
        }
        Statement::Clause { probability, head, .. } => {
            check_head(head)?;
            check_probability(*probability, head)
        }
        Statement::Disjunction { heads, .. } => {
            let mut total = 0.0;
            for (p, head) in heads {
                check_head(head)?;
                check_probability(Some(*p), head)?;
                total += p;
            }
            if total > 1.0 + PROBABILITY_EPSILON {
                let term = heads.first().map(|(_, h)| h.clone()).unwrap_or_else(|| Term::atom("?"));
                return Err(Error::InvalidProbability { probability: total, term });
            }
            Ok(())
        }
        Statement::Query(_) | Statement::Evidence(..) => Ok(()),
    }
}

fn check_head(head: &Term) -> Result<()> {
    match head.signature() {
        Some(_) => Ok(()),
        None => Err(Error::NonGroundAtom(head.clone())),
    }
}

fn check_probability(probability: Option<f64>, term: &Term) -> Result<()> {
    match probability {
        Some(p) if !(0.0..=1.0).contains(&p) || p.is_nan() => Err(Error::InvalidProbability {
            probability: p,
            term: term.clone(),
        }),
        _ => Ok(()),
    }
}

impl Database for ClauseDb {
    fn len(&self) -> usize {
        self.offset + self.nodes.len()
    }

    fn node(&self, index: usize) -> &Node {
        match self.get(index) {
            Some(node) => node,
            None => panic!("Node index {} out of range", index),
        }
    }

    fn clauses(&self, functor: &str, arity: usize) -> Option<Vec<usize>> {
        self.children_of(functor, arity).map(|c| c.iter().copied().collect())
    }
}

/// A private extension layered over a borrowed base database.
///
/// Statements added to the layer get indices after the base and never affect the base.
#[derive(Debug)]
pub struct LayeredDb<'a> {
    base: &'a ClauseDb,
    layer: ClauseDb,
}

impl<'a> LayeredDb<'a> {
    pub fn new(base: &'a ClauseDb) -> Self {
        Self {
            base,
            layer: ClauseDb::with_offset(base.len()),
        }
    }

    pub fn base(&self) -> &ClauseDb {
        self.base
    }

    pub fn layer(&self) -> &ClauseDb {
        &self.layer
    }

    pub fn add_statement(&mut self, statement: Statement) -> Result<()> {
        self.layer.add_statement(statement)
    }
}

impl Database for LayeredDb<'_> {
    fn len(&self) -> usize {
        self.layer.len()
    }

    fn node(&self, index: usize) -> &Node {
        if index < self.layer.offset() {
            self.base.node(index)
        } else {
            self.layer.node(index)
        }
    }

    fn clauses(&self, functor: &str, arity: usize) -> Option<Vec<usize>> {
        match (self.base.clauses(functor, arity), self.layer.clauses(functor, arity)) {
            (None, None) => None,
            (base, layer) => {
                let mut all = base.unwrap_or_default();
                all.extend(layer.unwrap_or_default());
                Some(all)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn heads(c: &str) -> Term {
        Term::compound("heads", [Term::atom(c)])
    }

    #[test]
    fn test_define_nodes() {
        let mut db = ClauseDb::new();
        db.add_statement(Statement::prob_fact(0.5, heads("c1"))).unwrap();
        db.add_statement(Statement::prob_fact(0.5, heads("c2"))).unwrap();

        // define node, fact, fact
        assert_eq!(db.len(), 3);
        let define = db.find("heads", 1).unwrap();
        assert_eq!(define, 0);
        assert_eq!(db.clauses("heads", 1), Some(vec![1, 2]));
        assert_eq!(db.clauses("tails", 1), None);
    }

    #[test]
    fn test_disjunction_layout() {
        let mut db = ClauseDb::new();
        db.add_statement(Statement::disjunction(
            [(0.4, heads("c1")), (0.6, Term::compound("tails", [Term::atom("c1")]))],
            Goal::True,
        ))
        .unwrap();

        // choice header, define heads, clause, define tails, clause
        assert!(matches!(db.node(0), Node::Choice(_)));
        let heads_clauses = db.clauses("heads", 1).unwrap();
        let tails_clauses = db.clauses("tails", 1).unwrap();
        assert_eq!(heads_clauses.len(), 1);
        assert_eq!(tails_clauses.len(), 1);
        match db.node(tails_clauses[0]) {
            Node::Clause(c) => assert_eq!(c.choice, Some(ChoiceRef { header: 0, index: 1 })),
            other => panic!("expected clause, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_probabilities() {
        let mut db = ClauseDb::new();
        assert!(db.add_statement(Statement::prob_fact(1.5, heads("c1"))).is_err());
        assert!(db
            .add_statement(Statement::disjunction([(0.7, heads("a")), (0.7, heads("b"))], Goal::True))
            .is_err());
        assert!(db.add_statement(Statement::fact(Term::var("X"))).is_err());
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(&Statement::prob_fact(0.5, heads("c1"))), Ok(()));
        assert_eq!(validate(&Statement::Query(Term::var("X"))), Ok(()));
        assert!(matches!(
            validate(&Statement::clause(Term::int(3), Goal::True)),
            Err(Error::NonGroundAtom(_))
        ));
        assert_eq!(
            validate(&Statement::disjunction([(0.7, heads("a")), (0.7, heads("b"))], Goal::True)),
            Err(Error::InvalidProbability {
                probability: 1.4,
                term: heads("a"),
            })
        );
    }

    #[test]
    fn test_erase_children() {
        let mut db = ClauseDb::new();
        db.add_statement(Statement::fact(heads("c1"))).unwrap();
        db.add_statement(Statement::fact(heads("c2"))).unwrap();
        let define = db.find("heads", 1).unwrap();
        assert_eq!(db.erase_children(define, [1, 5]), 1);
        assert_eq!(db.clauses("heads", 1), Some(vec![2]));
    }

    #[test]
    fn test_layered_db() {
        let mut base = ClauseDb::new();
        base.add_statement(Statement::fact(heads("c1"))).unwrap();
        let mut layered = LayeredDb::new(&base);
        layered.add_statement(Statement::fact(heads("c2"))).unwrap();
        layered.add_statement(Statement::fact(Term::atom("win"))).unwrap();

        assert_eq!(layered.clauses("heads", 1), Some(vec![1, 3]));
        assert_eq!(layered.clauses("win", 0), Some(vec![5]));
        assert_eq!(base.clauses("heads", 1), Some(vec![1]));
        assert_eq!(base.len(), 2);
        assert_eq!(layered.node(3).head(), Some(&heads("c2")));
    }
}
