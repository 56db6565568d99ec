//! Compiled circuits and weighted model counting.
//!
//! A [`Circuit`] is a BDD image of a whole [`FormulaGraph`]: one BDD per formula node, plus one
//! exactly-one constraint per annotated-disjunction group. The constraint ranges over the group's
//! choice variables and a residual variable carrying the mass `1 - Σp` of "no head".
//!
//! Evaluation computes the algebraic model count of `query ∧ evidence ∧ constraints`, smoothed over
//! its support, and normalizes it by the count of `evidence ∧ constraints`.
//! Only the constraints of groups that the query or the evidence depend on are conjoined.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use log::debug;
use thiserror::Error;

use crate::bdd::{Bdd, Ref};
use crate::formula::{FormulaGraph, FormulaNode, Label};
use crate::reference::NodeRef;
use crate::semiring::Semiring;
use crate::term::Term;

/// Residual masses below this are treated as exactly zero.
const RESIDUAL_EPSILON: f64 = 1e-12;

/// Kind of compiled circuit. Every kind is cached independently.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum TargetKind {
    /// BDD with variables in atom creation order.
    #[default]
    Bdd,
    /// BDD with variables in depth-first order from the labelled nodes.
    BddDfs,
}

impl Display for TargetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Bdd => write!(f, "bdd"),
            TargetKind::BddDfs => write!(f, "bdd-dfs"),
        }
    }
}

/// Why a query has no weight.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Failure {
    #[error("query is false")]
    QueryFalse,
    #[error("evidence is inconsistent")]
    InconsistentEvidence,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Evaluation {
    Weight(f64),
    Failed(Failure),
}

impl Evaluation {
    pub fn weight(&self) -> Option<f64> {
        match self {
            Evaluation::Weight(w) => Some(*w),
            Evaluation::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Evaluation::Failed(_))
    }
}

#[derive(Debug, Copy, Clone)]
enum Literal {
    /// Independent probabilistic atom: weights `p` and `1 - p`.
    Fact(f64),
    /// Annotated-disjunction choice or residual: weights `p` and `1`.
    Choice(f64),
}

#[derive(Debug)]
struct Group {
    variables: BTreeSet<u32>,
    constraint: Ref,
}

#[derive(Debug)]
pub struct Circuit {
    kind: TargetKind,
    bdd: Bdd,
    /// BDD of every formula node, by node index.
    nodes: Vec<Ref>,
    /// Literal of BDD variable `v` at position `v - 1`.
    literals: Vec<Literal>,
    groups: Vec<Group>,
    names: HashMap<Label, Vec<(Term, NodeRef)>>,
}

impl Circuit {
    pub fn compile(graph: &FormulaGraph, kind: TargetKind) -> Self {
        let order = match kind {
            TargetKind::Bdd => graph.atoms().map(|(r, _)| r.index()).collect(),
            TargetKind::BddDfs => dfs_order(graph),
        };
        debug!("compile({}) over {} nodes, {} atoms", kind, graph.len(), order.len());

        let bdd = Bdd::default();
        let mut variables: HashMap<usize, u32> = HashMap::new();
        let mut literals = Vec::with_capacity(order.len());
        for index in order {
            let FormulaNode::Atom(atom) = graph.node(index) else {
                continue;
            };
            let literal = if atom.key.choice.is_some() {
                Literal::Choice(atom.probability)
            } else {
                Literal::Fact(atom.probability)
            };
            literals.push(literal);
            variables.insert(index, literals.len() as u32);
        }

        let mut nodes: Vec<Ref> = Vec::with_capacity(graph.len());
        for (index, node) in graph.nodes() {
            let child = |nodes: &Vec<Ref>, r: NodeRef| {
                let b = nodes[r.index()];
                if r.is_negated() {
                    -b
                } else {
                    b
                }
            };
            let b = match node {
                FormulaNode::True => bdd.one,
                FormulaNode::Atom(_) => bdd.mk_var(variables[&index]),
                FormulaNode::Conj(children) => bdd.apply_and_many(children.iter().map(|&c| child(&nodes, c))),
                FormulaNode::Disj(children) => bdd.apply_or_many(children.iter().map(|&c| child(&nodes, c))),
            };
            nodes.push(b);
        }

        let mut groups = Vec::new();
        for (key, choices) in graph.groups() {
            let mut mass = 0.0;
            let mut vars: Vec<u32> = Vec::with_capacity(choices.len() + 1);
            for choice in choices {
                if let FormulaNode::Atom(atom) = graph.node(choice.index()) {
                    mass += atom.probability;
                }
                vars.push(variables[&choice.index()]);
            }
            let residual = 1.0 - mass;
            let residual = if residual < RESIDUAL_EPSILON { 0.0 } else { residual };
            literals.push(Literal::Choice(residual));
            vars.push(literals.len() as u32);
            debug!("group {:?}: {} choices, residual {}", key, choices.len(), residual);

            let refs: Vec<Ref> = vars.iter().map(|&v| bdd.mk_var(v)).collect();
            groups.push(Group {
                variables: vars.into_iter().collect(),
                constraint: bdd.exactly_one(&refs),
            });
        }

        let names = graph.labels().map(|label| (label, graph.names(label))).collect();
        debug!("compiled {:?}", bdd);

        Self {
            kind,
            bdd,
            nodes,
            literals,
            groups,
            names,
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Number of BDD nodes backing the circuit.
    pub fn size(&self) -> usize {
        self.bdd.size()
    }

    /// Nodes bound to `label` at compile time.
    pub fn names(&self, label: Label) -> Vec<(Term, NodeRef)> {
        self.names.get(&label).cloned().unwrap_or_default()
    }

    fn to_bdd(&self, node: NodeRef) -> Ref {
        let b = self.nodes[node.index()];
        if node.is_negated() {
            -b
        } else {
            b
        }
    }

    /// Weight of `node` conditioned on `evidence` under `semiring`.
    pub fn evaluate<S: Semiring + ?Sized>(&self, node: NodeRef, evidence: &[(NodeRef, bool)], semiring: &S) -> Evaluation {
        if node.is_false() {
            return Evaluation::Failed(Failure::QueryFalse);
        }

        let bdd = &self.bdd;
        let e = bdd.apply_and_many(evidence.iter().map(|&(n, value)| {
            let b = self.to_bdd(n);
            if value {
                b
            } else {
                -b
            }
        }));
        let q = self.to_bdd(node);
        let qe = bdd.apply_and(q, e);

        let mut support = bdd.support(q);
        support.extend(bdd.support(e));
        let constraints = bdd.apply_and_many(
            self.groups
                .iter()
                .filter(|g| !g.variables.is_disjoint(&support))
                .map(|g| g.constraint),
        );

        let z = self.wmc(bdd.apply_and(e, constraints), semiring);
        if semiring.is_zero(z) {
            debug!("evaluate({}): normalization is zero", node);
            return Evaluation::Failed(Failure::InconsistentEvidence);
        }
        let w = self.wmc(bdd.apply_and(qe, constraints), semiring);
        debug!("evaluate({}): {} / {}", node, w, z);
        Evaluation::Weight(semiring.normalize(w, z))
    }

    fn weights<S: Semiring + ?Sized>(&self, v: u32, semiring: &S) -> (f64, f64) {
        match self.literals[(v - 1) as usize] {
            Literal::Fact(p) => (semiring.value(p), semiring.value(1.0 - p)),
            Literal::Choice(p) => (semiring.value(p), semiring.one()),
        }
    }

    /// Algebraic model count of `f` over its own support.
    fn wmc<S: Semiring + ?Sized>(&self, f: Ref, semiring: &S) -> f64 {
        let support: Vec<u32> = self.bdd.support(f).into_iter().collect();
        let mut counter = Counter {
            circuit: self,
            semiring,
            support: &support,
            memo: HashMap::new(),
        };
        let top = counter.level(f);
        let res = counter.count(f);
        semiring.times(counter.smooth(0, top), res)
    }
}

struct Counter<'a, S: ?Sized> {
    circuit: &'a Circuit,
    semiring: &'a S,
    support: &'a [u32],
    memo: HashMap<Ref, f64>,
}

impl<S: Semiring + ?Sized> Counter<'_, S> {
    /// Position of the node's variable in the support; terminals sit past the end.
    fn level(&self, node: Ref) -> usize {
        let bdd = &self.circuit.bdd;
        if bdd.is_terminal(node) {
            return self.support.len();
        }
        let v = bdd.variable(node.index());
        self.support.binary_search(&v).unwrap_or(self.support.len())
    }

    /// Product of `w(v) ⊕ w(¬v)` over the support variables skipped between two levels.
    fn smooth(&self, from: usize, to: usize) -> f64 {
        let mut res = self.semiring.one();
        for &v in &self.support[from..to] {
            let (pos, neg) = self.circuit.weights(v, self.semiring);
            res = self.semiring.times(res, self.semiring.plus(pos, neg));
        }
        res
    }

    fn count(&mut self, node: Ref) -> f64 {
        let circuit = self.circuit;
        let bdd = &circuit.bdd;
        if bdd.is_one(node) {
            return self.semiring.one();
        }
        if bdd.is_zero(node) {
            return self.semiring.zero();
        }
        if let Some(&res) = self.memo.get(&node) {
            return res;
        }

        let v = bdd.variable(node.index());
        let level = self.level(node);
        let (pos, neg) = circuit.weights(v, self.semiring);
        let low = bdd.low_node(node);
        let high = bdd.high_node(node);

        let low_count = self.count(low);
        let low_weight = self.semiring.times(neg, self.semiring.times(self.smooth(level + 1, self.level(low)), low_count));
        let high_count = self.count(high);
        let high_weight = self.semiring.times(pos, self.semiring.times(self.smooth(level + 1, self.level(high)), high_count));
        let res = self.semiring.plus(low_weight, high_weight);

        self.memo.insert(node, res);
        res
    }
}

/// Atom indices in depth-first order of first occurrence from the labelled nodes,
/// followed by unreachable atoms in creation order.
fn dfs_order(graph: &FormulaGraph) -> Vec<usize> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<usize> = graph.roots().iter().rev().map(|r| r.index()).collect();
    while let Some(index) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        match graph.node(index) {
            FormulaNode::Atom(_) => order.push(index),
            FormulaNode::Conj(children) | FormulaNode::Disj(children) => {
                stack.extend(children.iter().rev().map(|c| c.index()));
            }
            FormulaNode::True => {}
        }
    }
    for (r, _) in graph.atoms() {
        if !visited.contains(&r.index()) {
            order.push(r.index());
        }
    }
    order
}
