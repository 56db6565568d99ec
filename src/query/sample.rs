//! Forward sampling with rejection.
//!
//! Each draw grounds the evidence and the queries into a fresh [`SampledFormula`], which decides
//! every probabilistic atom by a coin flip the first time grounding reaches it. Draws that violate
//! the evidence are rejected. With evidence propagation, atoms the evidence forces are fixed up
//! front and never sampled.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::{QueryOptions, QueryResult, SampleResult};
use crate::circuit::Failure;
use crate::database::Database;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::formula::{AtomKey, FormulaGraph, GroundTarget, GroupKey, Label};
use crate::reference::NodeRef;
use crate::term::Term;

/// Cooperative cancellation flag, checked before every draw.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Ground target of a single draw: every atom evaluates to a constant.
pub struct SampledFormula<'a, R> {
    rng: &'a mut R,
    fixed: &'a HashMap<AtomKey, bool>,
    facts: HashMap<AtomKey, bool>,
    /// Chosen head of every annotated-disjunction group, `None` for "no head".
    groups: HashMap<GroupKey, Option<usize>>,
}

impl<'a, R: Rng> SampledFormula<'a, R> {
    pub fn new(rng: &'a mut R, fixed: &'a HashMap<AtomKey, bool>) -> Self {
        Self {
            rng,
            fixed,
            facts: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    fn sample_group(&mut self, group: &GroupKey, probabilities: &[f64]) -> Option<usize> {
        let mut weights = Vec::with_capacity(probabilities.len());
        for (i, &p) in probabilities.iter().enumerate() {
            let key = AtomKey::choice(group.origin, group.args.clone(), i);
            match self.fixed.get(&key) {
                Some(true) => return Some(i),
                Some(false) => weights.push(0.0),
                None => weights.push(p),
            }
        }
        let residual = (1.0 - probabilities.iter().sum::<f64>()).max(0.0);
        let total = weights.iter().sum::<f64>() + residual;
        if total <= 0.0 {
            return None;
        }
        let mut x = self.rng.random::<f64>() * total;
        for (i, w) in weights.into_iter().enumerate() {
            if x < w {
                return Some(i);
            }
            x -= w;
        }
        None
    }
}

impl<R: Rng> GroundTarget for SampledFormula<'_, R> {
    fn add_atom(&mut self, key: AtomKey, probability: f64, _name: &Term, group: Option<&[f64]>) -> NodeRef {
        if let Some(&value) = self.fixed.get(&key) {
            return NodeRef::constant(value);
        }
        let value = match (key.group(), key.choice) {
            (Some(g), Some(index)) => {
                let chosen = match self.groups.get(&g) {
                    Some(&chosen) => chosen,
                    None => {
                        let chosen = self.sample_group(&g, group.unwrap_or(&[probability]));
                        self.groups.insert(g, chosen);
                        chosen
                    }
                };
                chosen == Some(index)
            }
            _ => match self.facts.get(&key) {
                Some(&value) => value,
                None => {
                    let value = self.rng.random_bool(probability);
                    self.facts.insert(key, value);
                    value
                }
            },
        };
        NodeRef::constant(value)
    }

    fn add_and(&mut self, a: NodeRef, b: NodeRef) -> NodeRef {
        NodeRef::constant(a.is_true() && b.is_true())
    }

    fn add_or(&mut self, children: Vec<NodeRef>) -> NodeRef {
        NodeRef::constant(children.iter().any(|c| c.is_true()))
    }

    fn add_name(&mut self, _name: Term, _node: NodeRef, _label: Label) {}
}

#[derive(Debug, Default)]
struct Propagated {
    fixed: HashMap<AtomKey, bool>,
    evidence: BTreeMap<Term, bool>,
    inconsistent: bool,
}

#[derive(Debug)]
pub struct SampleQuery {
    queries: Vec<Term>,
    evidence: Vec<(Term, bool)>,
    samples: usize,
    propagate: bool,
    seed: Option<u64>,
    cancel: CancellationToken,
    grounded: bool,
    propagated: Option<Propagated>,
    rejected: usize,
}

impl SampleQuery {
    pub fn new(queries: Vec<Term>, evidence: Vec<(Term, bool)>, options: &QueryOptions) -> Self {
        Self {
            queries,
            evidence,
            samples: options.samples,
            propagate: options.propagate_evidence,
            seed: options.seed,
            cancel: options.cancel.clone().unwrap_or_default(),
            grounded: false,
            propagated: None,
            rejected: 0,
        }
    }

    pub fn queries(&self) -> &[Term] {
        &self.queries
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Draws rejected by the last evaluation.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Token that stops the sampling loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ground<D: Database + ?Sized>(&mut self, engine: &Engine, db: &D) -> Result<()> {
        if self.grounded {
            return Err(Error::AlreadyGrounded);
        }
        if self.propagate {
            let mut scratch = FormulaGraph::new();
            let grounded = engine.ground_evidence(db, &mut scratch, &self.evidence, None)?;
            let assumptions: Vec<(NodeRef, bool)> = grounded.iter().map(|(_, node, value)| (*node, *value)).collect();
            let mut propagated = Propagated {
                evidence: grounded.into_iter().map(|(term, _, value)| (term, value)).collect(),
                ..Propagated::default()
            };
            match scratch.propagate(&assumptions) {
                Some(values) => {
                    for (r, atom) in scratch.atoms() {
                        if let Some(&value) = values.get(&r.index()) {
                            propagated.fixed.insert(atom.key.clone(), value);
                        }
                    }
                    debug!("evidence propagation fixed {} atoms", propagated.fixed.len());
                }
                None => {
                    debug!("evidence propagation found a contradiction");
                    propagated.inconsistent = true;
                }
            }
            self.propagated = Some(propagated);
        }
        self.grounded = true;
        Ok(())
    }

    pub fn evaluate<D: Database + ?Sized>(&mut self, engine: &Engine, db: &D) -> Result<QueryResult> {
        if !self.grounded {
            return Err(Error::NotGrounded);
        }
        let no_fixed = HashMap::new();
        let (fixed, mut evidence) = match &self.propagated {
            Some(p) if p.inconsistent => return Ok(QueryResult::Failed(Failure::InconsistentEvidence)),
            Some(p) => (&p.fixed, Some(p.evidence.clone())),
            None => (&no_fixed, None),
        };

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        let mut samples = Vec::new();
        let mut rejected = 0;
        let mut cancelled = false;
        while self.samples == 0 || samples.len() < self.samples {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut draw = SampledFormula::new(&mut rng, fixed);
            let observed = engine.ground_evidence(db, &mut draw, &self.evidence, None)?;
            if observed.iter().any(|(_, node, value)| node.is_true() != *value) {
                rejected += 1;
                continue;
            }

            let mut values = BTreeMap::new();
            for query in &self.queries {
                for (name, node) in engine.ground(db, &mut draw, query, Label::QUERY)? {
                    values.insert(name, node.is_true());
                }
            }
            if evidence.is_none() {
                evidence = Some(observed.into_iter().map(|(term, _, value)| (term, value)).collect());
            }
            samples.push(values);
        }

        self.rejected = rejected;
        info!(
            "sampling: {} accepted, {} rejected{}",
            samples.len(),
            rejected,
            if cancelled { ", cancelled" } else { "" }
        );
        Ok(QueryResult::Sample(SampleResult {
            samples,
            evidence: evidence.unwrap_or_default(),
            cancelled,
        }))
    }
}
