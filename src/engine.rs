//! Top-down grounding.
//!
//! [`Engine::ground`] resolves a term against a [`Database`] by SLD resolution and writes the
//! formula of every answer into a [`GroundTarget`]. Clause variables are renamed apart per use.
//!
//! Calls are tabled by variant. A call that is a variant of one still in progress consumes the
//! answers found so far, and the outermost call of the cycle repeats until its tables stop growing,
//! so left recursion finds every answer. The derivations collected on the way are then turned
//! into formulas with cycles broken: a derivation that leads back to an answer still being built
//! is dropped, which leaves exactly the well-founded proofs.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::database::{Database, Node};
use crate::error::{Error, Result};
use crate::formula::{AtomKey, GroundTarget, Label, LabelKind, LabelScope};
use crate::program::Goal;
use crate::reference::NodeRef;
use crate::term::{renamed, Substitution, Term};

#[derive(Debug, Copy, Clone)]
pub struct EngineConfig {
    /// Maximum call nesting before grounding fails with [`Error::DepthLimit`].
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

impl EngineConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ground every answer of `term` and bind each answer instance to `label`.
    ///
    /// A ground term without answers is bound to `FALSE`, so the caller can still find it.
    pub fn ground<D, T>(&self, db: &D, target: &mut T, term: &Term, label: Label) -> Result<Vec<(Term, NodeRef)>>
    where
        D: Database + ?Sized,
        T: GroundTarget + ?Sized,
    {
        debug!("ground({}, {:?})", term, label);
        let mut grounder = Grounder::new(db, target, self.config.max_depth);
        let mut answers = Vec::new();
        for key in grounder.call(term, 0)? {
            let node = grounder.formula(&key);
            if !node.is_false() {
                answers.push((key, node));
            }
        }
        if answers.is_empty() && term.is_ground() {
            answers.push((term.clone(), NodeRef::FALSE));
        }
        for (name, node) in &answers {
            grounder.target.add_name(name.clone(), *node, label);
        }
        Ok(answers)
    }

    /// Ground evidence terms under the evidence labels of `scope` (global if `None`).
    ///
    /// Evidence terms must be ground. Returns the `(term, node, value)` triples.
    pub fn ground_evidence<D, T>(
        &self,
        db: &D,
        target: &mut T,
        evidence: &[(Term, bool)],
        scope: Option<LabelScope>,
    ) -> Result<Vec<(Term, NodeRef, bool)>>
    where
        D: Database + ?Sized,
        T: GroundTarget + ?Sized,
    {
        let mut out = Vec::with_capacity(evidence.len());
        for (term, value) in evidence {
            if !term.is_ground() {
                return Err(Error::NonGroundAtom(term.clone()));
            }
            let kind = LabelKind::evidence(*value);
            let label = match scope {
                Some(scope) => Label::scoped(kind, scope),
                None => Label::global(kind),
            };
            let answers = self.ground(db, target, term, label)?;
            // A ground term has at most one answer instance.
            let node = answers.first().map(|(_, n)| *n).unwrap_or(NodeRef::FALSE);
            out.push((term.clone(), node, *value));
        }
        Ok(out)
    }
}

/// One literal of a ground derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Literal {
    Node(NodeRef),
    /// A tabled answer, by the canonical form of its instance.
    Answer(Term),
    /// Negation of the disjunction of the inner derivations.
    Not(Vec<Derivation>),
}

type Derivation = Vec<Literal>;

#[derive(Debug, Default)]
struct Table {
    answers: IndexSet<Term>,
    complete: bool,
}

#[derive(Debug)]
struct Frame {
    key: Term,
    /// Lowest stack position this frame depends on while that position is still in progress.
    low: usize,
}

impl Frame {
    fn new(key: Term) -> Self {
        Self { key, low: usize::MAX }
    }
}

struct Grounder<'a, D: ?Sized, T: ?Sized> {
    db: &'a D,
    target: &'a mut T,
    max_depth: usize,
    tag: usize,
    /// Answer tables, by the canonical form of the call.
    tables: HashMap<Term, Table>,
    /// Derivations of every answer instance found so far.
    derivations: IndexMap<Term, IndexSet<Derivation>>,
    /// Calls currently being resolved.
    stack: Vec<Frame>,
    /// Incomplete tables waiting for the leader of their cycle.
    pending: Vec<Term>,
    changed: bool,
    /// Answers whose formula is being built.
    building: Vec<Frame>,
    /// Formulas that do not depend on the answers being built around them.
    formulas: HashMap<Term, NodeRef>,
}

impl<'a, D, T> Grounder<'a, D, T>
where
    D: Database + ?Sized,
    T: GroundTarget + ?Sized,
{
    fn new(db: &'a D, target: &'a mut T, max_depth: usize) -> Self {
        Self {
            db,
            target,
            max_depth,
            tag: 0,
            tables: HashMap::new(),
            derivations: IndexMap::new(),
            stack: Vec::new(),
            pending: Vec::new(),
            changed: false,
            building: Vec::new(),
            formulas: HashMap::new(),
        }
    }

    fn fresh_tag(&mut self) -> usize {
        self.tag += 1;
        self.tag
    }

    /// Mark the current call as depending on the in-progress call at stack position `pos`.
    fn lower(&mut self, pos: usize) {
        if let Some(frame) = self.stack.last_mut() {
            frame.low = frame.low.min(pos);
        }
    }

    /// Answer instances of the call `term`, as canonical terms.
    ///
    /// A call that is a variant of one still in progress consumes the answers found so far. The
    /// outermost call of such a cycle repeats its clauses until no table grows, then completes
    /// every table of the cycle.
    fn call(&mut self, term: &Term, depth: usize) -> Result<Vec<Term>> {
        if depth > self.max_depth {
            return Err(Error::DepthLimit(self.max_depth));
        }
        let Some((functor, arity)) = term.signature() else {
            return Err(Error::NonGroundAtom(term.clone()));
        };
        let key = term.canonical();
        if let Some(table) = self.tables.get(&key) {
            if table.complete {
                return Ok(table.answers.iter().cloned().collect());
            }
            if let Some(pos) = self.stack.iter().position(|f| f.key == key) {
                debug!("{} is in progress, consuming {} answers", term, table.answers.len());
                let answers = table.answers.iter().cloned().collect();
                self.lower(pos);
                return Ok(answers);
            }
        }
        let Some(clauses) = self.db.clauses(functor, arity) else {
            return Err(Error::UnknownPredicate {
                functor: functor.to_string(),
                arity,
            });
        };

        let pos = self.stack.len();
        let mark = self.pending.len();
        self.tables.entry(key.clone()).or_default();
        self.stack.push(Frame::new(key.clone()));
        let result = self.fixpoint(term, &key, &clauses, depth);
        let low = self.stack.pop().map_or(usize::MAX, |f| f.low);
        result?;

        if low < pos {
            self.lower(low);
            self.pending.push(key.clone());
        } else {
            for k in self.pending.drain(mark..).chain(std::iter::once(key.clone())) {
                if let Some(table) = self.tables.get_mut(&k) {
                    table.complete = true;
                }
            }
        }
        Ok(self
            .tables
            .get(&key)
            .map(|t| t.answers.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn fixpoint(&mut self, term: &Term, key: &Term, clauses: &[usize], depth: usize) -> Result<()> {
        let outer = std::mem::replace(&mut self.changed, false);
        let mut grew = false;
        loop {
            self.changed = false;
            for (instance, derivation) in self.resolve_clauses(term, clauses, depth)? {
                let instance = instance.canonical();
                if let Some(table) = self.tables.get_mut(key) {
                    self.changed |= table.answers.insert(instance.clone());
                }
                self.changed |= self.derivations.entry(instance).or_default().insert(derivation);
            }
            grew |= self.changed;
            // Answers only come out partial when some in-progress table was consumed.
            let consumed = self.stack.last().is_some_and(|f| f.low != usize::MAX);
            if !self.changed || !consumed {
                break;
            }
        }
        self.changed = outer || grew;
        Ok(())
    }

    fn resolve_clauses(&mut self, term: &Term, clauses: &[usize], depth: usize) -> Result<Vec<(Term, Derivation)>> {
        let db = self.db;
        let mut answers = Vec::new();
        for &index in clauses {
            let tag = self.fresh_tag();
            match db.node(index) {
                Node::Fact(fact) => {
                    let mut subst = Substitution::new();
                    if !subst.unify(term, &fact.atom.rename(tag)) {
                        continue;
                    }
                    let instance = subst.resolve(term);
                    let mut derivation = Derivation::new();
                    if let Some(p) = fact.probability {
                        if !instance.is_ground() {
                            return Err(Error::NonGroundAtom(instance));
                        }
                        let key = AtomKey::fact(index, instance.args().to_vec());
                        let atom = self.target.add_atom(key, p, &instance, None);
                        if !conjoin(&mut derivation, atom) {
                            continue;
                        }
                    }
                    answers.push((instance, derivation));
                }
                Node::Clause(clause) => {
                    let mut subst = Substitution::new();
                    if !subst.unify(term, &clause.head.rename(tag)) {
                        continue;
                    }
                    let body = clause.body.rename(tag);
                    for (subst, mut derivation) in self.solve(&body, subst, depth)? {
                        let instance = subst.resolve(term);
                        let bindings = |vars: &[String]| -> Result<Vec<Term>> {
                            let args: Vec<Term> = vars.iter().map(|v| subst.resolve(&Term::var(renamed(v, tag)))).collect();
                            if args.iter().all(Term::is_ground) {
                                Ok(args)
                            } else {
                                Err(Error::NonGroundAtom(instance.clone()))
                            }
                        };
                        let atom = if let Some(choice) = clause.choice {
                            let Node::Choice(header) = db.node(choice.header) else {
                                panic!("Node {} is not a choice header", choice.header);
                            };
                            let key = AtomKey::choice(choice.header, bindings(&header.variables)?, choice.index);
                            let p = header.probabilities[choice.index];
                            self.target.add_atom(key, p, &instance, Some(header.probabilities.as_slice()))
                        } else if let Some(p) = clause.probability {
                            let key = AtomKey::fact(index, bindings(&clause.variables)?);
                            self.target.add_atom(key, p, &instance, None)
                        } else {
                            NodeRef::TRUE
                        };
                        if conjoin(&mut derivation, atom) {
                            answers.push((instance, derivation));
                        }
                    }
                }
                Node::Define(_) | Node::Choice(_) => {}
            }
        }
        Ok(answers)
    }

    fn solve(&mut self, goal: &Goal, subst: Substitution, depth: usize) -> Result<Vec<(Substitution, Derivation)>> {
        match goal {
            Goal::True => Ok(vec![(subst, Derivation::new())]),
            Goal::Fail => Ok(Vec::new()),
            Goal::Unify(a, b) => {
                let mut s = subst;
                if s.unify(a, b) {
                    Ok(vec![(s, Derivation::new())])
                } else {
                    Ok(Vec::new())
                }
            }
            Goal::NotUnify(a, b) => {
                if subst.clone().unify(a, b) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![(subst, Derivation::new())])
                }
            }
            Goal::Call(term) => {
                let call = subst.resolve(term);
                let mut out = Vec::new();
                for key in self.call(&call, depth + 1)? {
                    let tag = self.fresh_tag();
                    let mut s = subst.clone();
                    if s.unify(&call, &key.rename(tag)) {
                        out.push((s, vec![Literal::Answer(key)]));
                    }
                }
                Ok(out)
            }
            Goal::Not(inner) => {
                if let Some(term) = non_ground(inner, &subst) {
                    return Err(Error::NonGroundNegation(term));
                }
                let inner: Vec<Derivation> = self.solve(inner, subst.clone(), depth)?.into_iter().map(|(_, d)| d).collect();
                if inner.is_empty() {
                    Ok(vec![(subst, Derivation::new())])
                } else if inner.iter().any(Vec::is_empty) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![(subst, vec![Literal::Not(inner)])])
                }
            }
            Goal::Conj(goals) => {
                let mut answers = vec![(subst, Derivation::new())];
                for g in goals {
                    let mut next = Vec::new();
                    for (s, derivation) in answers {
                        for (s2, d2) in self.solve(g, s, depth)? {
                            let mut d = derivation.clone();
                            d.extend(d2);
                            next.push((s2, d));
                        }
                    }
                    answers = next;
                    if answers.is_empty() {
                        break;
                    }
                }
                Ok(answers)
            }
            Goal::Disj(goals) => {
                let mut answers = Vec::new();
                for g in goals {
                    answers.extend(self.solve(g, subst.clone(), depth)?);
                }
                Ok(answers)
            }
        }
    }

    /// Formula of the tabled answer `key`: the disjunction of its derivations.
    ///
    /// A derivation that runs back into an answer whose formula is still being built contributes
    /// nothing, so only proofs without repeated atoms count. A formula built without hitting any
    /// enclosing answer is the same in every context and is memoized.
    fn formula(&mut self, key: &Term) -> NodeRef {
        if let Some(&node) = self.formulas.get(key) {
            return node;
        }
        if let Some(pos) = self.building.iter().position(|f| &f.key == key) {
            if let Some(frame) = self.building.last_mut() {
                frame.low = frame.low.min(pos);
            }
            return NodeRef::FALSE;
        }

        let pos = self.building.len();
        self.building.push(Frame::new(key.clone()));
        let derivations: Vec<Derivation> = self
            .derivations
            .get(key)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        let mut nodes = Vec::with_capacity(derivations.len());
        for derivation in &derivations {
            nodes.push(self.conjunction(derivation));
        }
        let node = self.target.add_or(nodes);
        let low = self.building.pop().map_or(usize::MAX, |f| f.low);

        if low < pos {
            if let Some(frame) = self.building.last_mut() {
                frame.low = frame.low.min(low);
            }
        } else {
            self.formulas.insert(key.clone(), node);
        }
        node
    }

    fn conjunction(&mut self, derivation: &[Literal]) -> NodeRef {
        let mut node = NodeRef::TRUE;
        for literal in derivation {
            let next = match literal {
                Literal::Node(n) => *n,
                Literal::Answer(key) => self.formula(key),
                Literal::Not(inner) => {
                    let mut nodes = Vec::with_capacity(inner.len());
                    for d in inner {
                        nodes.push(self.conjunction(d));
                    }
                    -self.target.add_or(nodes)
                }
            };
            node = self.target.add_and(node, next);
            if node.is_false() {
                break;
            }
        }
        node
    }
}

/// Append `node` to `derivation`. Returns `false` if the derivation can no longer hold.
fn conjoin(derivation: &mut Derivation, node: NodeRef) -> bool {
    if node.is_false() {
        return false;
    }
    if !node.is_true() {
        derivation.push(Literal::Node(node));
    }
    true
}

/// First non-ground term of `goal` under `subst`, if any.
fn non_ground(goal: &Goal, subst: &Substitution) -> Option<Term> {
    match goal {
        Goal::True | Goal::Fail => None,
        Goal::Call(t) => {
            let t = subst.resolve(t);
            (!t.is_ground()).then_some(t)
        }
        Goal::Not(g) => non_ground(g, subst),
        Goal::Conj(gs) | Goal::Disj(gs) => gs.iter().find_map(|g| non_ground(g, subst)),
        Goal::Unify(a, b) | Goal::NotUnify(a, b) => {
            let t = Term::compound("=", [subst.resolve(a), subst.resolve(b)]);
            (!t.is_ground()).then_some(t)
        }
    }
}
