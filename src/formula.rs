//! Ground formula graph.
//!
//! Grounding writes into a [`GroundTarget`]. The main target is the [`FormulaGraph`]:
//! an append-only arena of atoms, conjunctions and disjunctions shared by all queries of a session.
//! Nodes are hash-consed and constant-folded, and a node's children always have smaller indices
//! than the node itself, so a single pass in index order visits children before parents.
//!
//! Ground query and evidence terms are bound to nodes under a [`Label`].
//! Unscoped labels are global; a scoped label belongs to a single query instance.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;

use crate::reference::NodeRef;
use crate::term::Term;

/// Opaque per-query scope used to keep label bindings of different queries apart.
pub type LabelScope = u64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LabelKind {
    Query,
    EvidencePos,
    EvidenceNeg,
}

impl LabelKind {
    pub fn evidence(value: bool) -> Self {
        if value {
            LabelKind::EvidencePos
        } else {
            LabelKind::EvidenceNeg
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Label {
    pub kind: LabelKind,
    pub scope: Option<LabelScope>,
}

impl Label {
    pub const QUERY: Label = Label::global(LabelKind::Query);
    pub const EVIDENCE_POS: Label = Label::global(LabelKind::EvidencePos);
    pub const EVIDENCE_NEG: Label = Label::global(LabelKind::EvidenceNeg);

    pub const fn global(kind: LabelKind) -> Self {
        Label { kind, scope: None }
    }

    pub const fn scoped(kind: LabelKind, scope: LabelScope) -> Self {
        Label {
            kind,
            scope: Some(scope),
        }
    }

    pub fn evidence(value: bool) -> Self {
        Label::global(LabelKind::evidence(value))
    }
}

/// Identity of a probabilistic atom: the database node it stems from and its ground arguments.
///
/// For annotated-disjunction choices, `origin` is the choice header and `choice` the head position.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AtomKey {
    pub origin: usize,
    pub args: Vec<Term>,
    pub choice: Option<usize>,
}

impl AtomKey {
    pub fn fact(origin: usize, args: Vec<Term>) -> Self {
        Self {
            origin,
            args,
            choice: None,
        }
    }

    pub fn choice(origin: usize, args: Vec<Term>, index: usize) -> Self {
        Self {
            origin,
            args,
            choice: Some(index),
        }
    }

    /// The annotated-disjunction group this choice belongs to.
    pub fn group(&self) -> Option<GroupKey> {
        self.choice.map(|_| GroupKey {
            origin: self.origin,
            args: self.args.clone(),
        })
    }
}

/// Ground instance of an annotated disjunction; its choices are mutually exclusive.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupKey {
    pub origin: usize,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub key: AtomKey,
    pub probability: f64,
    /// Ground head the atom was created for (informational).
    pub name: Term,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaNode {
    True,
    Atom(Atom),
    Conj(Vec<NodeRef>),
    Disj(Vec<NodeRef>),
}

/// Destination of grounding.
pub trait GroundTarget {
    /// Add (or look up) the probabilistic atom `key`.
    ///
    /// `group` holds the probabilities of all heads of the annotated disjunction for choice atoms.
    fn add_atom(&mut self, key: AtomKey, probability: f64, name: &Term, group: Option<&[f64]>) -> NodeRef;

    fn add_and(&mut self, a: NodeRef, b: NodeRef) -> NodeRef;

    fn add_or(&mut self, children: Vec<NodeRef>) -> NodeRef;

    fn add_name(&mut self, name: Term, node: NodeRef, label: Label);
}

#[derive(Debug, Clone)]
pub struct FormulaGraph {
    nodes: Vec<FormulaNode>,
    atoms: HashMap<AtomKey, usize>,
    unique: HashMap<(bool, Vec<NodeRef>), usize>,
    groups: IndexMap<GroupKey, Vec<NodeRef>>,
    names: IndexMap<Label, IndexMap<Term, NodeRef>>,
}

impl Default for FormulaGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![FormulaNode::True],
            atoms: HashMap::new(),
            unique: HashMap::new(),
            groups: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    /// Number of nodes, including the `TRUE` terminal.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn node(&self, index: usize) -> &FormulaNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (usize, &FormulaNode)> + '_ {
        self.nodes.iter().enumerate()
    }

    /// All atoms in creation order.
    pub fn atoms(&self) -> impl Iterator<Item = (NodeRef, &Atom)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            FormulaNode::Atom(atom) => Some((NodeRef::positive(i), atom)),
            _ => None,
        })
    }

    pub fn atom_ref(&self, key: &AtomKey) -> Option<NodeRef> {
        self.atoms.get(key).map(|&i| NodeRef::positive(i))
    }

    /// Annotated-disjunction groups with the choice atoms created so far.
    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &[NodeRef])> + '_ {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Children of a conjunction or disjunction node (empty for atoms and `TRUE`).
    pub fn children(&self, index: usize) -> &[NodeRef] {
        match &self.nodes[index] {
            FormulaNode::Conj(children) | FormulaNode::Disj(children) => children,
            FormulaNode::True | FormulaNode::Atom(_) => &[],
        }
    }

    /// All `(name, node)` bindings under `label`, in insertion order.
    pub fn names(&self, label: Label) -> Vec<(Term, NodeRef)> {
        self.names
            .get(&label)
            .map(|m| m.iter().map(|(t, &r)| (t.clone(), r)).collect())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.names.keys().copied()
    }

    /// Nodes bound to any label.
    pub fn roots(&self) -> Vec<NodeRef> {
        self.names.values().flat_map(|m| m.values().copied()).collect()
    }

    /// Global evidence as `(name, node, value)`.
    pub fn evidence(&self) -> Vec<(Term, NodeRef, bool)> {
        let mut out = Vec::new();
        for (name, node) in self.names(Label::EVIDENCE_POS) {
            out.push((name, node, true));
        }
        for (name, node) in self.names(Label::EVIDENCE_NEG) {
            out.push((name, node, false));
        }
        out
    }

    fn push(&mut self, node: FormulaNode) -> NodeRef {
        let index = self.nodes.len();
        assert!(index < i32::MAX as usize, "Formula graph is full");
        self.nodes.push(node);
        NodeRef::positive(index)
    }

    fn mk_gate(&mut self, conj: bool, children: Vec<NodeRef>) -> NodeRef {
        let key = (conj, children);
        if let Some(&index) = self.unique.get(&key) {
            return NodeRef::positive(index);
        }
        let node = if conj {
            FormulaNode::Conj(key.1.clone())
        } else {
            FormulaNode::Disj(key.1.clone())
        };
        let r = self.push(node);
        self.unique.insert(key, r.index());
        r
    }

    /// Unit propagation of `assumptions` to a fixpoint.
    ///
    /// Returns the forced value of every node index that could be derived, or `None` when the
    /// assumptions are contradictory.
    pub fn propagate(&self, assumptions: &[(NodeRef, bool)]) -> Option<HashMap<usize, bool>> {
        let mut values: HashMap<usize, bool> = HashMap::new();
        values.insert(0, true);

        fn value_of(values: &HashMap<usize, bool>, r: NodeRef) -> Option<bool> {
            values.get(&r.index()).map(|&v| v != r.is_negated())
        }

        fn assign(values: &mut HashMap<usize, bool>, r: NodeRef, value: bool) -> Result<bool, ()> {
            let value = value != r.is_negated();
            match values.get(&r.index()) {
                Some(&old) if old == value => Ok(false),
                Some(_) => Err(()),
                None => {
                    values.insert(r.index(), value);
                    Ok(true)
                }
            }
        }

        for &(r, v) in assumptions {
            if assign(&mut values, r, v).is_err() {
                debug!("propagate: assumption {} = {} is contradictory", r, v);
                return None;
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for index in 1..self.nodes.len() {
                let (conj, children) = match &self.nodes[index] {
                    FormulaNode::Conj(c) => (true, c),
                    FormulaNode::Disj(c) => (false, c),
                    _ => continue,
                };
                let me = NodeRef::positive(index);
                // A conjunction behaves as a disjunction under De Morgan with all polarities flipped,
                // so both cases share the rules below with `dominant` being the absorbing child value.
                let dominant = !conj;
                let result = (|| -> Result<bool, ()> {
                    let mut progress = false;
                    let own = value_of(&values, me);
                    if own == Some(!dominant) {
                        for &c in children {
                            progress |= assign(&mut values, c, !dominant)?;
                        }
                        return Ok(progress);
                    }
                    let child_values: Vec<Option<bool>> = children.iter().map(|&c| value_of(&values, c)).collect();
                    if child_values.iter().any(|&v| v == Some(dominant)) {
                        return assign(&mut values, me, dominant);
                    }
                    if child_values.iter().all(|&v| v == Some(!dominant)) {
                        return assign(&mut values, me, !dominant);
                    }
                    if own == Some(dominant) {
                        let open: Vec<usize> = (0..children.len()).filter(|&i| child_values[i].is_none()).collect();
                        if open.len() == 1 {
                            progress |= assign(&mut values, children[open[0]], dominant)?;
                        }
                    }
                    Ok(progress)
                })();
                match result {
                    Ok(progress) => changed |= progress,
                    Err(()) => {
                        debug!("propagate: conflict at node {}", index);
                        return None;
                    }
                }
            }

            // Choices of one annotated disjunction are mutually exclusive.
            for (group, choices) in &self.groups {
                let chosen: Vec<NodeRef> = choices.iter().copied().filter(|&c| value_of(&values, c) == Some(true)).collect();
                match chosen.len() {
                    0 => {}
                    1 => {
                        for &c in choices.iter().filter(|&&c| c != chosen[0]) {
                            match assign(&mut values, c, false) {
                                Ok(progress) => changed |= progress,
                                Err(()) => return None,
                            }
                        }
                    }
                    _ => {
                        debug!("propagate: several choices of {:?} are true", group);
                        return None;
                    }
                }
            }
        }
        Some(values)
    }
}

impl GroundTarget for FormulaGraph {
    fn add_atom(&mut self, key: AtomKey, probability: f64, name: &Term, _group: Option<&[f64]>) -> NodeRef {
        if let Some(&index) = self.atoms.get(&key) {
            return NodeRef::positive(index);
        }
        let group = key.group();
        let r = self.push(FormulaNode::Atom(Atom {
            key: key.clone(),
            probability,
            name: name.clone(),
        }));
        debug!("atom {} = {}::{}", r, probability, name);
        self.atoms.insert(key, r.index());
        if let Some(group) = group {
            self.groups.entry(group).or_default().push(r);
        }
        r
    }

    fn add_and(&mut self, a: NodeRef, b: NodeRef) -> NodeRef {
        if a.is_false() || b.is_false() || a == -b {
            return NodeRef::FALSE;
        }
        if a.is_true() || a == b {
            return b;
        }
        if b.is_true() {
            return a;
        }
        let children = if a < b { vec![a, b] } else { vec![b, a] };
        self.mk_gate(true, children)
    }

    fn add_or(&mut self, children: Vec<NodeRef>) -> NodeRef {
        let mut children: Vec<NodeRef> = children.into_iter().filter(|c| !c.is_false()).collect();
        if children.iter().any(|c| c.is_true()) {
            return NodeRef::TRUE;
        }
        children.sort();
        children.dedup();
        if children.windows(2).any(|w| w[0] == -w[1]) || children.iter().any(|&c| children.binary_search(&-c).is_ok()) {
            return NodeRef::TRUE;
        }
        match children.len() {
            0 => NodeRef::FALSE,
            1 => children[0],
            _ => self.mk_gate(false, children),
        }
    }

    fn add_name(&mut self, name: Term, node: NodeRef, label: Label) {
        debug!("name {} -> {} under {:?}", name, node, label);
        self.names.entry(label).or_default().insert(name, node);
    }
}
