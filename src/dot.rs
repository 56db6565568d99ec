//! Formula graph to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **Atoms** are rendered as ellipses labelled with their ground name and probability
//! - **Conjunctions** and **disjunctions** are rendered as boxes labelled `AND` / `OR`
//! - **Edges** point from a node to its children; negated edges are dotted with a hollow circle
//! - **Named nodes** (queries and evidence) are rendered as rectangles at the top (source rank)
//!
//! # Examples
//!
//! ```
//! use plp_rs::formula::{AtomKey, FormulaGraph, GroundTarget, Label};
//! use plp_rs::term::Term;
//!
//! let mut graph = FormulaGraph::new();
//! let a = graph.add_atom(AtomKey::fact(0, vec![]), 0.3, &Term::atom("a"), None);
//! let b = graph.add_atom(AtomKey::fact(1, vec![]), 0.6, &Term::atom("b"), None);
//! let q = graph.add_or(vec![a, -b]);
//! graph.add_name(Term::atom("q"), q, Label::QUERY);
//!
//! let dot = graph.to_dot().unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! ```

use std::fmt::Write as _;

use crate::formula::{FormulaGraph, FormulaNode, LabelKind};
use crate::reference::NodeRef;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for atoms (default: "ellipse")
    pub atom_shape: &'static str,
    /// Shape for conjunctions and disjunctions (default: "box")
    pub gate_shape: &'static str,
    /// Shape for the `TRUE` terminal (default: "square")
    pub terminal_shape: &'static str,
    /// Shape for named roots (default: "rect")
    pub root_shape: &'static str,
    /// Style for negated edges (default: "dotted")
    pub negated_edge_style: &'static str,
    /// Whether names bound under query-scoped labels are drawn too (default: false)
    pub include_scoped: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            atom_shape: "ellipse",
            gate_shape: "box",
            terminal_shape: "square",
            root_shape: "rect",
            negated_edge_style: "dotted",
            include_scoped: false,
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn edge(dot: &mut String, from: &str, to: NodeRef, config: &DotConfig) -> std::fmt::Result {
    if to.is_negated() {
        writeln!(
            dot,
            "{} -> n{} [style={}, arrowhead=odot];",
            from,
            to.index(),
            config.negated_edge_style
        )
    } else {
        writeln!(dot, "{} -> n{};", from, to.index())
    }
}

impl FormulaGraph {
    /// Converts the graph to DOT format with the default configuration.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Converts the graph to DOT format.
    ///
    /// Only nodes reachable from a named root are drawn.
    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut roots = Vec::new();
        for label in self.labels() {
            if label.scope.is_some() && !config.include_scoped {
                continue;
            }
            let kind = match label.kind {
                LabelKind::Query => "query",
                LabelKind::EvidencePos => "evidence",
                LabelKind::EvidenceNeg => "negative evidence",
            };
            for (name, node) in self.names(label) {
                roots.push((format!("{}: {}", kind, name), node));
            }
        }

        // Children have smaller indices, so one backward sweep marks everything reachable.
        let mut reachable = vec![false; self.len()];
        for (_, node) in &roots {
            reachable[node.index()] = true;
        }
        for index in (0..self.len()).rev() {
            if reachable[index] {
                for child in self.children(index) {
                    reachable[child.index()] = true;
                }
            }
        }

        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;

        for (index, node) in self.nodes() {
            if !reachable[index] {
                continue;
            }
            match node {
                FormulaNode::True => {
                    writeln!(dot, "{{ rank=sink")?;
                    writeln!(dot, "n0 [shape={}, label=\"1\"];", config.terminal_shape)?;
                    writeln!(dot, "}}")?;
                }
                FormulaNode::Atom(atom) => {
                    writeln!(
                        dot,
                        "n{} [shape={}, label=\"{}::{}\"];",
                        index,
                        config.atom_shape,
                        atom.probability,
                        escape(&atom.name.to_string())
                    )?;
                }
                FormulaNode::Conj(_) => {
                    writeln!(dot, "n{} [shape={}, label=\"AND\"];", index, config.gate_shape)?;
                }
                FormulaNode::Disj(_) => {
                    writeln!(dot, "n{} [shape={}, label=\"OR\"];", index, config.gate_shape)?;
                }
            }
        }

        for index in 0..self.len() {
            if !reachable[index] {
                continue;
            }
            for &child in self.children(index) {
                edge(&mut dot, &format!("n{}", index), child, config)?;
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, (name, _)) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, escape(name))?;
        }
        writeln!(dot, "}}")?;
        for (i, &(_, node)) in roots.iter().enumerate() {
            edge(&mut dot, &format!("r{}", i), node, config)?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
