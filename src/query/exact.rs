use std::collections::BTreeMap;

use log::debug;

use super::ExactResult;
use crate::circuit::TargetKind;
use crate::database::Database;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::formula::{Label, LabelKind};
use crate::formula_cache::{FormulaCache, VersionStamp};
use crate::semiring::SemiringKind;
use crate::term::Term;

/// Exact inference by algebraic model counting on a compiled circuit.
///
/// Grounding writes the query under labels scoped to this instance, so several queries can share
/// one formula graph and still find their own nodes after compilation.
#[derive(Debug, Clone)]
pub struct ExactQuery {
    queries: Vec<Term>,
    evidence: Vec<(Term, bool)>,
    semiring: SemiringKind,
    target: TargetKind,
    /// Version stamp taken at grounding, also used as the label scope.
    scope: Option<VersionStamp>,
}

impl ExactQuery {
    pub fn new(queries: Vec<Term>, evidence: Vec<(Term, bool)>, semiring: SemiringKind, target: TargetKind) -> Self {
        Self {
            queries,
            evidence,
            semiring,
            target,
            scope: None,
        }
    }

    pub fn queries(&self) -> &[Term] {
        &self.queries
    }

    pub fn semiring(&self) -> SemiringKind {
        self.semiring
    }

    pub fn is_grounded(&self) -> bool {
        self.scope.is_some()
    }

    pub fn ground<D: Database + ?Sized>(&mut self, engine: &Engine, db: &D, cache: &mut FormulaCache) -> Result<()> {
        if self.scope.is_some() {
            return Err(Error::AlreadyGrounded);
        }
        let version = cache.next_version()?;
        let graph = cache.graph_mut();

        // Once for our own lookup, once for anyone else sharing the graph.
        engine.ground_evidence(db, graph, &self.evidence, Some(version))?;
        engine.ground_evidence(db, graph, &self.evidence, None)?;

        let label = Label::scoped(LabelKind::Query, version);
        for query in &self.queries {
            engine.ground(db, graph, query, label)?;
        }
        debug!("exact query grounded at version {}", version);
        self.scope = Some(version);
        Ok(())
    }

    pub fn evaluate(&self, cache: &mut FormulaCache) -> Result<ExactResult> {
        let Some(scope) = self.scope else {
            return Err(Error::NotGrounded);
        };
        let circuit = cache.compile_at(self.target, scope);

        let mut evidence = Vec::new();
        let mut assignment = BTreeMap::new();
        for value in [true, false] {
            for (name, node) in circuit.names(Label::scoped(LabelKind::evidence(value), scope)) {
                evidence.push((node, value));
                assignment.insert(name, value);
            }
        }

        let weights = circuit
            .names(Label::scoped(LabelKind::Query, scope))
            .into_iter()
            .map(|(name, node)| {
                let evaluation = circuit.evaluate(node, &evidence, &self.semiring);
                debug!("{} -> {:?}", name, evaluation);
                (name, evaluation)
            })
            .collect();

        Ok(ExactResult {
            weights,
            evidence: assignment,
        })
    }
}
