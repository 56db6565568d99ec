//! Formula graph shared by the queries of one session, with lazily compiled circuits.
//!
//! Every grounding batch takes a fresh [`VersionStamp`] before it writes to the graph.
//! A circuit compiled at version `v` is reused for any request at or below `v`; a request above it
//! rebuilds that kind from the whole graph. Kinds are cached independently.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::circuit::{Circuit, TargetKind};
use crate::error::{Error, Result};
use crate::formula::FormulaGraph;

pub type VersionStamp = u64;

#[derive(Debug, Default)]
pub struct FormulaCache {
    graph: FormulaGraph,
    version: VersionStamp,
    circuits: HashMap<TargetKind, (VersionStamp, Rc<Circuit>)>,
    compilations: usize,
    locked: bool,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &FormulaGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut FormulaGraph {
        &mut self.graph
    }

    /// Current version of the graph.
    pub fn version(&self) -> VersionStamp {
        self.version
    }

    /// Announce a grounding batch; must be called before the batch writes to the graph.
    pub fn next_version(&mut self) -> Result<VersionStamp> {
        if self.locked {
            return Err(Error::CacheLocked);
        }
        self.version += 1;
        debug!("formula cache at version {}", self.version);
        Ok(self.version)
    }

    /// Circuit of `kind` for the current version.
    pub fn compile(&mut self, kind: TargetKind) -> Rc<Circuit> {
        self.compile_at(kind, self.version)
    }

    /// Circuit of `kind` compiled at version `at` or later.
    pub fn compile_at(&mut self, kind: TargetKind, at: VersionStamp) -> Rc<Circuit> {
        if let Some((version, circuit)) = self.circuits.get(&kind) {
            if *version >= at {
                return Rc::clone(circuit);
            }
        }
        debug!("compiling {} at version {} (requested {})", kind, self.version, at);
        let circuit = Rc::new(Circuit::compile(&self.graph, kind));
        self.compilations += 1;
        self.circuits.insert(kind, (self.version, Rc::clone(&circuit)));
        circuit
    }

    /// Number of compilations performed so far.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    /// Refuse further grounding batches.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_compile_is_cached() {
        let mut cache = FormulaCache::new();
        let a = cache.compile(TargetKind::Bdd);
        let b = cache.compile(TargetKind::Bdd);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.compilations(), 1);
    }

    #[test]
    fn test_next_version_invalidates() {
        let mut cache = FormulaCache::new();
        let a = cache.compile(TargetKind::Bdd);
        cache.next_version().unwrap();
        let b = cache.compile(TargetKind::Bdd);
        assert!(!Rc::ptr_eq(&a, &b));
        let c = cache.compile(TargetKind::Bdd);
        assert!(Rc::ptr_eq(&b, &c));
        assert_eq!(cache.compilations(), 2);
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut cache = FormulaCache::new();
        let a = cache.compile(TargetKind::Bdd);
        let d = cache.compile(TargetKind::BddDfs);
        assert_eq!(cache.compilations(), 2);
        assert!(Rc::ptr_eq(&a, &cache.compile(TargetKind::Bdd)));
        assert!(Rc::ptr_eq(&d, &cache.compile(TargetKind::BddDfs)));
    }

    #[test]
    fn test_compile_at_older_version_reuses() {
        let mut cache = FormulaCache::new();
        let v1 = cache.next_version().unwrap();
        let a = cache.compile(TargetKind::Bdd);
        cache.next_version().unwrap();
        assert!(Rc::ptr_eq(&a, &cache.compile_at(TargetKind::Bdd, v1)));
        assert_eq!(cache.compilations(), 1);
    }

    #[test]
    fn test_lock() {
        let mut cache = FormulaCache::new();
        cache.lock();
        assert!(cache.is_locked());
        assert_eq!(cache.next_version(), Err(Error::CacheLocked));
    }
}
