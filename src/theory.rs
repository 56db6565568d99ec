//! Named, retractable theories inside one shared clause database.
//!
//! A theory is the contiguous index range of the nodes its statements appended.
//! Removing a theory erases exactly those indices from the predicate definitions they implement,
//! so the rest of the database is left untouched and nothing has to be rebuilt.
//!
//! ```
//! use plp_rs::program::Statement;
//! use plp_rs::term::Term;
//! use plp_rs::theory::TheoryStore;
//!
//! let mut store = TheoryStore::new();
//! store.add("coins", [Statement::prob_fact(0.4, Term::atom("heads"))]).unwrap();
//! assert!(store.exists("coins"));
//! store.remove("coins").unwrap();
//! assert!(!store.exists("coins"));
//! ```

use indexmap::IndexMap;
use log::{debug, warn};

use crate::database::{validate, ClauseDb, Database, Node};
use crate::error::{Error, Result};
use crate::program::Statement;

/// Half-open interval `[start, end)` of database indices contributed by one theory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StatementRange {
    pub start: usize,
    pub end: usize,
}

impl StatementRange {
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &StatementRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Default)]
pub struct TheoryStore {
    db: ClauseDb,
    ranges: IndexMap<String, StatementRange>,
}

impl TheoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing database; its current contents belong to no theory.
    pub fn with_database(db: ClauseDb) -> Self {
        Self {
            db,
            ranges: IndexMap::new(),
        }
    }

    pub fn database(&self) -> &ClauseDb {
        &self.db
    }

    pub fn exists(&self, key: &str) -> bool {
        self.ranges.contains_key(key)
    }

    pub fn range(&self, key: &str) -> Option<StatementRange> {
        self.ranges.get(key).copied()
    }

    /// Live theory keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.ranges.keys().map(String::as_str)
    }

    /// Append all `statements` to the database under `key`.
    ///
    /// Statements are validated before anything is appended, so a rejected batch leaves the
    /// database unchanged.
    pub fn add(&mut self, key: &str, statements: impl IntoIterator<Item = Statement>) -> Result<StatementRange> {
        if self.exists(key) {
            warn!("Trying to add to a theory that already exists: {}", key);
            return Err(Error::TheoryExists(key.to_string()));
        }

        let statements: Vec<Statement> = statements.into_iter().collect();
        for stmt in &statements {
            validate(stmt)?;
        }

        let start = self.db.len();
        for stmt in statements {
            self.db.add_statement(stmt)?;
        }
        let range = StatementRange {
            start,
            end: self.db.len(),
        };
        debug!("theory {} added at {:?}", key, range);
        self.ranges.insert(key.to_string(), range);
        Ok(range)
    }

    /// Retract the theory `key`, returning the range it occupied.
    pub fn remove(&mut self, key: &str) -> Result<StatementRange> {
        let Some(range) = self.ranges.get(key).copied() else {
            warn!("Trying to remove a theory that doesn't exist: {}", key);
            return Err(Error::TheoryNotFound(key.to_string()));
        };

        let mut erased = 0;
        for index in range.start..range.end {
            // Only facts and clauses (including annotated-disjunction heads) implement a predicate.
            let define = match self.db.node(index) {
                node @ (Node::Fact(_) | Node::Clause(_)) => node.head().and_then(|h| self.db.find_head(h)),
                Node::Define(_) | Node::Choice(_) => None,
            };
            if let Some(define) = define {
                erased += self.db.erase_children(define, [index]);
            }
        }
        debug!("theory {} removed from {:?}, erased {} children", key, range, erased);

        self.ranges.shift_remove(key);
        Ok(range)
    }

    /// Retract `key` if present, then add `statements` under it.
    pub fn replace(&mut self, key: &str, statements: impl IntoIterator<Item = Statement>) -> Result<StatementRange> {
        if self.exists(key) {
            self.remove(key)?;
        }
        self.add(key, statements)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::program::Goal;
    use crate::term::Term;

    fn coin_theory(coin: &str) -> Vec<Statement> {
        vec![Statement::disjunction(
            [
                (0.4, Term::compound("heads", [Term::atom(coin)])),
                (0.6, Term::compound("tails", [Term::atom(coin)])),
            ],
            Goal::True,
        )]
    }

    #[test]
    fn test_add_twice_fails() {
        let mut store = TheoryStore::new();
        store.add("t1", coin_theory("c1")).unwrap();
        assert_eq!(
            store.add("t1", coin_theory("c2")),
            Err(Error::TheoryExists("t1".to_string()))
        );
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut store = TheoryStore::new();
        assert_eq!(store.remove("t1"), Err(Error::TheoryNotFound("t1".to_string())));
    }

    #[test]
    fn test_remove_erases_children() {
        let mut store = TheoryStore::new();
        store.add("t1", coin_theory("c1")).unwrap();
        let r2 = store.add("t2", coin_theory("c2")).unwrap();
        assert_eq!(store.database().clauses("heads", 1).unwrap().len(), 2);

        let r1 = store.remove("t1").unwrap();
        let remaining = store.database().clauses("heads", 1).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().all(|&i| !r1.contains(i)));
        assert!(remaining.iter().all(|&i| r2.contains(i)));
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["t2"]);
    }

    #[test]
    fn test_readd_after_remove() {
        let mut store = TheoryStore::new();
        let first = store.add("t1", coin_theory("c1")).unwrap();
        store.remove("t1").unwrap();
        let second = store.add("t1", coin_theory("c9")).unwrap();
        assert!(!first.overlaps(&second));
        assert!(second.start >= first.end);
        assert!(store.exists("t1"));
    }

    #[test]
    fn test_invalid_batch_leaves_db_unchanged() {
        let mut store = TheoryStore::new();
        let before = store.database().len();
        let bad = vec![
            Statement::prob_fact(0.5, Term::atom("a")),
            Statement::prob_fact(2.0, Term::atom("b")),
        ];
        assert!(store.add("bad", bad).is_err());
        assert_eq!(store.database().len(), before);
        assert!(!store.exists("bad"));

        let bad = vec![
            Statement::fact(Term::atom("a")),
            Statement::disjunction([(0.6, Term::atom("b")), (0.6, Term::atom("c"))], Goal::True),
        ];
        assert!(matches!(store.add("bad", bad), Err(Error::InvalidProbability { .. })));
        assert_eq!(store.database().len(), before);
    }

    #[test]
    fn test_replace() {
        let mut store = TheoryStore::new();
        store.add("cell", coin_theory("c1")).unwrap();
        store.replace("cell", coin_theory("c2")).unwrap();
        let heads = store.database().clauses("heads", 1).unwrap();
        assert_eq!(heads.len(), 1);
        match store.database().node(heads[0]) {
            Node::Clause(c) => assert_eq!(c.head, Term::compound("heads", [Term::atom("c2")])),
            other => panic!("expected clause, got {:?}", other),
        }
    }
}
