//! Reduced ordered BDDs with complement edges.
//!
//! Variables are numbered from 1; a smaller number is closer to the root.
//! Node 1 is the `one` terminal and `zero` is its complement.
//! The high edge of a stored node is never complemented, which keeps the representation canonical.

use std::cell::RefCell;
use std::cmp::min;
use std::collections::{BTreeSet, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::ops::Neg;

use log::debug;

use crate::cache::Cache;
use crate::table::{pairing3, FastHash, Table};

/// Signed handle to a BDD node. A negative value is a complemented edge.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    const fn unsigned(self) -> u32 {
        self.0 as u32
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref(0),
            high: Ref(0),
        }
    }
}

impl FastHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.variable as u64, self.low.unsigned() as u64, self.high.unsigned() as u64)
    }
}

type Ite = (Ref, Ref, Ref);

impl FastHash for Ite {
    fn hash(&self) -> u64 {
        pairing3(self.0.unsigned() as u64, self.1.unsigned() as u64, self.2.unsigned() as u64)
    }
}

pub struct Bdd {
    storage: RefCell<Table<Node>>,
    cache: RefCell<Cache<Ite, Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let mut storage = Table::new(min(bits, 20));
        let one = storage.add(Node::default());
        assert_eq!(one, 1, "Terminal node must be at index 1");
        let one = Ref::positive(one as u32);

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(bits)),
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("Bdd")
            .field("size", &self.size())
            .field("cache_hits", &cache.hits())
            .field("cache_misses", &cache.misses())
            .finish()
    }
}

impl Bdd {
    /// Number of stored nodes, including the terminal.
    pub fn size(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index as usize).variable
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.storage.borrow().value(node.index() as usize).low;
        if node.is_negated() {
            -low
        } else {
            low
        }
    }

    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.storage.borrow().value(node.index() as usize).high;
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }

    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }

    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node { variable: v, low, high });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        (self.low_node(node), self.high_node(node))
    }

    /// `ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)`.
    ///
    /// ```
    /// use plp_rs::bdd::Bdd;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.mk_var(1);
    /// let y = bdd.mk_var(2);
    /// let z = bdd.mk_var(3);
    /// let f = bdd.apply_ite(x, y, z);
    /// assert_eq!(f, bdd.apply_or(bdd.apply_and(x, y), bdd.apply_and(-x, z)));
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        // Make f and g regular: ite(~F,G,H) => ite(F,H,G), ite(F,~G,H) => ~ite(F,G,~H).
        let (mut f, mut g, mut h) = (f, g, h);
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = (f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return if n { -res } else { res };
        }

        let mut m = self.variable(f.index());
        for x in [g, h] {
            if !self.is_terminal(x) {
                m = m.min(self.variable(x.index()));
            }
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);
        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);
        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    /// Constraint that exactly one of `nodes` is true.
    pub fn exactly_one(&self, nodes: &[Ref]) -> Ref {
        debug!("exactly_one({} nodes)", nodes.len());
        // Fold from the back: `one` holds for exactly one of the suffix, `none` for none of it.
        let mut one = self.zero;
        let mut none = self.one;
        for &x in nodes.iter().rev() {
            one = self.apply_ite(x, none, one);
            none = self.apply_and(-x, none);
        }
        one
    }

    /// Variables `f` depends on.
    pub fn support(&self, f: Ref) -> BTreeSet<u32> {
        let mut visited = HashSet::new();
        let mut result = BTreeSet::new();
        let mut stack = vec![f];
        while let Some(node) = stack.pop() {
            if self.is_terminal(node) || !visited.insert(node.index()) {
                continue;
            }
            result.insert(self.variable(node.index()));
            stack.push(self.low_node(node));
            stack.push(self.high_node(node));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_terminals() {
        let bdd = Bdd::default();
        assert_eq!(bdd.zero, -bdd.one);
        assert!(bdd.is_terminal(bdd.zero));
        assert_eq!(bdd.apply_and(bdd.one, bdd.zero), bdd.zero);
        assert_eq!(bdd.apply_or(bdd.one, bdd.zero), bdd.one);
    }

    #[test]
    fn test_canonicity() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_and(x, y);
        let g = bdd.apply_and(y, x);
        assert_eq!(f, g);
        // De Morgan
        assert_eq!(-bdd.apply_or(-x, -y), f);
        assert_eq!(bdd.apply_and(x, -x), bdd.zero);
        assert_eq!(bdd.apply_or(x, -x), bdd.one);
    }

    #[test]
    fn test_exactly_one() {
        let bdd = Bdd::default();
        let vars: Vec<Ref> = (1..=3).map(|v| bdd.mk_var(v)).collect();
        let c = bdd.exactly_one(&vars);
        // x1 ∧ x2 violates the constraint
        assert_eq!(bdd.apply_and_many([c, vars[0], vars[1]]), bdd.zero);
        // ¬x1 ∧ ¬x2 forces x3
        let rest = bdd.apply_and_many([c, -vars[0], -vars[1]]);
        assert_eq!(rest, bdd.apply_and_many([-vars[0], -vars[1], vars[2]]));
        assert_eq!(bdd.exactly_one(&[]), bdd.zero);
    }

    #[test]
    fn test_support() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_or(bdd.apply_and(x, y), z);
        assert_eq!(bdd.support(f), BTreeSet::from([1, 2, 3]));
        assert_eq!(bdd.support(bdd.apply_or(f, bdd.one)), BTreeSet::new());
        assert_eq!(bdd.support(-y), BTreeSet::from([2]));
    }
}
