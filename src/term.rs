//! First-order terms, substitutions and unification.
//!
//! Terms are plain owned trees. Atoms are compounds without arguments,
//! so `heads(c1)` is `Compound { functor: "heads", args: [Compound { functor: "c1", args: [] }] }`.
//!
//! ```
//! use plp_rs::term::{Substitution, Term};
//!
//! let pattern = Term::compound("heads", [Term::var("X")]);
//! let fact = Term::compound("heads", [Term::atom("c1")]);
//!
//! let mut subst = Substitution::new();
//! assert!(subst.unify(&pattern, &fact));
//! assert_eq!(subst.resolve(&Term::var("X")), Term::atom("c1"));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Term {
    Var(String),
    Int(i64),
    Compound { functor: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    pub fn atom(name: impl Into<String>) -> Self {
        Term::Compound {
            functor: name.into(),
            args: Vec::new(),
        }
    }

    pub fn compound(functor: impl Into<String>, args: impl IntoIterator<Item = Term>) -> Self {
        Term::Compound {
            functor: functor.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// Predicate signature `(functor, arity)`, or `None` for variables and integers.
    pub fn signature(&self) -> Option<(&str, usize)> {
        match self {
            Term::Compound { functor, args } => Some((functor.as_str(), args.len())),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Int(_) => true,
            Term::Compound { args, .. } => args.iter().all(Term::is_ground),
        }
    }

    /// Variables of the term in order of first occurrence.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_variables(&mut seen, &mut out);
        out
    }

    pub(crate) fn collect_variables(&self, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match self {
            Term::Var(name) => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            Term::Int(_) => {}
            Term::Compound { args, .. } => {
                for arg in args {
                    arg.collect_variables(seen, out);
                }
            }
        }
    }

    /// Rename every variable apart by appending `#tag`.
    pub fn rename(&self, tag: usize) -> Term {
        match self {
            Term::Var(name) => Term::Var(renamed(name, tag)),
            Term::Int(_) => self.clone(),
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| a.rename(tag)).collect(),
            },
        }
    }

    /// Variant-canonical form: variables renamed `_0`, `_1`, ... by first occurrence.
    ///
    /// Two terms are variants of each other iff their canonical forms are equal.
    pub fn canonical(&self) -> Term {
        let mut names = HashMap::new();
        self.canonical_(&mut names)
    }

    fn canonical_(&self, names: &mut HashMap<String, usize>) -> Term {
        match self {
            Term::Var(name) => {
                let next = names.len();
                let index = *names.entry(name.clone()).or_insert(next);
                Term::Var(format!("_{}", index))
            }
            Term::Int(_) => self.clone(),
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| a.canonical_(names)).collect(),
            },
        }
    }
}

pub(crate) fn renamed(name: &str, tag: usize) -> String {
    format!("{}#{}", name, tag)
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Var(name) => write!(f, "{}", name),
            Term::Int(value) => write!(f, "{}", value),
            Term::Compound { functor, args } => {
                write!(f, "{}", functor)?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

/// Triangular substitution: bindings may refer to other bound variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    bindings: HashMap<String, Term>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bind(&mut self, name: impl Into<String>, term: Term) {
        self.bindings.insert(name.into(), term);
    }

    /// Follow variable bindings until an unbound variable or a non-variable.
    pub fn walk<'a>(&'a self, term: &'a Term) -> &'a Term {
        let mut current = term;
        while let Term::Var(name) = current {
            match self.bindings.get(name) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Apply the substitution recursively.
    pub fn resolve(&self, term: &Term) -> Term {
        match self.walk(term) {
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| self.resolve(a)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Unify two terms, extending the substitution.
    ///
    /// On failure the substitution may hold partial bindings; callers unify on a clone.
    pub fn unify(&mut self, a: &Term, b: &Term) -> bool {
        let a = self.walk(a).clone();
        let b = self.walk(b).clone();
        match (&a, &b) {
            (Term::Var(x), Term::Var(y)) if x == y => true,
            (Term::Var(x), _) => {
                self.bindings.insert(x.clone(), b.clone());
                true
            }
            (_, Term::Var(y)) => {
                self.bindings.insert(y.clone(), a.clone());
                true
            }
            (Term::Int(x), Term::Int(y)) => x == y,
            (
                Term::Compound {
                    functor: f1,
                    args: args1,
                },
                Term::Compound {
                    functor: f2,
                    args: args2,
                },
            ) => {
                f1 == f2
                    && args1.len() == args2.len()
                    && args1.iter().zip(args2.iter()).all(|(x, y)| self.unify(x, y))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_display() {
        let t = Term::compound("edge", [Term::atom("a"), Term::var("X"), Term::int(3)]);
        assert_eq!(t.to_string(), "edge(a,X,3)");
        assert_eq!(Term::atom("win").to_string(), "win");
    }

    #[test]
    fn test_unify_binds_both_sides() {
        let mut s = Substitution::new();
        let a = Term::compound("p", [Term::var("X"), Term::atom("b")]);
        let b = Term::compound("p", [Term::atom("a"), Term::var("Y")]);
        assert!(s.unify(&a, &b));
        assert_eq!(s.resolve(&a), s.resolve(&b));
        assert_eq!(s.resolve(&a), Term::compound("p", [Term::atom("a"), Term::atom("b")]));
    }

    #[test]
    fn test_unify_clash() {
        let mut s = Substitution::new();
        let a = Term::compound("p", [Term::atom("a")]);
        let b = Term::compound("p", [Term::atom("b")]);
        assert!(!s.unify(&a, &b));
        let c = Term::compound("q", [Term::atom("a")]);
        assert!(!Substitution::new().unify(&a, &c));
    }

    #[test]
    fn test_unify_chain() {
        let mut s = Substitution::new();
        assert!(s.unify(&Term::var("X"), &Term::var("Y")));
        assert!(s.unify(&Term::var("Y"), &Term::int(7)));
        assert_eq!(s.resolve(&Term::var("X")), Term::int(7));
    }

    #[test]
    fn test_canonical_variants() {
        let a = Term::compound("p", [Term::var("A"), Term::var("B"), Term::var("A")]);
        let b = Term::compound("p", [Term::var("X"), Term::var("Y"), Term::var("X")]);
        let c = Term::compound("p", [Term::var("X"), Term::var("X"), Term::var("X")]);
        assert_eq!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), c.canonical());
    }

    #[test]
    fn test_variables_and_rename() {
        let t = Term::compound("p", [Term::var("X"), Term::compound("f", [Term::var("Y"), Term::var("X")])]);
        assert_eq!(t.variables(), vec!["X".to_string(), "Y".to_string()]);
        assert!(!t.is_ground());
        let r = t.rename(3);
        assert_eq!(r.variables(), vec!["X#3".to_string(), "Y#3".to_string()]);
    }
}
