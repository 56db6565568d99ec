use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Signed handle to a node of a [`FormulaGraph`][crate::formula::FormulaGraph].
///
/// The magnitude is `index + 1` and the sign encodes negation, so `-r` is the negation of `r`.
/// Index 0 is the `TRUE` terminal, hence `FALSE == -TRUE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeRef(i32);

impl NodeRef {
    pub const TRUE: NodeRef = NodeRef(1);
    pub const FALSE: NodeRef = NodeRef(-1);

    pub const fn positive(index: usize) -> Self {
        Self(index as i32 + 1)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    /// Index of the referenced node, ignoring negation.
    pub const fn index(self) -> usize {
        (self.0.unsigned_abs() - 1) as usize
    }

    pub const fn is_true(self) -> bool {
        self.0 == Self::TRUE.0
    }

    pub const fn is_false(self) -> bool {
        self.0 == Self::FALSE.0
    }

    pub const fn is_constant(self) -> bool {
        self.is_true() || self.is_false()
    }

    pub const fn constant(value: bool) -> Self {
        if value {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }
}

impl Neg for NodeRef {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_true() {
            write!(f, "TRUE")
        } else if self.is_false() {
            write!(f, "FALSE")
        } else {
            write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(-NodeRef::TRUE, NodeRef::FALSE);
        assert_eq!(NodeRef::TRUE.index(), 0);
        assert_eq!(NodeRef::FALSE.index(), 0);
        assert!(NodeRef::constant(true).is_true());
        assert!(NodeRef::constant(false).is_false());
    }

    #[test]
    fn test_negation() {
        let r = NodeRef::positive(5);
        assert_eq!(r.index(), 5);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!((-r).index(), 5);
        assert_eq!(-(-r), r);
        assert_eq!(format!("{}", -r), "~@5");
    }
}
