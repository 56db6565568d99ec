//! Commutative semirings for algebraic model counting.
//!
//! A semiring (S, ⊕, ⊗, 0, 1) decides what a weighted model count means:
//! summing probabilities gives the success probability, taking the maximum gives the weight of
//! the most probable explanation, taking the minimum gives the least probable one.

use std::fmt::Debug;

pub trait Semiring: Debug {
    /// Additive identity: x ⊕ 0 = 0 ⊕ x = x
    fn zero(&self) -> f64;

    /// Multiplicative identity: x ⊗ 1 = 1 ⊗ x = x
    fn one(&self) -> f64;

    /// Semiring addition (⊕)
    fn plus(&self, a: f64, b: f64) -> f64;

    /// Semiring multiplication (⊗)
    fn times(&self, a: f64, b: f64) -> f64;

    /// Weight of a literal that holds with `probability`.
    fn value(&self, probability: f64) -> f64 {
        probability
    }

    fn is_zero(&self, a: f64) -> bool {
        a == self.zero()
    }

    /// Condition `a` on a normalisation constant `z`.
    fn normalize(&self, a: f64, _z: f64) -> f64 {
        a
    }
}

/// Sum-product: success probabilities.
#[derive(Debug, Copy, Clone, Default)]
pub struct Probability;

impl Semiring for Probability {
    fn zero(&self) -> f64 {
        0.0
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        a + b
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        a * b
    }

    fn normalize(&self, a: f64, z: f64) -> f64 {
        a / z
    }
}

/// Max-product: weight of the most probable explanation (MPE).
#[derive(Debug, Copy, Clone, Default)]
pub struct MaxProduct;

impl Semiring for MaxProduct {
    fn zero(&self) -> f64 {
        0.0
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        a.max(b)
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        a * b
    }
}

/// Min-product: weight of the least probable explanation (MinPE).
///
/// Zero is `+∞`, and a literal of probability 0 is impossible rather than merely unlikely.
#[derive(Debug, Copy, Clone, Default)]
pub struct MinProduct;

impl Semiring for MinProduct {
    fn zero(&self) -> f64 {
        f64::INFINITY
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        a.min(b)
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        if a == f64::INFINITY || b == f64::INFINITY {
            f64::INFINITY
        } else {
            a * b
        }
    }

    fn value(&self, probability: f64) -> f64 {
        if probability == 0.0 {
            f64::INFINITY
        } else {
            probability
        }
    }
}

/// Closed choice of semiring, as selected by a query type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SemiringKind {
    Probability,
    MaxProduct,
    MinProduct,
}

impl Semiring for SemiringKind {
    fn zero(&self) -> f64 {
        match self {
            SemiringKind::Probability => Probability.zero(),
            SemiringKind::MaxProduct => MaxProduct.zero(),
            SemiringKind::MinProduct => MinProduct.zero(),
        }
    }

    fn one(&self) -> f64 {
        match self {
            SemiringKind::Probability => Probability.one(),
            SemiringKind::MaxProduct => MaxProduct.one(),
            SemiringKind::MinProduct => MinProduct.one(),
        }
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        match self {
            SemiringKind::Probability => Probability.plus(a, b),
            SemiringKind::MaxProduct => MaxProduct.plus(a, b),
            SemiringKind::MinProduct => MinProduct.plus(a, b),
        }
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        match self {
            SemiringKind::Probability => Probability.times(a, b),
            SemiringKind::MaxProduct => MaxProduct.times(a, b),
            SemiringKind::MinProduct => MinProduct.times(a, b),
        }
    }

    fn value(&self, probability: f64) -> f64 {
        match self {
            SemiringKind::Probability => Probability.value(probability),
            SemiringKind::MaxProduct => MaxProduct.value(probability),
            SemiringKind::MinProduct => MinProduct.value(probability),
        }
    }

    fn normalize(&self, a: f64, z: f64) -> f64 {
        match self {
            SemiringKind::Probability => Probability.normalize(a, z),
            SemiringKind::MaxProduct => MaxProduct.normalize(a, z),
            SemiringKind::MinProduct => MinProduct.normalize(a, z),
        }
    }
}
