//! Tensor bonds: directed indices carrying charge states.
//!
//! A bond is an ordered list of `(charge, degeneracy)` states plus a
//! direction. The dense dimension of the bond is the sum of degeneracies;
//! the charge content of the states determines how a tensor index splits
//! into conserved blocks.

use std::fmt;
use std::ops::Neg;

use crate::qnum::Qnum;

/// Direction of a bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondKind {
    /// Incoming: the stored charges flow into the tensor.
    In,
    /// Outgoing: the stored charges flow out of the tensor.
    Out,
}

impl BondKind {
    pub fn flipped(self) -> BondKind {
        match self {
            BondKind::In => BondKind::Out,
            BondKind::Out => BondKind::In,
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            BondKind::In => 0,
            BondKind::Out => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<BondKind> {
        match b {
            0 => Some(BondKind::In),
            1 => Some(BondKind::Out),
            _ => None,
        }
    }
}

/// One charge sector of a bond: a charge and its degeneracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondState {
    pub q: Qnum,
    pub deg: usize,
}

impl BondState {
    pub fn new(q: Qnum, deg: usize) -> Self {
        Self { q, deg }
    }
}

/// A directed tensor index with charge states.
///
/// Constructors keep the caller's state order; the dense layout of a tensor
/// depends on it. Only [`Bond::combine`] canonicalises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    kind: BondKind,
    states: Vec<BondState>,
}

impl Bond {
    pub fn new(kind: BondKind, states: Vec<BondState>) -> Self {
        Self { kind, states }
    }

    /// Convenience constructor from `(charge, degeneracy)` pairs.
    pub fn from_pairs(kind: BondKind, pairs: &[(Qnum, usize)]) -> Self {
        Self::new(
            kind,
            pairs.iter().map(|&(q, deg)| BondState::new(q, deg)).collect(),
        )
    }

    /// A bond with a single trivial-charge state of the given dimension.
    pub fn trivial(kind: BondKind, dim: usize) -> Self {
        Self::new(kind, vec![BondState::new(Qnum::zero(), dim)])
    }

    pub fn kind(&self) -> BondKind {
        self.kind
    }

    pub fn states(&self) -> &[BondState] {
        &self.states
    }

    /// Total dense dimension.
    pub fn dim(&self) -> usize {
        self.states.iter().map(|s| s.deg).sum()
    }

    /// Reverse the direction, negating every charge.
    pub fn reversed(&self) -> Bond {
        Bond {
            kind: self.kind.flipped(),
            states: self
                .states
                .iter()
                .map(|s| BondState::new(s.q.neg(), s.deg))
                .collect(),
        }
    }

    /// Group equal charges (summing degeneracies) and sort ascending.
    pub fn canonicalize(&mut self) {
        let mut merged: std::collections::BTreeMap<Qnum, usize> = std::collections::BTreeMap::new();
        for s in &self.states {
            *merged.entry(s.q).or_insert(0) += s.deg;
        }
        self.states = merged
            .into_iter()
            .map(|(q, deg)| BondState::new(q, deg))
            .collect();
    }

    /// Direct product with another bond: charges added pairwise, degeneracies
    /// multiplied, result canonicalised. The direction of `self` wins.
    pub fn combine(&self, other: &Bond) -> Bond {
        let mut states = Vec::with_capacity(self.states.len() * other.states.len());
        for a in &self.states {
            for b in &other.states {
                states.push(BondState::new(a.q + b.q, a.deg * b.deg));
            }
        }
        let mut bond = Bond {
            kind: self.kind,
            states,
        };
        bond.canonicalize();
        bond
    }

    /// True iff `self` and `other` can be contracted against each other:
    /// opposite directions and pairwise equal state sequences.
    pub fn contractible(&self, other: &Bond) -> bool {
        self.kind != other.kind && self.states == other.states
    }
}

impl fmt::Display for Bond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BondKind::In => write!(f, "IN : ")?,
            BondKind::Out => write!(f, "OUT: ")?,
        }
        for s in &self.states {
            write!(f, "{}|{}, ", s.q, s.deg)?;
        }
        write!(f, "Dim = {}", self.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_and_reverse() {
        let b = Bond::from_pairs(
            BondKind::In,
            &[(Qnum::u1(1), 2), (Qnum::u1(0), 1), (Qnum::u1(-1), 2)],
        );
        assert_eq!(b.dim(), 5);

        let r = b.reversed();
        assert_eq!(r.kind(), BondKind::Out);
        assert_eq!(r.states()[0].q, Qnum::u1(-1));
        assert_eq!(r.states()[2].q, Qnum::u1(1));
        assert_eq!(r.reversed(), b);
    }

    #[test]
    fn test_combine_canonicalises() {
        let a = Bond::from_pairs(BondKind::In, &[(Qnum::u1(1), 1), (Qnum::u1(-1), 1)]);
        let b = Bond::from_pairs(BondKind::In, &[(Qnum::u1(1), 2), (Qnum::u1(-1), 2)]);
        let c = a.combine(&b);

        // Charges 2, 0, 0, -2 -> merged and sorted ascending.
        assert_eq!(c.dim(), a.dim() * b.dim());
        let pairs: Vec<(Qnum, usize)> = c.states().iter().map(|s| (s.q, s.deg)).collect();
        assert_eq!(
            pairs,
            vec![(Qnum::u1(-2), 2), (Qnum::u1(0), 4), (Qnum::u1(2), 2)]
        );
    }

    #[test]
    fn test_contractible() {
        let a = Bond::from_pairs(BondKind::Out, &[(Qnum::u1(1), 2), (Qnum::u1(0), 3)]);
        let b = Bond::from_pairs(BondKind::In, &[(Qnum::u1(1), 2), (Qnum::u1(0), 3)]);
        assert!(a.contractible(&b));
        assert!(!a.contractible(&a));
        let c = Bond::from_pairs(BondKind::In, &[(Qnum::u1(1), 2), (Qnum::u1(0), 4)]);
        assert!(!a.contractible(&c));
    }
}
