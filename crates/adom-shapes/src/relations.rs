//! Relations between a shape and a single constraint or generator.
//!
//! A [`ConstraintRelation`] is a conjunction of the four elementary
//! assertions (disjoint, strictly intersects, included, saturates); a
//! [`GeneratorRelation`] either subsumes or says nothing. The relation is
//! derived from the exact extrema of the constraint expression over the
//! (closed) shape, which gives the same answers as a cellwise case
//! analysis on weakly-relational shapes.

use num_rational::BigRational;
use num_traits::Signed;
use num_traits::Zero;

use adom_core::ConstraintKind;

/// The relation symbol of a generalized affine transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelSym {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

impl RelSym {
    /// The symbol obtained by multiplying both sides by a negative factor.
    pub fn mirrored(self) -> RelSym {
        match self {
            RelSym::LessOrEqual => RelSym::GreaterOrEqual,
            RelSym::Equal => RelSym::Equal,
            RelSym::GreaterOrEqual => RelSym::LessOrEqual,
        }
    }
}

const IS_DISJOINT: u8 = 1;
const STRICTLY_INTERSECTS: u8 = 1 << 1;
const IS_INCLUDED: u8 = 1 << 2;
const SATURATES: u8 = 1 << 3;

/// Conjunction of assertions relating a shape to a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintRelation {
    bits: u8,
}

impl ConstraintRelation {
    pub fn nothing() -> Self {
        ConstraintRelation { bits: 0 }
    }

    pub fn is_disjoint() -> Self {
        ConstraintRelation { bits: IS_DISJOINT }
    }

    pub fn strictly_intersects() -> Self {
        ConstraintRelation { bits: STRICTLY_INTERSECTS }
    }

    pub fn is_included() -> Self {
        ConstraintRelation { bits: IS_INCLUDED }
    }

    pub fn saturates() -> Self {
        ConstraintRelation { bits: SATURATES }
    }

    pub fn and(self, other: Self) -> Self {
        ConstraintRelation { bits: self.bits | other.bits }
    }

    /// True when every assertion of `other` also holds here.
    pub fn implies(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

/// Relation between a shape and a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorRelation {
    subsumes: bool,
}

impl GeneratorRelation {
    pub fn nothing() -> Self {
        GeneratorRelation { subsumes: false }
    }

    pub fn subsumes() -> Self {
        GeneratorRelation { subsumes: true }
    }

    pub fn implies(self, other: Self) -> bool {
        self.subsumes || !other.subsumes
    }
}

/// An extremum of a linear expression over a shape: the value when bounded,
/// `None` when unbounded on that side. Closed shapes always attain bounds.
pub type Extremum = Option<BigRational>;

/// Derive the relation of a non-empty shape with `expr ⋈ 0` from the exact
/// extrema of `expr` over the shape.
pub fn relation_from_extrema(
    minimum: &Extremum,
    maximum: &Extremum,
    kind: ConstraintKind,
) -> ConstraintRelation {
    let min_sign = minimum.as_ref().map(|q| q.signum());
    let max_sign = maximum.as_ref().map(|q| q.signum());
    let is_zero = |s: &Option<BigRational>| s.as_ref().is_some_and(|q| q.is_zero());
    let point_at_zero = is_zero(&min_sign) && is_zero(&max_sign);

    match kind {
        ConstraintKind::Equal => {
            if point_at_zero {
                ConstraintRelation::saturates().and(ConstraintRelation::is_included())
            } else if min_sign.as_ref().is_some_and(|s| s.is_positive())
                || max_sign.as_ref().is_some_and(|s| s.is_negative())
                || (minimum.is_some() && minimum == maximum)
            {
                ConstraintRelation::is_disjoint()
            } else {
                ConstraintRelation::strictly_intersects()
            }
        }
        ConstraintKind::GreaterOrEqual => {
            if min_sign.as_ref().is_some_and(|s| !s.is_negative()) {
                if point_at_zero {
                    ConstraintRelation::saturates().and(ConstraintRelation::is_included())
                } else {
                    ConstraintRelation::is_included()
                }
            } else if max_sign.as_ref().is_some_and(|s| s.is_negative()) {
                ConstraintRelation::is_disjoint()
            } else {
                ConstraintRelation::strictly_intersects()
            }
        }
        ConstraintKind::Greater => {
            if point_at_zero {
                ConstraintRelation::saturates().and(ConstraintRelation::is_disjoint())
            } else if min_sign.as_ref().is_some_and(|s| s.is_positive()) {
                ConstraintRelation::is_included()
            } else if max_sign.as_ref().is_some_and(|s| !s.is_positive()) {
                ConstraintRelation::is_disjoint()
            } else {
                ConstraintRelation::strictly_intersects()
            }
        }
    }
}

/// The relation of an empty shape with any constraint.
pub fn empty_shape_relation() -> ConstraintRelation {
    ConstraintRelation::saturates()
        .and(ConstraintRelation::is_included())
        .and(ConstraintRelation::is_disjoint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adom_core::Coefficient;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(Coefficient::from(n))
    }

    #[test]
    fn test_included_inequality() {
        // expr ranges over [1, 5]: shape ⊆ {expr ≥ 0} and {expr > 0}.
        let rel = relation_from_extrema(&Some(q(1)), &Some(q(5)), ConstraintKind::GreaterOrEqual);
        assert!(rel.implies(ConstraintRelation::is_included()));
        let rel = relation_from_extrema(&Some(q(1)), &Some(q(5)), ConstraintKind::Greater);
        assert!(rel.implies(ConstraintRelation::is_included()));
    }

    #[test]
    fn test_disjoint() {
        // expr ranges over [-5, -1].
        let rel = relation_from_extrema(&Some(q(-5)), &Some(q(-1)), ConstraintKind::GreaterOrEqual);
        assert!(rel.implies(ConstraintRelation::is_disjoint()));
        let rel = relation_from_extrema(&Some(q(-5)), &Some(q(-1)), ConstraintKind::Equal);
        assert!(rel.implies(ConstraintRelation::is_disjoint()));
    }

    #[test]
    fn test_saturates() {
        // expr is identically 0 on the shape.
        let rel = relation_from_extrema(&Some(q(0)), &Some(q(0)), ConstraintKind::Equal);
        assert!(rel.implies(ConstraintRelation::saturates()));
        assert!(rel.implies(ConstraintRelation::is_included()));
        // For a strict constraint the boundary is outside.
        let rel = relation_from_extrema(&Some(q(0)), &Some(q(0)), ConstraintKind::Greater);
        assert!(rel.implies(ConstraintRelation::is_disjoint()));
    }

    #[test]
    fn test_strictly_intersects() {
        let rel = relation_from_extrema(&Some(q(-1)), &Some(q(1)), ConstraintKind::GreaterOrEqual);
        assert!(rel.implies(ConstraintRelation::strictly_intersects()));
        // Unbounded on both sides.
        let rel = relation_from_extrema(&None, &None, ConstraintKind::Equal);
        assert!(rel.implies(ConstraintRelation::strictly_intersects()));
    }
}
