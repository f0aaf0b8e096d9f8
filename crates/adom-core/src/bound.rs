//! Extended numbers: the `N` of the shape matrices.
//!
//! A [`Bound`] is either a finite [`FiniteNumber`] or plus infinity, with
//! the total order `Finite(_) < PlusInfinity`. The minus-infinity and NaN
//! policy variants of the original checked-number layer are not reachable
//! with the exact policies shipped here; the predicates exist so that the
//! algorithms read the same.

use std::cmp::Ordering;

use crate::number::{Coefficient, FiniteNumber};
use crate::rounding::{Rounding, ValueRelation};

/// A shape-matrix entry: a finite value or plus infinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound<T: FiniteNumber> {
    Finite(T),
    PlusInfinity,
}

impl<T: FiniteNumber> PartialOrd for Bound<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: FiniteNumber> Ord for Bound<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a.cmp(b),
            (Bound::Finite(_), Bound::PlusInfinity) => Ordering::Less,
            (Bound::PlusInfinity, Bound::Finite(_)) => Ordering::Greater,
            (Bound::PlusInfinity, Bound::PlusInfinity) => Ordering::Equal,
        }
    }
}

impl<T: FiniteNumber> Bound<T> {
    pub fn zero() -> Self {
        Bound::Finite(T::zero())
    }

    pub fn is_plus_infinity(&self) -> bool {
        matches!(self, Bound::PlusInfinity)
    }

    /// Always false for the exact policies (no minus-infinity variant).
    pub fn is_minus_infinity(&self) -> bool {
        false
    }

    /// Always false for the exact policies (no NaN variant).
    pub fn is_nan(&self) -> bool {
        false
    }

    pub fn as_finite(&self) -> Option<&T> {
        match self {
            Bound::Finite(v) => Some(v),
            Bound::PlusInfinity => None,
        }
    }

    /// Sign of a finite entry; plus infinity reports +1.
    pub fn sgn(&self) -> i32 {
        match self {
            Bound::Finite(v) => v.sgn(),
            Bound::PlusInfinity => 1,
        }
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Bound::Finite(v) => v.is_integer_value(),
            Bound::PlusInfinity => false,
        }
    }

    /// Extended addition: anything plus infinity is infinity.
    ///
    /// The direction is threaded for policy parity; both shipped policies
    /// add exactly.
    pub fn add(&self, other: &Self, _dir: Rounding) -> Self {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.add(b)),
            _ => Bound::PlusInfinity,
        }
    }

    pub fn sub_finite(&self, other: &T, _dir: Rounding) -> Self {
        match self {
            Bound::Finite(a) => Bound::Finite(a.sub(other)),
            Bound::PlusInfinity => Bound::PlusInfinity,
        }
    }

    /// Division by two; infinity is preserved.
    pub fn half(&self, dir: Rounding) -> Self {
        match self {
            Bound::Finite(v) => Bound::Finite(v.half(dir).0),
            Bound::PlusInfinity => Bound::PlusInfinity,
        }
    }

    /// Multiplication by two; infinity is preserved.
    pub fn double(&self) -> Self {
        match self {
            Bound::Finite(v) => Bound::Finite(v.double()),
            Bound::PlusInfinity => Bound::PlusInfinity,
        }
    }

    /// `num / den` rounded towards plus infinity.
    pub fn div_round_up(num: &Coefficient, den: &Coefficient) -> Self {
        Bound::Finite(T::div_round_up(num, den))
    }

    /// Division by a positive coefficient with explicit direction.
    pub fn div_coeff(&self, den: &Coefficient, dir: Rounding) -> Self {
        match self {
            Bound::Finite(v) => Bound::Finite(v.div_coeff(den, dir).0),
            Bound::PlusInfinity => Bound::PlusInfinity,
        }
    }

    /// Lower the entry to `other` if `other` is smaller (`min_assign`).
    pub fn min_assign(&mut self, other: &Self) {
        if *other < *self {
            *self = other.clone();
        }
    }

    /// Raise the entry to `other` if `other` is larger (`max_assign`).
    pub fn max_assign(&mut self, other: &Self) {
        if *other > *self {
            *self = other.clone();
        }
    }

    /// True when `self` and `other` are finite additive inverses.
    pub fn is_additive_inverse(&self, other: &Self) -> bool {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a.neg() == *b,
            _ => false,
        }
    }

    /// Cross-policy conversion with explicit direction (`assign_r`).
    pub fn assign_from<U: FiniteNumber>(other: &Bound<U>, dir: Rounding) -> (Self, ValueRelation) {
        match other {
            Bound::PlusInfinity => (Bound::PlusInfinity, ValueRelation::EqPlusInf),
            Bound::Finite(v) => {
                let (value, rel) = T::from_rational(&v.to_rational(), dir);
                (Bound::Finite(value), rel)
            }
        }
    }
}

impl<T: FiniteNumber> std::fmt::Display for Bound<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Finite(v) => write!(f, "{}", v),
            Bound::PlusInfinity => write!(f, "+inf"),
        }
    }
}

impl<T: FiniteNumber> Bound<T> {
    /// Parse the canonical textual form produced by `Display`.
    pub fn parse_text(s: &str) -> Option<Self> {
        if s == "+inf" {
            Some(Bound::PlusInfinity)
        } else {
            T::parse_text(s).map(Bound::Finite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    type B = Bound<BigInt>;

    #[test]
    fn test_order_finite_below_infinity() {
        let three = B::Finite(BigInt::from(3));
        assert!(three < B::PlusInfinity);
        assert!(B::PlusInfinity == B::PlusInfinity);
        assert!(B::Finite(BigInt::from(-7)) < three);
    }

    #[test]
    fn test_add_absorbs_infinity() {
        let two = B::Finite(BigInt::from(2));
        assert_eq!(
            two.add(&B::Finite(BigInt::from(5)), Rounding::Up),
            B::Finite(BigInt::from(7))
        );
        assert!(two.add(&B::PlusInfinity, Rounding::Up).is_plus_infinity());
    }

    #[test]
    fn test_min_max_assign() {
        let mut x = B::PlusInfinity;
        x.min_assign(&B::Finite(BigInt::from(4)));
        assert_eq!(x, B::Finite(BigInt::from(4)));
        x.max_assign(&B::Finite(BigInt::from(2)));
        assert_eq!(x, B::Finite(BigInt::from(4)));
        x.max_assign(&B::PlusInfinity);
        assert!(x.is_plus_infinity());
    }

    #[test]
    fn test_display_parse_round_trip() {
        for b in [B::PlusInfinity, B::Finite(BigInt::from(-12))] {
            assert_eq!(B::parse_text(&b.to_string()), Some(b));
        }
    }

    #[test]
    fn test_additive_inverse() {
        let a = B::Finite(BigInt::from(5));
        let b = B::Finite(BigInt::from(-5));
        assert!(a.is_additive_inverse(&b));
        assert!(!a.is_additive_inverse(&B::PlusInfinity));
    }
}
