//! The arithmetic trait behind every shape-matrix entry.
//!
//! The original engine is parameterised over a coefficient type and a policy
//! pair; here that expansion is collapsed into a single trait,
//! [`FiniteNumber`], with the rounding direction threaded through every
//! operation that can be inexact. Two policies are provided:
//!
//! | Policy | Backing type | `half`/`div_round_up` |
//! |--------|--------------|-----------------------|
//! | integer | [`BigInt`] | ceiling/floor per direction |
//! | rational | [`BigRational`] | exact |
//!
//! Soundness contract: a result rounded `Up` never under-approximates the
//! mathematical value, so a shape built from `Up`-rounded bounds never
//! under-approximates the feasible set.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use once_cell::sync::Lazy;

use crate::rounding::{Rounding, ValueRelation};

/// Arbitrary-precision signed integer used for every exact coefficient.
pub type Coefficient = BigInt;

/// Process-wide constants pool, initialised on first use.
///
/// The hot loops compare against zero and scale by one/two constantly;
/// sharing the allocations keeps them off the allocator.
pub mod consts {
    use super::*;

    pub static ZERO: Lazy<BigInt> = Lazy::new(<BigInt as Zero>::zero);
    pub static ONE: Lazy<BigInt> = Lazy::new(BigInt::one);
    pub static TWO: Lazy<BigInt> = Lazy::new(|| BigInt::from(2));
}

/// The finite part of an extended shape-matrix entry.
///
/// Implementors must be exact: `add`/`sub`/`neg`/`mul`/`double` never round.
/// The inexact operations (`half`, `div_round_up`, `div_coeff`,
/// `from_rational`) take a [`Rounding`] direction and report the relation of
/// the stored value to the true result.
pub trait FiniteNumber:
    Clone + Ord + Eq + std::fmt::Debug + std::fmt::Display + Sized
{
    /// True for the integer policy; gates tight coherence.
    const IS_INTEGER: bool;

    fn zero() -> Self;

    /// Sign of the value: -1, 0 or +1.
    fn sgn(&self) -> i32;

    fn neg(&self) -> Self;

    fn add(&self, other: &Self) -> Self;

    fn sub(&self, other: &Self) -> Self;

    fn mul(&self, other: &Self) -> Self;

    /// Multiplication by two (`mul2exp` with exponent 1); always exact.
    fn double(&self) -> Self;

    /// Division by two (`div2exp` with exponent 1).
    ///
    /// For the integer policy the result is rounded in the requested
    /// direction and the relation reports `Gt`/`Lt` when the value was odd.
    fn half(&self, dir: Rounding) -> (Self, ValueRelation);

    /// Exact injection of a coefficient.
    fn from_coefficient(c: &Coefficient) -> Self;

    /// `num / den` rounded towards plus infinity (`den` non-zero, any sign).
    fn div_round_up(num: &Coefficient, den: &Coefficient) -> Self;

    /// Division by a positive coefficient with explicit direction.
    fn div_coeff(&self, den: &Coefficient, dir: Rounding) -> (Self, ValueRelation);

    /// The universal direction-aware conversion (`assign_r`).
    fn from_rational(q: &BigRational, dir: Rounding) -> (Self, ValueRelation);

    fn to_rational(&self) -> BigRational;

    /// Coprime numerator/denominator pair, denominator positive.
    fn numer_denom(&self) -> (Coefficient, Coefficient);

    /// True when the value is a mathematical integer.
    fn is_integer_value(&self) -> bool;

    /// True when the value is an even integer.
    fn is_even_value(&self) -> bool;

    /// Parse the canonical textual form used by the ASCII format
    /// (integers, or `p/q` for rationals).
    fn parse_text(s: &str) -> Option<Self>;
}

impl FiniteNumber for BigInt {
    const IS_INTEGER: bool = true;

    fn zero() -> Self {
        <BigInt as Zero>::zero()
    }

    fn sgn(&self) -> i32 {
        match self.sign() {
            num_bigint::Sign::Minus => -1,
            num_bigint::Sign::NoSign => 0,
            num_bigint::Sign::Plus => 1,
        }
    }

    fn neg(&self) -> Self {
        -self
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn mul(&self, other: &Self) -> Self {
        self * other
    }

    fn double(&self) -> Self {
        self << 1
    }

    fn half(&self, dir: Rounding) -> (Self, ValueRelation) {
        if self.is_even() {
            (self >> 1, ValueRelation::Eq)
        } else {
            match dir {
                Rounding::Up | Rounding::Check | Rounding::StrictRelation => {
                    ((self + &*consts::ONE) >> 1, ValueRelation::Gt)
                }
                Rounding::Down => (self.div_floor(&consts::TWO), ValueRelation::Lt),
                Rounding::Ignore | Rounding::NotNeeded => {
                    (self.div_floor(&consts::TWO), ValueRelation::Lge)
                }
            }
        }
    }

    fn from_coefficient(c: &Coefficient) -> Self {
        c.clone()
    }

    fn div_round_up(num: &Coefficient, den: &Coefficient) -> Self {
        // ceil(num/den) = -floor(-num/den), valid for either sign of den.
        -((-num).div_floor(den))
    }

    fn div_coeff(&self, den: &Coefficient, dir: Rounding) -> (Self, ValueRelation) {
        debug_assert!(den.is_positive());
        let (q, r) = self.div_mod_floor(den);
        if r.is_zero() {
            (q, ValueRelation::Eq)
        } else {
            match dir {
                Rounding::Up | Rounding::Check | Rounding::StrictRelation => {
                    (q + &*consts::ONE, ValueRelation::Gt)
                }
                Rounding::Down => (q, ValueRelation::Lt),
                Rounding::Ignore | Rounding::NotNeeded => (q, ValueRelation::Lge),
            }
        }
    }

    fn from_rational(q: &BigRational, dir: Rounding) -> (Self, ValueRelation) {
        if q.denom().is_one() {
            (q.numer().clone(), ValueRelation::Eq)
        } else {
            match dir {
                Rounding::Up | Rounding::Check | Rounding::StrictRelation => {
                    (q.ceil().to_integer(), ValueRelation::Gt)
                }
                Rounding::Down => (q.floor().to_integer(), ValueRelation::Lt),
                Rounding::Ignore | Rounding::NotNeeded => {
                    (q.floor().to_integer(), ValueRelation::Lge)
                }
            }
        }
    }

    fn to_rational(&self) -> BigRational {
        BigRational::from_integer(self.clone())
    }

    fn numer_denom(&self) -> (Coefficient, Coefficient) {
        (self.clone(), BigInt::one())
    }

    fn is_integer_value(&self) -> bool {
        true
    }

    fn is_even_value(&self) -> bool {
        self.is_even()
    }

    fn parse_text(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FiniteNumber for BigRational {
    const IS_INTEGER: bool = false;

    fn zero() -> Self {
        <BigRational as Zero>::zero()
    }

    fn sgn(&self) -> i32 {
        if self.is_positive() {
            1
        } else if self.is_negative() {
            -1
        } else {
            0
        }
    }

    fn neg(&self) -> Self {
        -self
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn mul(&self, other: &Self) -> Self {
        self * other
    }

    fn double(&self) -> Self {
        self * BigRational::from_integer(consts::TWO.clone())
    }

    fn half(&self, _dir: Rounding) -> (Self, ValueRelation) {
        (
            self / BigRational::from_integer(consts::TWO.clone()),
            ValueRelation::Eq,
        )
    }

    fn from_coefficient(c: &Coefficient) -> Self {
        BigRational::from_integer(c.clone())
    }

    fn div_round_up(num: &Coefficient, den: &Coefficient) -> Self {
        BigRational::new(num.clone(), den.clone())
    }

    fn div_coeff(&self, den: &Coefficient, _dir: Rounding) -> (Self, ValueRelation) {
        debug_assert!(den.is_positive());
        (
            self / BigRational::from_integer(den.clone()),
            ValueRelation::Eq,
        )
    }

    fn from_rational(q: &BigRational, _dir: Rounding) -> (Self, ValueRelation) {
        (q.clone(), ValueRelation::Eq)
    }

    fn to_rational(&self) -> BigRational {
        self.clone()
    }

    fn numer_denom(&self) -> (Coefficient, Coefficient) {
        (self.numer().clone(), self.denom().clone())
    }

    fn is_integer_value(&self) -> bool {
        self.denom().is_one()
    }

    fn is_even_value(&self) -> bool {
        self.denom().is_one() && self.numer().is_even()
    }

    fn parse_text(s: &str) -> Option<Self> {
        match s.split_once('/') {
            Some((n, d)) => {
                let n: BigInt = n.parse().ok()?;
                let d: BigInt = d.parse().ok()?;
                if d.is_zero() {
                    None
                } else {
                    Some(BigRational::new(n, d))
                }
            }
            None => {
                let n: BigInt = s.parse().ok()?;
                Some(BigRational::from_integer(n))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_half_rounds_up() {
        let five = BigInt::from(5);
        let (h, rel) = five.half(Rounding::Up);
        assert_eq!(h, BigInt::from(3));
        assert_eq!(rel, ValueRelation::Gt);

        let (h, rel) = five.half(Rounding::Down);
        assert_eq!(h, BigInt::from(2));
        assert_eq!(rel, ValueRelation::Lt);

        let minus_five = BigInt::from(-5);
        let (h, _) = minus_five.half(Rounding::Up);
        assert_eq!(h, BigInt::from(-2));
    }

    #[test]
    fn test_div_round_up_signs() {
        // ceil(7/2) = 4, ceil(-7/2) = -3, ceil(7/-2) = -3
        assert_eq!(
            <BigInt as FiniteNumber>::div_round_up(&BigInt::from(7), &BigInt::from(2)),
            BigInt::from(4)
        );
        assert_eq!(
            <BigInt as FiniteNumber>::div_round_up(&BigInt::from(-7), &BigInt::from(2)),
            BigInt::from(-3)
        );
        assert_eq!(
            <BigInt as FiniteNumber>::div_round_up(&BigInt::from(7), &BigInt::from(-2)),
            BigInt::from(-3)
        );
    }

    #[test]
    fn test_rational_half_is_exact() {
        let q = BigRational::new(BigInt::from(3), BigInt::from(1));
        let (h, rel) = q.half(Rounding::Up);
        assert_eq!(h, BigRational::new(BigInt::from(3), BigInt::from(2)));
        assert_eq!(rel, ValueRelation::Eq);
    }

    #[test]
    fn test_parse_round_trip() {
        let q = BigRational::new(BigInt::from(-5), BigInt::from(3));
        let text = q.to_string();
        assert_eq!(BigRational::parse_text(&text), Some(q));

        let n = BigInt::from(-42);
        assert_eq!(BigInt::parse_text(&n.to_string()), Some(n));
    }

    #[test]
    fn test_numer_denom_coprime() {
        let q = BigRational::new(BigInt::from(4), BigInt::from(6));
        let (n, d) = q.numer_denom();
        assert_eq!(n, BigInt::from(2));
        assert_eq!(d, BigInt::from(3));
    }
}
