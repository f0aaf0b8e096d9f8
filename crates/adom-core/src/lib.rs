//! # adom-core: Abstract-Domain Numerical Core
//!
//! Provides the fundamental data structures shared by the weakly-relational
//! shape engines, the exact LP solver and the termination analyzer.
//!
//! ## Design Philosophy
//!
//! Everything downstream manipulates sets of points in ℚⁿ described by
//! **linear constraints over exact rationals**:
//!
//! - [`LinearExpr`]: sparse integer-coefficient expressions
//! - [`Constraint`] / [`ConstraintSystem`]: tagged relations (`=`, `≥`, `>`)
//! - [`Generator`] / [`GeneratorSystem`]: lines, rays, points, closure points
//! - [`Bound`] over the [`FiniteNumber`] trait: the extended numbers filling
//!   every shape-matrix entry, with a rounding direction threaded through
//!   every operation that can be inexact
//!
//! The two arithmetic policies (integer [`num_bigint::BigInt`] and rational
//! [`num_rational::BigRational`]) replace the template/policy expansion of
//! the original engine with a single trait.
//!
//! ## Error model
//!
//! Precondition violations surface as [`DomainError`]; numerical emptiness
//! never does (the shapes internalise it as a state change). Cooperative
//! cancellation goes through the thread-local [`Watchdog`].

use serde::{Deserialize, Serialize};

pub mod bbox;
pub mod bound;
pub mod congruence;
pub mod constraint;
pub mod dimensions;
pub mod error;
pub mod generator;
pub mod linexpr;
pub mod number;
pub mod rounding;
pub mod watchdog;

pub use bbox::{BoundingBox, BoxBound};
pub use bound::Bound;
pub use congruence::Congruence;
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use dimensions::{DimensionMap, VariableSet};
pub use error::{DomainError, DomainResult};
pub use generator::{Generator, GeneratorKind, GeneratorSystem};
pub use linexpr::LinearExpr;
pub use number::{consts, Coefficient, FiniteNumber};
pub use rounding::{Rounding, ValueRelation};
pub use watchdog::Watchdog;

/// A dimension of the ambient vector space (newtype for type safety).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(usize);

impl Variable {
    #[inline]
    pub fn new(index: usize) -> Self {
        Variable(index)
    }

    /// The zero-based dimension index.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// The smallest space dimension containing this variable.
    #[inline]
    pub fn space_dimension(self) -> usize {
        self.0 + 1
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // A, B, ..., Z, A1, B1, ...
        let letter = (b'A' + (self.0 % 26) as u8) as char;
        let round = self.0 / 26;
        if round == 0 {
            write!(f, "{}", letter)
        } else {
            write!(f, "{}{}", letter, round)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_display() {
        assert_eq!(Variable::new(0).to_string(), "A");
        assert_eq!(Variable::new(25).to_string(), "Z");
        assert_eq!(Variable::new(26).to_string(), "A1");
    }

    #[test]
    fn test_variable_serde_transparent() {
        let v = Variable::new(7);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "7");
        let back: Variable = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
