//! Linear congruences, the interface consumed from the grid collaborator.
//!
//! A congruence is `e ≡ 0 (mod m)` with `m ≥ 0`; modulus zero denotes the
//! equality `e = 0`.

use num_integer::Integer;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::linexpr::LinearExpr;
use crate::number::Coefficient;

/// `expr ≡ 0 (mod modulus)`, with modulus zero meaning equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Congruence {
    expr: LinearExpr,
    modulus: Coefficient,
}

impl Congruence {
    pub fn new(expr: LinearExpr, modulus: impl Into<Coefficient>) -> Self {
        let m = modulus.into();
        Congruence {
            expr,
            modulus: m.abs(),
        }
    }

    /// The equality congruence `expr = 0`.
    pub fn equality(expr: LinearExpr) -> Self {
        Congruence {
            expr,
            modulus: Coefficient::zero(),
        }
    }

    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    pub fn modulus(&self) -> &Coefficient {
        &self.modulus
    }

    pub fn space_dimension(&self) -> usize {
        self.expr.space_dimension()
    }

    pub fn is_equality(&self) -> bool {
        self.modulus.is_zero()
    }

    /// A congruence with a non-zero modulus.
    pub fn is_proper(&self) -> bool {
        !self.is_equality()
    }

    /// As an equality constraint (only meaningful when `is_equality`).
    pub fn as_equality_constraint(&self) -> Constraint {
        debug_assert!(self.is_equality());
        Constraint::eq_zero(self.expr.clone())
    }

    /// Trivially true: no variables and the constant satisfies the relation.
    pub fn is_tautological(&self) -> bool {
        if !self.expr.all_homogeneous_terms_are_zero() {
            return false;
        }
        let b = self.expr.inhomogeneous_term();
        if self.is_equality() {
            b.is_zero()
        } else {
            Integer::mod_floor(b, &self.modulus).is_zero()
        }
    }

    /// Trivially false: no variables and the constant violates the relation.
    pub fn is_inconsistent(&self) -> bool {
        self.expr.all_homogeneous_terms_are_zero() && !self.is_tautological()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variable;

    #[test]
    fn test_equality_detection() {
        let cg = Congruence::equality(LinearExpr::from_variable(Variable::new(0)));
        assert!(cg.is_equality());
        assert!(!cg.is_proper());
    }

    #[test]
    fn test_trivial_congruences() {
        // 6 ≡ 0 (mod 3) is a tautology; 5 ≡ 0 (mod 3) is inconsistent.
        assert!(Congruence::new(LinearExpr::constant(6), 3).is_tautological());
        assert!(Congruence::new(LinearExpr::constant(5), 3).is_inconsistent());
        assert!(Congruence::equality(LinearExpr::constant(0)).is_tautological());
    }

    #[test]
    fn test_modulus_normalized_positive() {
        let cg = Congruence::new(LinearExpr::constant(1), -4);
        assert_eq!(*cg.modulus(), Coefficient::from(4));
    }
}
