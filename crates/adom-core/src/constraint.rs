//! Linear constraints and constraint systems.
//!
//! A constraint is a tagged linear expression: `e = 0`, `e ≥ 0` or `e > 0`
//! (`e ≤ 0` is encoded as `-e ≥ 0`). Stored constraints are canonical: the
//! gcd of every integer component is one and equalities have a positive
//! leading coefficient.

use num_integer::Integer;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::linexpr::LinearExpr;
use crate::number::Coefficient;
use crate::Variable;

/// The relation of a constraint to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `e = 0`
    Equal,
    /// `e ≥ 0`
    GreaterOrEqual,
    /// `e > 0`
    Greater,
}

/// A canonicalized linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    expr: LinearExpr,
    kind: ConstraintKind,
}

impl Constraint {
    /// Build and canonicalize a constraint `expr ⋈ 0`.
    pub fn new(expr: LinearExpr, kind: ConstraintKind) -> Self {
        let mut c = Constraint { expr, kind };
        c.canonicalize();
        c
    }

    /// `expr = 0`
    pub fn eq_zero(expr: LinearExpr) -> Self {
        Constraint::new(expr, ConstraintKind::Equal)
    }

    /// `expr ≥ 0`
    pub fn ge_zero(expr: LinearExpr) -> Self {
        Constraint::new(expr, ConstraintKind::GreaterOrEqual)
    }

    /// `expr > 0`
    pub fn gt_zero(expr: LinearExpr) -> Self {
        Constraint::new(expr, ConstraintKind::Greater)
    }

    /// `lhs = rhs`
    pub fn eq(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Constraint::eq_zero(lhs - rhs)
    }

    /// `lhs ≥ rhs`
    pub fn ge(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Constraint::ge_zero(lhs - rhs)
    }

    /// `lhs ≤ rhs`
    pub fn le(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Constraint::ge_zero(rhs - lhs)
    }

    /// `lhs > rhs`
    pub fn gt(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Constraint::gt_zero(lhs - rhs)
    }

    /// `lhs < rhs`
    pub fn lt(lhs: LinearExpr, rhs: LinearExpr) -> Self {
        Constraint::gt_zero(rhs - lhs)
    }

    fn canonicalize(&mut self) {
        // Joint gcd reduction over coefficients and inhomogeneous term.
        let mut g = self.expr.inhomogeneous_term().abs();
        for (_, c) in self.expr.terms() {
            g = g.gcd(c);
        }
        if !g.is_zero() && g != Coefficient::from(1) {
            let terms: Vec<(Variable, Coefficient)> = self
                .expr
                .terms()
                .map(|(v, c)| (v, c / &g))
                .collect();
            let b = self.expr.inhomogeneous_term() / &g;
            let mut e = LinearExpr::constant(b);
            for (v, c) in terms {
                e.add_mul_assign(c, v);
            }
            self.expr = e;
        }
        // Equalities store a positive leading coefficient.
        if self.kind == ConstraintKind::Equal {
            let negate = match self.expr.terms().next() {
                Some((_, c)) => c.is_negative(),
                None => self.expr.inhomogeneous_term().is_negative(),
            };
            if negate {
                self.expr = -self.expr.clone();
            }
        }
    }

    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn space_dimension(&self) -> usize {
        self.expr.space_dimension()
    }

    pub fn coefficient(&self, v: Variable) -> Coefficient {
        self.expr.coefficient(v)
    }

    pub fn inhomogeneous_term(&self) -> &Coefficient {
        self.expr.inhomogeneous_term()
    }

    pub fn is_equality(&self) -> bool {
        self.kind == ConstraintKind::Equal
    }

    pub fn is_inequality(&self) -> bool {
        !self.is_equality()
    }

    pub fn is_strict_inequality(&self) -> bool {
        self.kind == ConstraintKind::Greater
    }

    /// True when the constraint holds for every point (no variables and a
    /// satisfied constant relation).
    pub fn is_tautological(&self) -> bool {
        if !self.expr.all_homogeneous_terms_are_zero() {
            return false;
        }
        let b = self.expr.inhomogeneous_term();
        match self.kind {
            ConstraintKind::Equal => b.is_zero(),
            ConstraintKind::GreaterOrEqual => !b.is_negative(),
            ConstraintKind::Greater => b.is_positive(),
        }
    }

    /// True when the constraint holds for no point.
    pub fn is_inconsistent(&self) -> bool {
        if !self.expr.all_homogeneous_terms_are_zero() {
            return false;
        }
        let b = self.expr.inhomogeneous_term();
        match self.kind {
            ConstraintKind::Equal => !b.is_zero(),
            ConstraintKind::GreaterOrEqual => b.is_negative(),
            ConstraintKind::Greater => !b.is_positive(),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rel = match self.kind {
            ConstraintKind::Equal => "==",
            ConstraintKind::GreaterOrEqual => ">=",
            ConstraintKind::Greater => ">",
        };
        write!(f, "{} {} 0", self.expr, rel)
    }
}

/// An ordered collection of constraints with a tracked space dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    space_dim: usize,
    constraints: Vec<Constraint>,
}

impl ConstraintSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty system over a fixed ambient dimension.
    pub fn with_space_dimension(space_dim: usize) -> Self {
        ConstraintSystem {
            space_dim,
            constraints: Vec::new(),
        }
    }

    pub fn insert(&mut self, c: Constraint) {
        self.space_dim = self.space_dim.max(c.space_dimension());
        self.constraints.push(c);
    }

    pub fn space_dimension(&self) -> usize {
        self.space_dim
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.constraints.iter()
    }

    pub fn has_strict_inequalities(&self) -> bool {
        self.constraints.iter().any(Constraint::is_strict_inequality)
    }

    /// Evaluate `c.expr` at the rational point `coords` and check `c`.
    ///
    /// `coords[i]` is the value of variable `i`; missing trailing
    /// coordinates are zero.
    pub fn satisfied_at(&self, coords: &[num_rational::BigRational]) -> bool {
        use num_rational::BigRational;
        self.constraints.iter().all(|c| {
            let mut value = BigRational::from_integer(c.inhomogeneous_term().clone());
            for (v, a) in c.expr().terms() {
                if let Some(x) = coords.get(v.index()) {
                    value += BigRational::from_integer(a.clone()) * x;
                }
            }
            match c.kind() {
                ConstraintKind::Equal => value.is_zero(),
                ConstraintKind::GreaterOrEqual => !value.is_negative(),
                ConstraintKind::Greater => value.is_positive(),
            }
        })
    }
}

impl<'a> IntoIterator for &'a ConstraintSystem {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Constraint> for ConstraintSystem {
    fn from_iter<I: IntoIterator<Item = Constraint>>(iter: I) -> Self {
        let mut cs = ConstraintSystem::new();
        for c in iter {
            cs.insert(c);
        }
        cs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(i: usize) -> Variable {
        Variable::new(i)
    }

    #[test]
    fn test_gcd_canonicalization() {
        // 4x - 6y + 8 >= 0 reduces to 2x - 3y + 4 >= 0.
        let mut e = LinearExpr::constant(8);
        e.add_mul_assign(4, x(0));
        e.add_mul_assign(-6, x(1));
        let c = Constraint::ge_zero(e);
        assert_eq!(c.coefficient(x(0)), Coefficient::from(2));
        assert_eq!(c.coefficient(x(1)), Coefficient::from(-3));
        assert_eq!(*c.inhomogeneous_term(), Coefficient::from(4));
    }

    #[test]
    fn test_equality_sign_canonicalization() {
        // -x + 1 == 0 is stored as x - 1 == 0.
        let mut e = LinearExpr::constant(1);
        e.add_mul_assign(-1, x(0));
        let c = Constraint::eq_zero(e);
        assert_eq!(c.coefficient(x(0)), Coefficient::from(1));
        assert_eq!(*c.inhomogeneous_term(), Coefficient::from(-1));
    }

    #[test]
    fn test_trivial_constraints() {
        assert!(Constraint::ge_zero(LinearExpr::constant(0)).is_tautological());
        assert!(Constraint::gt_zero(LinearExpr::constant(0)).is_inconsistent());
        assert!(Constraint::ge_zero(LinearExpr::constant(-1)).is_inconsistent());
        assert!(Constraint::eq_zero(LinearExpr::constant(3)).is_inconsistent());
    }

    #[test]
    fn test_system_tracks_dimension() {
        let mut cs = ConstraintSystem::new();
        assert_eq!(cs.space_dimension(), 0);
        cs.insert(Constraint::ge_zero(LinearExpr::from_variable(x(2))));
        assert_eq!(cs.space_dimension(), 3);
        assert!(!cs.has_strict_inequalities());
        cs.insert(Constraint::gt_zero(LinearExpr::from_variable(x(0))));
        assert!(cs.has_strict_inequalities());
    }

    #[test]
    fn test_satisfied_at() {
        use num_rational::BigRational;
        // x - y >= 0 at (2, 1) holds, at (0, 1) does not.
        let e = LinearExpr::from_variable(x(0)) - LinearExpr::from_variable(x(1));
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::ge_zero(e));
        let q = |n: i64| BigRational::from_integer(Coefficient::from(n));
        assert!(cs.satisfied_at(&[q(2), q(1)]));
        assert!(!cs.satisfied_at(&[q(0), q(1)]));
    }
}
