//! Constraint-level projection for the "all ranking functions" queries.
//!
//! The double-description polyhedron kernel is an external collaborator of
//! this core; the μ-space queries only need existential quantification of
//! the multiplier dimensions, which an exact Fourier–Motzkin elimination
//! over constraint systems provides. A [`RankingCone`] is that projected
//! system together with its ambient dimension.

use num_rational::BigRational;
use num_traits::{Signed, Zero};

use adom_core::{
    Constraint, ConstraintKind, ConstraintSystem, DomainResult, LinearExpr, Variable, Watchdog,
};
use adom_lp::LpProblem;

/// The space of affine ranking functions, as a constraint-described
/// polyhedral cone over the μ coordinates.
#[derive(Debug, Clone)]
pub struct RankingCone {
    space_dim: usize,
    cs: ConstraintSystem,
}

impl RankingCone {
    pub(crate) fn from_constraints(space_dim: usize, cs: ConstraintSystem) -> Self {
        RankingCone { space_dim, cs }
    }

    pub fn space_dimension(&self) -> usize {
        self.space_dim
    }

    /// The constraint description of the cone.
    pub fn constraints(&self) -> &ConstraintSystem {
        &self.cs
    }

    /// True when no ranking function exists at all.
    pub fn is_empty(&mut self) -> DomainResult<bool> {
        let mut lp = LpProblem::new(self.space_dim);
        lp.add_constraints(&self.cs)?;
        Ok(!lp.is_satisfiable()?)
    }

    /// Membership test for a candidate μ vector.
    pub fn contains_point(&self, coords: &[BigRational]) -> bool {
        self.cs.satisfied_at(coords)
    }

    /// Existentially quantify every dimension at or above `new_dim`.
    pub(crate) fn eliminate_higher_dimensions(&mut self, new_dim: usize) -> DomainResult<()> {
        for d in (new_dim..self.space_dim).rev() {
            Watchdog::tick(1)?;
            self.eliminate_dimension(d);
        }
        self.space_dim = new_dim;
        Ok(())
    }

    /// Pad the ambient space with unconstrained dimensions.
    pub(crate) fn embed(&mut self, m: usize) {
        self.space_dim += m;
    }

    /// Meet with another cone of the same dimension.
    pub(crate) fn intersection_assign(&mut self, other: &RankingCone) {
        debug_assert_eq!(self.space_dim, other.space_dim);
        for c in &other.cs {
            self.cs.insert(c.clone());
        }
    }

    /// One Fourier–Motzkin step: drop dimension `d`.
    fn eliminate_dimension(&mut self, d: usize) {
        let var = Variable::new(d);

        // Prefer a pivot equality mentioning d: substitution keeps the
        // system small.
        let pivot = self
            .cs
            .iter()
            .find(|c| c.is_equality() && !c.coefficient(var).is_zero())
            .cloned();
        if let Some(pivot) = pivot {
            // Normalize the pivot to a positive coefficient at d.
            let (p_expr, p_coeff) = {
                let a = pivot.coefficient(var);
                if a.is_negative() {
                    (-pivot.expr().clone(), -a)
                } else {
                    (pivot.expr().clone(), a)
                }
            };
            let mut out = ConstraintSystem::with_space_dimension(self.space_dim);
            let mut seen_pivot = false;
            for c in &self.cs {
                if !seen_pivot && *c == pivot {
                    // The defining equality itself is consumed.
                    seen_pivot = true;
                    continue;
                }
                let a = c.coefficient(var);
                if a.is_zero() {
                    out.insert(c.clone());
                    continue;
                }
                // c·p − pivot·a cancels d; scaling an (in)equality by the
                // positive p and shifting by a multiple of an equality
                // preserves its kind.
                let combined = c.expr().clone() * p_coeff.clone() - p_expr.clone() * a;
                out.insert(Constraint::new(combined, c.kind()));
            }
            self.cs = Self::dedup(out);
            return;
        }

        // Pure inequality elimination: combine every lower bound with
        // every upper bound of d.
        let mut zero_part = ConstraintSystem::with_space_dimension(self.space_dim);
        let mut lower = Vec::new(); // coefficient at d positive
        let mut upper = Vec::new(); // coefficient at d negative
        for c in &self.cs {
            let a = c.coefficient(var);
            if a.is_zero() {
                zero_part.insert(c.clone());
            } else if a.is_positive() {
                lower.push((c.expr().clone(), a));
            } else {
                upper.push((c.expr().clone(), -a));
            }
        }
        for (lo_expr, lo_coeff) in &lower {
            for (up_expr, up_coeff) in &upper {
                // lo·|a_up| + up·|a_lo| has a zero coefficient at d.
                let combined =
                    lo_expr.clone() * up_coeff.clone() + up_expr.clone() * lo_coeff.clone();
                let c = Constraint::ge_zero(combined);
                if !c.is_tautological() {
                    zero_part.insert(c);
                }
            }
        }
        self.cs = Self::dedup(zero_part);
    }

    fn dedup(cs: ConstraintSystem) -> ConstraintSystem {
        let mut out = ConstraintSystem::with_space_dimension(cs.space_dimension());
        let mut kept: Vec<Constraint> = Vec::new();
        for c in &cs {
            if c.is_tautological() || kept.contains(c) {
                continue;
            }
            kept.push(c.clone());
            out.insert(c.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adom_core::Coefficient;

    fn var(i: usize) -> LinearExpr {
        LinearExpr::from_variable(Variable::new(i))
    }

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(Coefficient::from(n))
    }

    #[test]
    fn test_inequality_elimination() {
        // {x ≤ y, y ≤ z} with y in the top dimension: projecting y away
        // leaves x ≤ z.
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::le(var(0), var(2)));
        cs.insert(Constraint::le(var(2), var(1)));
        let mut cone = RankingCone::from_constraints(3, cs);
        cone.eliminate_higher_dimensions(2).unwrap();
        assert_eq!(cone.space_dimension(), 2);
        assert!(cone.contains_point(&[q(0), q(1)]));
        assert!(!cone.contains_point(&[q(2), q(1)]));
    }

    #[test]
    fn test_equality_pivot_elimination() {
        // {y = x + 1, y ≤ 5} projected away from y gives x ≤ 4.
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(1), var(0) + LinearExpr::constant(1)));
        cs.insert(Constraint::le(var(1), LinearExpr::constant(5)));
        let mut cone = RankingCone::from_constraints(2, cs);
        cone.eliminate_higher_dimensions(1).unwrap();
        assert_eq!(cone.space_dimension(), 1);
        assert!(cone.contains_point(&[q(4)]));
        assert!(!cone.contains_point(&[q(5)]));
    }

    #[test]
    fn test_empty_cone() {
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::ge(var(0), LinearExpr::constant(1)));
        cs.insert(Constraint::le(var(0), LinearExpr::constant(0)));
        let mut cone = RankingCone::from_constraints(1, cs);
        assert!(cone.is_empty().unwrap());
    }
}
