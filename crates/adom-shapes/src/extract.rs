//! Recognition of bounded-difference and octagonal constraints.
//!
//! A constraint enters a shape matrix only if it fits one cell:
//!
//! - bounded difference: `±a·xᵢ ≤ b` or `a·(xᵢ − xⱼ) ≤ b` with `a > 0`;
//! - octagonal difference: additionally `±xᵢ ± xⱼ ≤ b` (same absolute
//!   coefficient on both variables).
//!
//! The extractors translate the `≥`/`=` input form into the cell `(i, j)`
//! holding the `≤` part, the (possibly negative) coefficient whose absolute
//! value divides the bound, and the bound numerator. Unary octagonal
//! constraints have their numerator doubled because the unary cells encode
//! `±2·xᵢ`. Equalities additionally touch the coherent mirror cell, which
//! is the caller's business.

use num_traits::{Signed, Zero};

use adom_core::{Coefficient, Constraint, Variable};

/// The matrix cell selected by a recognized constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConstraint {
    /// Number of variables involved: 0 (trivial), 1 or 2.
    pub num_vars: usize,
    /// Row of the cell holding the `≤` part.
    pub i: usize,
    /// Column of the cell holding the `≤` part.
    pub j: usize,
    /// Common coefficient; its absolute value divides the bound.
    pub coeff: Coefficient,
    /// Bound numerator (already doubled for unary octagonal cells).
    pub term: Coefficient,
}

/// Try to read `c` as an octagonal difference over a `2·dim` matrix.
///
/// Strictness is the caller's concern: the cell produced for a strict
/// inequality is its non-strict relaxation.
pub fn extract_octagonal_difference(c: &Constraint, dim: usize) -> Option<CellConstraint> {
    let vars: Vec<(Variable, Coefficient)> = c
        .expr()
        .terms()
        .map(|(v, a)| (v, a.clone()))
        .collect();
    if vars.len() > 2 || c.space_dimension() > dim {
        return None;
    }
    let b = c.inhomogeneous_term().clone();

    match vars.as_slice() {
        [] => Some(CellConstraint {
            num_vars: 0,
            i: 0,
            j: 0,
            coeff: Coefficient::from(0),
            term: b,
        }),
        [(u, a)] => {
            // a·x_u + b ≥ 0. For a > 0 this bounds −2·x_u from above,
            // touching cell (2u, 2u+1); for a < 0 it bounds +2·x_u,
            // touching cell (2u+1, 2u).
            let u = u.index();
            let (i, j) = if a.is_positive() { (2 * u, 2 * u + 1) } else { (2 * u + 1, 2 * u) };
            Some(CellConstraint {
                num_vars: 1,
                i,
                j,
                coeff: a.clone(),
                term: b.double_term(),
            })
        }
        [(u, au), (v, av)] => {
            // a_u·x_u + a_v·x_v + b ≥ 0 with u < v and |a_u| == |a_v|.
            if au.abs() != av.abs() {
                return None;
            }
            let (u, v) = (u.index(), v.index());
            debug_assert!(u < v);
            let (i, j) = match (au.is_positive(), av.is_positive()) {
                // x_v − x_u ≤ b/a: coherent cell of (2u, 2v).
                (true, false) => (2 * v + 1, 2 * u + 1),
                // −x_u − x_v ≤ b/a.
                (true, true) => (2 * v, 2 * u + 1),
                // x_u + x_v ≤ b/a.
                (false, false) => (2 * v + 1, 2 * u),
                // x_u − x_v ≤ b/a.
                (false, true) => (2 * v, 2 * u),
            };
            Some(CellConstraint {
                num_vars: 2,
                i,
                j,
                coeff: au.clone(),
                term: b,
            })
        }
        _ => unreachable!(),
    }
}

/// Try to read `c` as a bounded difference over a `(dim+1)`-square DBM.
///
/// Cell `(i, j)` bounds `x_j − x_i` with index 0 standing for the constant
/// zero variable; same-sign variable pairs are rejected.
pub fn extract_bounded_difference(c: &Constraint, dim: usize) -> Option<CellConstraint> {
    let vars: Vec<(Variable, Coefficient)> = c
        .expr()
        .terms()
        .map(|(v, a)| (v, a.clone()))
        .collect();
    if vars.len() > 2 || c.space_dimension() > dim {
        return None;
    }
    let b = c.inhomogeneous_term().clone();

    match vars.as_slice() {
        [] => Some(CellConstraint {
            num_vars: 0,
            i: 0,
            j: 0,
            coeff: Coefficient::from(0),
            term: b,
        }),
        [(u, a)] => {
            // a·x_u + b ≥ 0: for a > 0 this bounds x_0 − x_u, for a < 0
            // it bounds x_u − x_0.
            let u = u.index();
            let (i, j) = if a.is_positive() { (u + 1, 0) } else { (0, u + 1) };
            Some(CellConstraint {
                num_vars: 1,
                i,
                j,
                coeff: a.clone(),
                term: b,
            })
        }
        [(u, au), (v, av)] => {
            // Only opposite signs with equal magnitude fit a DBM cell.
            if au.abs() != av.abs() || au.signum() == av.signum() {
                return None;
            }
            let (u, v) = (u.index(), v.index());
            let (i, j) = if au.is_positive() {
                // a(x_u − x_v) + b ≥ 0: bounds x_v − x_u.
                (u + 1, v + 1)
            } else {
                // bounds x_u − x_v.
                (v + 1, u + 1)
            };
            Some(CellConstraint {
                num_vars: 2,
                i,
                j,
                coeff: au.clone(),
                term: b,
            })
        }
        _ => unreachable!(),
    }
}

trait DoubleTerm {
    fn double_term(&self) -> Coefficient;
}

impl DoubleTerm for Coefficient {
    fn double_term(&self) -> Coefficient {
        self * Coefficient::from(2)
    }
}

/// True when `c` mentions at most the recognised shapes of variables but is
/// trivially constant.
pub fn is_trivial(cell: &CellConstraint) -> bool {
    cell.num_vars == 0 && cell.coeff.is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adom_core::LinearExpr;

    fn x(i: usize) -> LinearExpr {
        LinearExpr::from_variable(Variable::new(i))
    }

    fn c(n: i64) -> LinearExpr {
        LinearExpr::constant(n)
    }

    #[test]
    fn test_unary_octagonal() {
        // x0 ≤ 3, i.e. 3 - x0 ≥ 0: cell (1, 0) bounding +2·x0 by 6.
        let con = Constraint::le(x(0), c(3));
        let cell = extract_octagonal_difference(&con, 1).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (1, 1, 0));
        assert_eq!(cell.term, Coefficient::from(6));
        assert_eq!(cell.coeff, Coefficient::from(-1));

        // x0 ≥ -2: cell (0, 1) bounding −2·x0 by 4.
        let con = Constraint::ge(x(0), c(-2));
        let cell = extract_octagonal_difference(&con, 1).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (1, 0, 1));
        assert_eq!(cell.term, Coefficient::from(4));
    }

    #[test]
    fn test_binary_octagonal_sum() {
        // x0 + x1 ≤ 2: −x0 − x1 + 2 ≥ 0: cell (2·1+1, 2·0) = (3, 0).
        let con = Constraint::le(x(0) + x(1), c(2));
        let cell = extract_octagonal_difference(&con, 2).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (2, 3, 0));
        assert_eq!(cell.term, Coefficient::from(2));
    }

    #[test]
    fn test_binary_octagonal_difference() {
        // x0 − x1 ≤ 1: −x0 + x1 + 1 ≥ 0: a_u < 0, a_v > 0: cell (2, 0).
        let con = Constraint::le(x(0) - x(1), c(1));
        let cell = extract_octagonal_difference(&con, 2).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (2, 2, 0));
        assert_eq!(cell.term, Coefficient::from(1));
    }

    #[test]
    fn test_octagonal_rejects_unequal_coefficients() {
        let con = Constraint::le(x(0) * Coefficient::from(2) + x(1), c(1));
        assert!(extract_octagonal_difference(&con, 2).is_none());
    }

    #[test]
    fn test_bounded_difference() {
        // x1 − x0 ≤ 5: cell (i=1, j=2) in DBM indices.
        let con = Constraint::le(x(1) - x(0), c(5));
        let cell = extract_bounded_difference(&con, 2).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (2, 1, 2));
        assert_eq!(cell.term, Coefficient::from(5));

        // x0 ≤ 1: cell (0, 1).
        let con = Constraint::le(x(0), c(1));
        let cell = extract_bounded_difference(&con, 1).unwrap();
        assert_eq!((cell.num_vars, cell.i, cell.j), (1, 0, 1));
        assert_eq!(cell.term, Coefficient::from(1));
    }

    #[test]
    fn test_bd_rejects_sums() {
        let con = Constraint::le(x(0) + x(1), c(0));
        assert!(extract_bounded_difference(&con, 2).is_none());
        // But the octagonal extractor accepts it.
        assert!(extract_octagonal_difference(&con, 2).is_some());
    }

    #[test]
    fn test_trivial() {
        let con = Constraint::ge_zero(c(1));
        let cell = extract_bounded_difference(&con, 0).unwrap();
        assert_eq!(cell.num_vars, 0);
    }
}
