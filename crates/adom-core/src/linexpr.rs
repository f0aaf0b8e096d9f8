//! Sparse linear expressions over variable indices.
//!
//! An expression is `b + Σ aᵢ·xᵢ` with arbitrary-precision integer
//! coefficients, stored sparsely (zero coefficients are never kept). Its
//! space dimension is one past the highest variable with a non-zero
//! coefficient.

use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::number::Coefficient;
use crate::Variable;

/// A sparse linear expression `b + Σ aᵢ·xᵢ`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinearExpr {
    /// Non-zero homogeneous coefficients, keyed by variable index.
    terms: BTreeMap<usize, Coefficient>,
    /// The inhomogeneous term `b`.
    inhomogeneous: Coefficient,
}

impl LinearExpr {
    /// The zero expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// The constant expression `b`.
    pub fn constant(b: impl Into<Coefficient>) -> Self {
        LinearExpr {
            terms: BTreeMap::new(),
            inhomogeneous: b.into(),
        }
    }

    /// The expression `1·v`.
    pub fn from_variable(v: Variable) -> Self {
        let mut e = Self::new();
        e.add_mul_assign(Coefficient::from(1), v);
        e
    }

    /// `self += c·v`.
    pub fn add_mul_assign(&mut self, c: impl Into<Coefficient>, v: Variable) {
        let c = c.into();
        if c.is_zero() {
            return;
        }
        let entry = self.terms.entry(v.index()).or_insert_with(Coefficient::zero);
        *entry += c;
        if entry.is_zero() {
            self.terms.remove(&v.index());
        }
    }

    /// `self -= c·v`.
    pub fn sub_mul_assign(&mut self, c: impl Into<Coefficient>, v: Variable) {
        self.add_mul_assign(-c.into(), v);
    }

    /// `self += b` on the inhomogeneous term.
    pub fn add_to_inhomogeneous(&mut self, b: impl Into<Coefficient>) {
        self.inhomogeneous += b.into();
    }

    pub fn inhomogeneous_term(&self) -> &Coefficient {
        &self.inhomogeneous
    }

    pub fn set_inhomogeneous_term(&mut self, b: impl Into<Coefficient>) {
        self.inhomogeneous = b.into();
    }

    /// The coefficient of `v` (zero when absent).
    pub fn coefficient(&self, v: Variable) -> Coefficient {
        self.terms
            .get(&v.index())
            .cloned()
            .unwrap_or_else(Coefficient::zero)
    }

    /// Iterate over the non-zero terms in increasing variable order.
    pub fn terms(&self) -> impl Iterator<Item = (Variable, &Coefficient)> {
        self.terms.iter().map(|(&i, c)| (Variable::new(i), c))
    }

    /// One past the highest variable with a non-zero coefficient.
    pub fn space_dimension(&self) -> usize {
        self.terms.keys().next_back().map_or(0, |&i| i + 1)
    }

    /// True when every homogeneous coefficient is zero.
    pub fn all_homogeneous_terms_are_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of non-zero homogeneous coefficients.
    pub fn num_nonzero_terms(&self) -> usize {
        self.terms.len()
    }

    /// Multiply every component (including `b`) by `c`.
    pub fn scale(&mut self, c: &Coefficient) {
        if c.is_zero() {
            self.terms.clear();
            self.inhomogeneous = Coefficient::zero();
            return;
        }
        for coeff in self.terms.values_mut() {
            *coeff *= c;
        }
        self.inhomogeneous *= c;
    }

    /// Remap every variable through `f`, dropping terms mapped to `None`.
    pub fn remap_variables(&self, f: impl Fn(usize) -> Option<usize>) -> LinearExpr {
        let mut out = LinearExpr::constant(self.inhomogeneous.clone());
        for (&i, c) in &self.terms {
            if let Some(j) = f(i) {
                out.add_mul_assign(c.clone(), Variable::new(j));
            }
        }
        out
    }

    /// Shift every variable index up by `offset`.
    pub fn shifted(&self, offset: usize) -> LinearExpr {
        self.remap_variables(|i| Some(i + offset))
    }
}

impl From<Variable> for LinearExpr {
    fn from(v: Variable) -> Self {
        LinearExpr::from_variable(v)
    }
}

impl Add for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: LinearExpr) -> LinearExpr {
        for (v, c) in rhs.terms {
            self.add_mul_assign(c, Variable::new(v));
        }
        self.inhomogeneous += rhs.inhomogeneous;
        self
    }
}

impl Sub for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: LinearExpr) -> LinearExpr {
        self + (-rhs)
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(mut self) -> LinearExpr {
        for c in self.terms.values_mut() {
            *c = -std::mem::take(c);
        }
        self.inhomogeneous = -self.inhomogeneous;
        self
    }
}

impl Mul<Coefficient> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: Coefficient) -> LinearExpr {
        if rhs.is_zero() {
            return LinearExpr::new();
        }
        self.scale(&rhs);
        self
    }
}

impl std::fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (v, c) in self.terms() {
            if first {
                if *c == Coefficient::from(1) {
                    write!(f, "{}", v)?;
                } else if *c == Coefficient::from(-1) {
                    write!(f, "-{}", v)?;
                } else {
                    write!(f, "{}*{}", c, v)?;
                }
                first = false;
            } else if c.is_zero() {
                continue;
            } else if *c == Coefficient::from(1) {
                write!(f, " + {}", v)?;
            } else if *c == Coefficient::from(-1) {
                write!(f, " - {}", v)?;
            } else if c.sign() == num_bigint::Sign::Minus {
                write!(f, " - {}*{}", -c.clone(), v)?;
            } else {
                write!(f, " + {}*{}", c, v)?;
            }
        }
        if first {
            write!(f, "{}", self.inhomogeneous)?;
        } else if !self.inhomogeneous.is_zero() {
            if self.inhomogeneous.sign() == num_bigint::Sign::Minus {
                write!(f, " - {}", -self.inhomogeneous.clone())?;
            } else {
                write!(f, " + {}", self.inhomogeneous)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(i: usize) -> Variable {
        Variable::new(i)
    }

    #[test]
    fn test_sparse_storage_drops_zeros() {
        let mut e = LinearExpr::new();
        e.add_mul_assign(3, x(1));
        e.add_mul_assign(-3, x(1));
        assert!(e.all_homogeneous_terms_are_zero());
        assert_eq!(e.space_dimension(), 0);
    }

    #[test]
    fn test_space_dimension() {
        let mut e = LinearExpr::new();
        e.add_mul_assign(1, x(4));
        e.add_mul_assign(2, x(0));
        assert_eq!(e.space_dimension(), 5);
        assert_eq!(e.coefficient(x(4)), Coefficient::from(1));
        assert_eq!(e.coefficient(x(3)), Coefficient::from(0));
    }

    #[test]
    fn test_arithmetic() {
        let mut a = LinearExpr::from_variable(x(0));
        a.add_to_inhomogeneous(5);
        let b = LinearExpr::from_variable(x(1)) * Coefficient::from(2);
        let s = a.clone() + b;
        assert_eq!(s.coefficient(x(0)), Coefficient::from(1));
        assert_eq!(s.coefficient(x(1)), Coefficient::from(2));
        assert_eq!(*s.inhomogeneous_term(), Coefficient::from(5));

        let n = -a;
        assert_eq!(n.coefficient(x(0)), Coefficient::from(-1));
        assert_eq!(*n.inhomogeneous_term(), Coefficient::from(-5));
    }

    #[test]
    fn test_remap_contracts() {
        let mut e = LinearExpr::new();
        e.add_mul_assign(1, x(0));
        e.add_mul_assign(2, x(2));
        let m = e.remap_variables(|i| if i == 2 { Some(0) } else { None });
        assert_eq!(m.coefficient(x(0)), Coefficient::from(2));
        assert_eq!(m.space_dimension(), 1);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut e = LinearExpr::constant(7);
        e.add_mul_assign(-2, x(3));
        let json = serde_json::to_string(&e).unwrap();
        let back: LinearExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }
}
