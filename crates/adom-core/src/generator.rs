//! Generators: lines, rays, points and closure points.
//!
//! A generator wraps a homogeneous linear expression. Points and closure
//! points carry a strictly positive divisor `d` and denote the geometric
//! point `(a₀/d, …, aₙ₋₁/d)`; lines and rays have divisor zero.

use num_rational::BigRational;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::linexpr::LinearExpr;
use crate::number::Coefficient;
use crate::Variable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorKind {
    Line,
    Ray,
    Point,
    ClosurePoint,
}

/// A line, ray, point or closure point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generator {
    expr: LinearExpr,
    kind: GeneratorKind,
    divisor: Coefficient,
}

impl Generator {
    /// A line along `expr` (must not be the zero direction).
    pub fn line(mut expr: LinearExpr) -> DomainResult<Self> {
        if expr.all_homogeneous_terms_are_zero() {
            return Err(DomainError::Other(
                "line(e): e is the zero direction".into(),
            ));
        }
        expr.set_inhomogeneous_term(0);
        Ok(Generator {
            expr,
            kind: GeneratorKind::Line,
            divisor: Coefficient::zero(),
        })
    }

    /// A ray along `expr` (must not be the zero direction).
    pub fn ray(mut expr: LinearExpr) -> DomainResult<Self> {
        if expr.all_homogeneous_terms_are_zero() {
            return Err(DomainError::Other("ray(e): e is the zero direction".into()));
        }
        expr.set_inhomogeneous_term(0);
        Ok(Generator {
            expr,
            kind: GeneratorKind::Ray,
            divisor: Coefficient::zero(),
        })
    }

    /// The point `expr / divisor`; the divisor must be non-zero and is
    /// normalized positive.
    pub fn point(expr: LinearExpr, divisor: impl Into<Coefficient>) -> DomainResult<Self> {
        Self::point_like(expr, divisor.into(), GeneratorKind::Point)
    }

    /// The origin of the given space dimension.
    pub fn origin() -> Self {
        Generator {
            expr: LinearExpr::new(),
            kind: GeneratorKind::Point,
            divisor: Coefficient::from(1),
        }
    }

    /// The closure point `expr / divisor`.
    pub fn closure_point(
        expr: LinearExpr,
        divisor: impl Into<Coefficient>,
    ) -> DomainResult<Self> {
        Self::point_like(expr, divisor.into(), GeneratorKind::ClosurePoint)
    }

    fn point_like(
        mut expr: LinearExpr,
        divisor: Coefficient,
        kind: GeneratorKind,
    ) -> DomainResult<Self> {
        if divisor.is_zero() {
            return Err(DomainError::ZeroDenominator { op: "point(e, d)" });
        }
        expr.set_inhomogeneous_term(0);
        let divisor = if divisor.is_negative() {
            expr = -expr;
            -divisor
        } else {
            divisor
        };
        Ok(Generator { expr, kind, divisor })
    }

    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    pub fn is_point(&self) -> bool {
        self.kind == GeneratorKind::Point
    }

    pub fn is_point_or_closure_point(&self) -> bool {
        matches!(self.kind, GeneratorKind::Point | GeneratorKind::ClosurePoint)
    }

    pub fn is_line(&self) -> bool {
        self.kind == GeneratorKind::Line
    }

    pub fn is_ray(&self) -> bool {
        self.kind == GeneratorKind::Ray
    }

    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    pub fn coefficient(&self, v: Variable) -> Coefficient {
        self.expr.coefficient(v)
    }

    /// The divisor (strictly positive for points, zero for lines/rays).
    pub fn divisor(&self) -> &Coefficient {
        &self.divisor
    }

    pub fn space_dimension(&self) -> usize {
        self.expr.space_dimension()
    }

    /// Rational coordinates of a point/closure point, padded to `dim`.
    pub fn rational_coords(&self, dim: usize) -> Vec<BigRational> {
        debug_assert!(self.is_point_or_closure_point());
        (0..dim)
            .map(|i| {
                BigRational::new(
                    self.expr.coefficient(Variable::new(i)),
                    self.divisor.clone(),
                )
            })
            .collect()
    }
}

impl std::fmt::Display for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.kind {
            GeneratorKind::Line => "l",
            GeneratorKind::Ray => "r",
            GeneratorKind::Point => "p",
            GeneratorKind::ClosurePoint => "c",
        };
        if self.divisor.is_zero() {
            write!(f, "{}({})", tag, self.expr)
        } else {
            write!(f, "{}(({}) / {})", tag, self.expr, self.divisor)
        }
    }
}

/// An ordered collection of generators with a tracked space dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSystem {
    space_dim: usize,
    generators: Vec<Generator>,
}

impl GeneratorSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, g: Generator) {
        self.space_dim = self.space_dim.max(g.space_dimension());
        self.generators.push(g);
    }

    pub fn space_dimension(&self) -> usize {
        self.space_dim
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Generator> {
        self.generators.iter()
    }

    pub fn has_points(&self) -> bool {
        self.generators.iter().any(Generator::is_point)
    }
}

impl<'a> IntoIterator for &'a GeneratorSystem {
    type Item = &'a Generator;
    type IntoIter = std::slice::Iter<'a, Generator>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Generator> for GeneratorSystem {
    fn from_iter<I: IntoIterator<Item = Generator>>(iter: I) -> Self {
        let mut gs = GeneratorSystem::new();
        for g in iter {
            gs.insert(g);
        }
        gs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(i: usize) -> Variable {
        Variable::new(i)
    }

    #[test]
    fn test_point_divisor_normalized_positive() {
        let mut e = LinearExpr::new();
        e.add_mul_assign(3, x(0));
        let p = Generator::point(e, -2).unwrap();
        assert_eq!(*p.divisor(), Coefficient::from(2));
        assert_eq!(p.coefficient(x(0)), Coefficient::from(-3));
    }

    #[test]
    fn test_point_zero_divisor_rejected() {
        let e = LinearExpr::from_variable(x(0));
        assert!(matches!(
            Generator::point(e, 0),
            Err(DomainError::ZeroDenominator { .. })
        ));
    }

    #[test]
    fn test_zero_direction_rejected() {
        assert!(Generator::ray(LinearExpr::new()).is_err());
        assert!(Generator::line(LinearExpr::constant(5)).is_err());
    }

    #[test]
    fn test_rational_coords() {
        let mut e = LinearExpr::new();
        e.add_mul_assign(1, x(0));
        e.add_mul_assign(3, x(1));
        let p = Generator::point(e, 2).unwrap();
        let coords = p.rational_coords(3);
        assert_eq!(coords[0], BigRational::new(1.into(), 2.into()));
        assert_eq!(coords[1], BigRational::new(3.into(), 2.into()));
        assert!(coords[2].is_zero());
    }

    #[test]
    fn test_system_has_points() {
        let mut gs = GeneratorSystem::new();
        gs.insert(Generator::ray(LinearExpr::from_variable(x(1))).unwrap());
        assert!(!gs.has_points());
        gs.insert(Generator::origin());
        assert!(gs.has_points());
    }
}
