//! Unified error types for the adom ecosystem
//!
//! This module provides a common error type [`DomainError`] that can represent
//! failures from any part of the system. Every public operation that can fail
//! surfaces one of these variants; numerical emptiness is never an error (it
//! is internalised as a shape-state change).
//!
//! # Example
//!
//! ```ignore
//! use adom_core::{DomainError, DomainResult};
//!
//! fn meet(x: &mut Octagon, y: &Octagon) -> DomainResult<()> {
//!     x.intersection_assign(y)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all adom operations.
///
/// The first group of variants are caller bugs (precondition violations);
/// `Abandoned` is the cooperative-cancellation sentinel raised by the
/// closure and simplex hot loops when a [`crate::Watchdog`] budget runs out.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Operands have different space dimensions.
    #[error("dimension incompatible in {op}: this has dimension {this_dim}, operand requires {required_dim}")]
    DimensionIncompatible {
        op: &'static str,
        this_dim: usize,
        required_dim: usize,
    },

    /// Constraint is not expressible in the target shape (strict API only).
    #[error("{op}: constraint is not a {shape} constraint")]
    NonShapeConstraint { op: &'static str, shape: &'static str },

    /// Strict inequality passed to a closed-shape or LP operation.
    #[error("{op}: strict inequalities are not allowed")]
    StrictInequality { op: &'static str },

    /// Zero denominator in an affine transfer function.
    #[error("{op}: denominator is zero")]
    ZeroDenominator { op: &'static str },

    /// Space dimension outside the supported range.
    #[error("{op}: invalid space dimension {dim}")]
    InvalidSpaceDimension { op: &'static str, dim: usize },

    /// A data structure would exceed its maximum supported size.
    #[error("{op}: the maximum size of an internal data structure has been exceeded")]
    LengthError { op: &'static str },

    /// The argument does not encode a partial function (non-injective map).
    #[error("{op}: the map is not a partial function")]
    NotAPartialFunction { op: &'static str },

    /// A non-empty generator system with no point generator.
    #[error("{op}: the generator system contains no point")]
    NoPointGenerator { op: &'static str },

    /// ASCII load failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Cooperative cancellation: the watchdog budget ran out.
    #[error("expensive computation abandoned")]
    Abandoned,

    /// I/O errors from dump/load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (for wrapping external errors).
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using DomainError.
pub type DomainResult<T> = Result<T, DomainError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        DomainError::Other(err.to_string())
    }
}

impl From<String> for DomainError {
    fn from(s: String) -> Self {
        DomainError::Other(s)
    }
}

impl From<&str> for DomainError {
    fn from(s: &str) -> Self {
        DomainError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::DimensionIncompatible {
            op: "intersection_assign(y)",
            this_dim: 3,
            required_dim: 4,
        };
        assert!(err.to_string().contains("dimension incompatible"));
        assert!(err.to_string().contains("intersection_assign"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> DomainResult<()> {
            Err(DomainError::StrictInequality { op: "add_constraint(c)" })
        }

        fn outer() -> DomainResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }

    #[test]
    fn test_abandoned_is_distinguishable() {
        let err = DomainError::Abandoned;
        assert!(matches!(err, DomainError::Abandoned));
    }
}
