//! # adom-shapes: Weakly-Relational Shape Engines
//!
//! The two workhorse abstract domains used by the fixpoint engines:
//!
//! | Shape | Constraints | Matrix | Closure |
//! |-------|-------------|--------|---------|
//! | [`BdShape`] | `±xᵢ ≤ k`, `xᵢ − xⱼ ≤ k` | [`DbMatrix`] (n+1)² | shortest path |
//! | [`Octagon`] | `±xᵢ ± xⱼ ≤ k` | [`OctMatrix`] pseudo-triangular 2n | strong closure |
//!
//! Both expose the same abstract-domain contract: meet, join (with the
//! BHZ09 exact-join test), widening/narrowing, affine transfer functions,
//! space-dimension manipulation, relation queries and a stable ASCII
//! persistence format. Closure is logically read-only and cached on the
//! shape; queries the matrices cannot answer directly (bounds of a general
//! linear expression) are dispatched to the exact simplex in `adom-lp`.
//!
//! ## Numeric policies
//!
//! Shapes are generic over the [`adom_core::FiniteNumber`] policy. The
//! provided aliases cover the two exact instantiations:
//!
//! - [`IntBdShape`] / [`IntOctagon`]: integer bounds, inexact divisions
//!   round towards `+∞`, tight coherence enabled;
//! - [`RatBdShape`] / [`RatOctagon`]: exact rational bounds.
//!
//! ## Quick Start
//!
//! ```ignore
//! use adom_shapes::{IntOctagon, RelSym};
//! use adom_core::{Constraint, LinearExpr, Variable};
//!
//! let x = Variable::new(0);
//! let mut oct = IntOctagon::universe(2);
//! oct.add_constraint(&Constraint::le(LinearExpr::from_variable(x), LinearExpr::constant(1)))?;
//! assert!(!oct.is_empty()?);
//! ```

use num_bigint::BigInt;
use num_rational::BigRational;

pub mod bds;
pub mod dbm;
pub mod extract;
pub mod octagon;
pub mod octmat;
pub mod relations;
pub mod status;

pub use bds::BdShape;
pub use dbm::{DbMatrix, DbMatrixView};
pub use extract::{extract_bounded_difference, extract_octagonal_difference, CellConstraint};
pub use octagon::Octagon;
pub use octmat::{coherent, row_size, OctMatrix, OctMatrixView};
pub use relations::{ConstraintRelation, GeneratorRelation, RelSym};
pub use status::{BitRow, Status};

/// Bounded-difference shape with integer bounds.
pub type IntBdShape = BdShape<BigInt>;
/// Bounded-difference shape with exact rational bounds.
pub type RatBdShape = BdShape<BigRational>;
/// Octagonal shape with integer bounds (tight coherence enabled).
pub type IntOctagon = Octagon<BigInt>;
/// Octagonal shape with exact rational bounds.
pub type RatOctagon = Octagon<BigRational>;
