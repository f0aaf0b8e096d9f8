//! # adom-lp: Exact Linear Programming
//!
//! A two-phase primal simplex solver over exact rationals, used whenever the
//! weakly-relational shape engines cannot answer a query directly (bounds of
//! a general linear expression) and by the termination analyzer for its
//! satisfiability queries.
//!
//! ## Quick Start
//!
//! ```ignore
//! use adom_lp::{LpProblem, LpStatus, OptimizationMode};
//!
//! let mut lp = LpProblem::from_parts(2, cs, objective, OptimizationMode::Maximization)?;
//! if lp.solve()? == LpStatus::Optimized {
//!     let (num, den) = lp.optimal_value()?;
//!     let witness = lp.optimizing_point()?;
//! }
//! ```
//!
//! Everything is exact: the tableau is integer, rows are normalized by gcd,
//! and witnesses come back as point generators with a common divisor.

pub mod problem;
pub mod tableau;

pub use problem::{LpProblem, LpStatus, OptimizationMode, Pricing};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_round_trip() {
        let json = serde_json::to_string(&LpStatus::Optimized).unwrap();
        let back: LpStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LpStatus::Optimized);

        let json = serde_json::to_string(&OptimizationMode::Minimization).unwrap();
        let back: OptimizationMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OptimizationMode::Minimization);
    }
}
