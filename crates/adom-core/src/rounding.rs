//! Rounding directions and result relations for direction-aware arithmetic.
//!
//! Every operation of the extended-number layer carries a [`Rounding`]
//! direction and reports a [`ValueRelation`] telling the caller whether the
//! stored value equals, under-approximates or over-approximates the
//! mathematical result. For the exact coefficient policies shipped here the
//! direction only matters for the inexact divisions (`half`,
//! `div_round_up`); it is threaded through every call site regardless so
//! that an inexact policy can be slotted in without touching the algorithms.

use serde::{Deserialize, Serialize};

/// Rounding direction requested for an arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rounding {
    /// Round towards plus infinity.
    Up,
    /// Round towards minus infinity.
    Down,
    /// Compute freely, the caller will not rely on the direction.
    Ignore,
    /// The operation is known to be exact; rounding would be a bug.
    NotNeeded,
    /// Round and also report the exact/inexact relation.
    Check,
    /// Used when the result feeds a strict relation test.
    StrictRelation,
}

/// Relation between a stored result and the exact mathematical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueRelation {
    /// Stored value is exactly the result.
    Eq,
    /// Stored value is strictly below the result.
    Lt,
    /// Stored value is strictly above the result.
    Gt,
    /// Stored value is below or above (unknown side).
    Lge,
    /// The operation has no result (e.g. 0/0 under a policy without NaN).
    Empty,
    /// The result is exactly plus infinity.
    EqPlusInf,
    /// The result is exactly minus infinity.
    EqMinusInf,
    /// The result is finite but was widened to plus infinity.
    LtPlusInf,
    /// The result is finite but was widened to minus infinity.
    GtMinusInf,
}

impl ValueRelation {
    /// True when the stored value is the exact result (finite or infinite).
    pub fn is_exact(self) -> bool {
        matches!(self, ValueRelation::Eq | ValueRelation::EqPlusInf | ValueRelation::EqMinusInf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactness_predicate() {
        assert!(ValueRelation::Eq.is_exact());
        assert!(ValueRelation::EqPlusInf.is_exact());
        assert!(!ValueRelation::Gt.is_exact());
        assert!(!ValueRelation::LtPlusInf.is_exact());
    }
}
