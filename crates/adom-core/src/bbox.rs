//! Rational bounding boxes, the interval-domain interface.
//!
//! A box records, per dimension, an optional lower and upper rational bound
//! together with a closed/open flag. Shapes consume boxes through their
//! `from_box` constructors.

use num_rational::BigRational;
use serde::{Deserialize, Serialize};

/// One side of an interval: the bound value and whether it is attained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxBound {
    pub value: BigRational,
    pub closed: bool,
}

/// A product of intervals over `space_dimension` dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    lower: Vec<Option<BoxBound>>,
    upper: Vec<Option<BoxBound>>,
    empty: bool,
}

impl BoundingBox {
    /// The universe box over `dim` dimensions.
    pub fn universe(dim: usize) -> Self {
        BoundingBox {
            lower: vec![None; dim],
            upper: vec![None; dim],
            empty: false,
        }
    }

    /// The empty box over `dim` dimensions.
    pub fn empty(dim: usize) -> Self {
        let mut b = Self::universe(dim);
        b.empty = true;
        b
    }

    pub fn space_dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn set_lower(&mut self, dim: usize, value: BigRational, closed: bool) {
        self.lower[dim] = Some(BoxBound { value, closed });
    }

    pub fn set_upper(&mut self, dim: usize, value: BigRational, closed: bool) {
        self.upper[dim] = Some(BoxBound { value, closed });
    }

    pub fn lower(&self, dim: usize) -> Option<&BoxBound> {
        self.lower[dim].as_ref()
    }

    pub fn upper(&self, dim: usize) -> Option<&BoxBound> {
        self.upper[dim].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_universe_has_no_bounds() {
        let b = BoundingBox::universe(3);
        assert_eq!(b.space_dimension(), 3);
        assert!(b.lower(0).is_none() && b.upper(2).is_none());
        assert!(!b.is_empty());
    }

    #[test]
    fn test_bounds_round_trip() {
        let mut b = BoundingBox::universe(2);
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        b.set_upper(1, half.clone(), true);
        let ub = b.upper(1).unwrap();
        assert_eq!(ub.value, half);
        assert!(ub.closed);
    }
}
