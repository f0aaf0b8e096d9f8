//! Dense integer rows for the simplex tableau.
//!
//! Rows are kept in lowest terms: after every linear combination the row is
//! divided by the gcd of its entries, so coefficient growth stays bounded by
//! the problem data rather than by the pivot count.

use num_integer::Integer;
use num_traits::Zero;

use adom_core::Coefficient;

/// A tableau row: column 0 holds the inhomogeneous term.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    coeffs: Vec<Coefficient>,
}

impl Row {
    pub fn zeros(len: usize) -> Self {
        Row {
            coeffs: vec![Coefficient::zero(); len],
        }
    }

    pub fn from_vec(coeffs: Vec<Coefficient>) -> Self {
        Row { coeffs }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Grow with zero entries on the right.
    pub fn grow(&mut self, new_len: usize) {
        debug_assert!(new_len >= self.coeffs.len());
        self.coeffs.resize(new_len, Coefficient::zero());
    }

    /// Drop trailing entries.
    pub fn shrink(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.coeffs.len());
        self.coeffs.truncate(new_len);
    }

    pub fn negate(&mut self) {
        for c in &mut self.coeffs {
            *c = -std::mem::take(c);
        }
    }

    /// Divide the row by the gcd of its entries.
    pub fn normalize(&mut self) {
        let mut g = Coefficient::zero();
        for c in &self.coeffs {
            if !c.is_zero() {
                g = g.gcd(c);
                if g == Coefficient::from(1) {
                    return;
                }
            }
        }
        if g.is_zero() || g == Coefficient::from(1) {
            return;
        }
        for c in &mut self.coeffs {
            *c = &*c / &g;
        }
    }

    /// `self := self·(y[k]/g) − y·(self[k]/g)` with `g = gcd(self[k], y[k])`,
    /// then normalize. Zeroes column `k` of `self`.
    pub fn linear_combine(&mut self, y: &Row, k: usize) {
        debug_assert_eq!(self.len(), y.len());
        debug_assert!(!self.coeffs[k].is_zero() && !y.coeffs[k].is_zero());
        let g = self.coeffs[k].gcd(&y.coeffs[k]);
        let normalized_x_k = &self.coeffs[k] / &g;
        let normalized_y_k = &y.coeffs[k] / &g;
        for i in 0..self.coeffs.len() {
            if i != k {
                let mut x_i = std::mem::take(&mut self.coeffs[i]);
                x_i *= &normalized_y_k;
                let y_i = &y.coeffs[i];
                if !y_i.is_zero() {
                    x_i -= y_i * &normalized_x_k;
                }
                self.coeffs[i] = x_i;
            }
        }
        self.coeffs[k] = Coefficient::zero();
        self.normalize();
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Coefficient;

    fn index(&self, i: usize) -> &Coefficient {
        &self.coeffs[i]
    }
}

impl std::ops::IndexMut<usize> for Row {
    fn index_mut(&mut self, i: usize) -> &mut Coefficient {
        &mut self.coeffs[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v: &[i64]) -> Row {
        Row::from_vec(v.iter().map(|&x| Coefficient::from(x)).collect())
    }

    #[test]
    fn test_normalize() {
        let mut r = row(&[6, -9, 0, 12]);
        r.normalize();
        assert_eq!(r, row(&[2, -3, 0, 4]));
    }

    #[test]
    fn test_linear_combine_zeroes_pivot_column() {
        let mut x = row(&[1, 2, 3]);
        let y = row(&[0, 4, 6]);
        x.linear_combine(&y, 1);
        assert!(x[1].is_zero());
        // x = x*2 - y*1 = [2, 0, 0] normalized to [1, 0, 0].
        assert_eq!(x, row(&[1, 0, 0]));
    }

    #[test]
    fn test_grow_and_shrink() {
        let mut r = row(&[1, 2]);
        r.grow(4);
        assert_eq!(r.len(), 4);
        assert!(r[3].is_zero());
        r.shrink(2);
        assert_eq!(r, row(&[1, 2]));
    }
}
