//! The difference-bound matrix backing `BdShape`.
//!
//! An `(n+1)×(n+1)` dense array of extended numbers where entry `(i, j)`
//! upper-bounds `x_j − x_i` and index 0 is the fictitious zero variable.
//! Diagonal entries are physically `+∞` (they are logically zero).

use adom_core::{Bound, FiniteNumber};

/// Square matrix of bounds over `dim` rows (`dim = space_dim + 1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbMatrix<T: FiniteNumber> {
    dim: usize,
    cells: Vec<Bound<T>>,
}

impl<T: FiniteNumber> DbMatrix<T> {
    /// The unconstrained matrix for `space_dim` variables.
    pub fn universe(space_dim: usize) -> Self {
        let dim = space_dim + 1;
        DbMatrix {
            dim,
            cells: vec![Bound::PlusInfinity; dim * dim],
        }
    }

    /// Number of rows (`space_dim + 1`).
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> &Bound<T> {
        &self.cells[i * self.dim + j]
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut Bound<T> {
        &mut self.cells[i * self.dim + j]
    }

    pub fn set(&mut self, i: usize, j: usize, v: Bound<T>) {
        self.cells[i * self.dim + j] = v;
    }

    /// Iterate over `(i, j, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Bound<T>)> {
        let dim = self.dim;
        self.cells
            .iter()
            .enumerate()
            .map(move |(k, c)| (k / dim, k % dim, c))
    }

    /// Mutable row-major traversal.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(usize, usize, &mut Bound<T>)) {
        let dim = self.dim;
        for (k, c) in self.cells.iter_mut().enumerate() {
            f(k / dim, k % dim, c);
        }
    }

    /// Grow by `m` extra variables, new cells unconstrained.
    pub fn grow(&mut self, m: usize) {
        let old_dim = self.dim;
        let new_dim = old_dim + m;
        let mut cells = vec![Bound::PlusInfinity; new_dim * new_dim];
        for i in 0..old_dim {
            for j in 0..old_dim {
                cells[i * new_dim + j] = self.cells[i * old_dim + j].clone();
            }
        }
        self.dim = new_dim;
        self.cells = cells;
    }

    /// Keep only the rows/columns whose index satisfies `keep` (index 0
    /// must always be kept), compacting in place.
    pub fn compact(&mut self, keep: impl Fn(usize) -> bool) {
        debug_assert!(keep(0));
        let kept: Vec<usize> = (0..self.dim).filter(|&i| keep(i)).collect();
        let new_dim = kept.len();
        let mut cells = vec![Bound::PlusInfinity; new_dim * new_dim];
        for (ni, &oi) in kept.iter().enumerate() {
            for (nj, &oj) in kept.iter().enumerate() {
                cells[ni * new_dim + nj] = self.cells[oi * self.dim + oj].clone();
            }
        }
        self.dim = new_dim;
        self.cells = cells;
    }

    /// Rebuild through an index map: `map[i] = Some(new index)` keeps the
    /// row/column, `None` drops it. Index 0 always maps to 0.
    pub fn remap(&self, new_space_dim: usize, map: impl Fn(usize) -> Option<usize>) -> Self {
        let new_dim = new_space_dim + 1;
        let mut out = DbMatrix::universe(new_space_dim);
        for i in 0..self.dim {
            let Some(ni) = (if i == 0 { Some(0) } else { map(i) }) else {
                continue;
            };
            for j in 0..self.dim {
                let Some(nj) = (if j == 0 { Some(0) } else { map(j) }) else {
                    continue;
                };
                out.cells[ni * new_dim + nj] = self.cells[i * self.dim + j].clone();
            }
        }
        out
    }
}

/// Read-only view of a DBM, handed to equality tests and the ASCII writer.
pub struct DbMatrixView<'a, T: FiniteNumber> {
    matrix: &'a DbMatrix<T>,
}

impl<'a, T: FiniteNumber> DbMatrixView<'a, T> {
    pub fn new(matrix: &'a DbMatrix<T>) -> Self {
        DbMatrixView { matrix }
    }

    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    pub fn at(&self, i: usize, j: usize) -> &Bound<T> {
        self.matrix.at(i, j)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Bound<T>)> {
        self.matrix.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adom_core::Coefficient;

    type M = DbMatrix<Coefficient>;

    fn fin(n: i64) -> Bound<Coefficient> {
        Bound::Finite(Coefficient::from(n))
    }

    #[test]
    fn test_universe_all_infinite() {
        let m = M::universe(2);
        assert_eq!(m.dim(), 3);
        assert!(m.iter().all(|(_, _, c)| c.is_plus_infinity()));
    }

    #[test]
    fn test_grow_preserves() {
        let mut m = M::universe(1);
        m.set(0, 1, fin(5));
        m.grow(2);
        assert_eq!(m.dim(), 4);
        assert_eq!(*m.at(0, 1), fin(5));
        assert!(m.at(0, 3).is_plus_infinity());
    }

    #[test]
    fn test_compact() {
        let mut m = M::universe(2);
        m.set(0, 2, fin(7));
        m.set(2, 1, fin(3));
        // Drop variable 1 (matrix index 1).
        m.compact(|i| i != 1);
        assert_eq!(m.dim(), 2);
        assert_eq!(*m.at(0, 1), fin(7));
    }

    #[test]
    fn test_remap_swap() {
        let mut m = M::universe(2);
        m.set(0, 1, fin(1));
        m.set(0, 2, fin(2));
        // Swap the two variables.
        let swapped = m.remap(2, |i| Some(if i == 1 { 2 } else { 1 }));
        assert_eq!(*swapped.at(0, 2), fin(1));
        assert_eq!(*swapped.at(0, 1), fin(2));
    }
}
