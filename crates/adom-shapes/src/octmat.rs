//! The pseudo-triangular matrix backing `Octagon`.
//!
//! Row and column `2k` encode `+x_k`, row and column `2k+1` encode `−x_k`;
//! entry `(i, j)` upper-bounds `v_j − v_i`. Only entries with
//! `j ≤ (i | 1)` are stored; the other half is reconstructed through the
//! coherence rule `m[i][j] = m[coh(j)][coh(i)]` with `coh(k) = k ^ 1`.
//! Diagonal entries are physically `+∞` (logically zero).

use adom_core::{Bound, FiniteNumber};

/// The coherent index of `k`.
#[inline]
pub fn coherent(k: usize) -> usize {
    k ^ 1
}

/// Number of stored entries in row `i`.
#[inline]
pub fn row_size(i: usize) -> usize {
    (i | 1) + 1
}

/// Pseudo-triangular matrix over `2 · space_dim` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctMatrix<T: FiniteNumber> {
    space_dim: usize,
    rows: Vec<Vec<Bound<T>>>,
}

impl<T: FiniteNumber> OctMatrix<T> {
    /// The unconstrained matrix for `space_dim` variables.
    pub fn universe(space_dim: usize) -> Self {
        OctMatrix {
            space_dim,
            rows: (0..2 * space_dim)
                .map(|i| vec![Bound::PlusInfinity; row_size(i)])
                .collect(),
        }
    }

    pub fn space_dim(&self) -> usize {
        self.space_dim
    }

    /// Number of rows (`2 · space_dim`).
    pub fn num_rows(&self) -> usize {
        2 * self.space_dim
    }

    /// Read entry `(i, j)`, resolving the unstored half by coherence.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> &Bound<T> {
        if j < row_size(i) {
            &self.rows[i][j]
        } else {
            &self.rows[coherent(j)][coherent(i)]
        }
    }

    /// Write entry `(i, j)` through the same coherence resolution.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: Bound<T>) {
        if j < row_size(i) {
            self.rows[i][j] = v;
        } else {
            self.rows[coherent(j)][coherent(i)] = v;
        }
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut Bound<T> {
        if j < row_size(i) {
            &mut self.rows[i][j]
        } else {
            &mut self.rows[coherent(j)][coherent(i)]
        }
    }

    /// Lower entry `(i, j)` to `v` if smaller.
    pub fn min_assign_at(&mut self, i: usize, j: usize, v: &Bound<T>) {
        self.at_mut(i, j).min_assign(v);
    }

    /// Iterate over the stored entries as `(i, j, cell)`.
    pub fn iter_stored(&self) -> impl Iterator<Item = (usize, usize, &Bound<T>)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, c)| (i, j, c)))
    }

    /// Mutable traversal of the stored entries.
    pub fn for_each_stored_mut(&mut self, mut f: impl FnMut(usize, usize, &mut Bound<T>)) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            for (j, c) in row.iter_mut().enumerate() {
                f(i, j, c);
            }
        }
    }

    /// Grow by `m` extra variables, new entries unconstrained.
    pub fn grow(&mut self, m: usize) {
        let old_rows = 2 * self.space_dim;
        self.space_dim += m;
        for i in old_rows..2 * self.space_dim {
            self.rows.push(vec![Bound::PlusInfinity; row_size(i)]);
        }
    }

    /// Drop to `new_space_dim` variables, removing the trailing rows.
    pub fn shrink(&mut self, new_space_dim: usize) {
        debug_assert!(new_space_dim <= self.space_dim);
        self.space_dim = new_space_dim;
        self.rows.truncate(2 * new_space_dim);
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.truncate(row_size(i));
        }
    }

    /// Rebuild through a variable map: `map(k) = Some(new k)` keeps the
    /// variable pair of rows, `None` drops it.
    pub fn remap(&self, new_space_dim: usize, map: impl Fn(usize) -> Option<usize>) -> Self {
        let mut out = OctMatrix::universe(new_space_dim);
        for i in 0..self.space_dim {
            let Some(ni) = map(i) else { continue };
            for j in 0..=i {
                let Some(nj) = map(j) else { continue };
                for (di, dj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let v = self.at(2 * i + di, 2 * j + dj).clone();
                    out.set(2 * ni + di, 2 * nj + dj, v);
                }
            }
        }
        out
    }
}

/// Read-only view of an octagonal matrix.
pub struct OctMatrixView<'a, T: FiniteNumber> {
    matrix: &'a OctMatrix<T>,
}

impl<'a, T: FiniteNumber> OctMatrixView<'a, T> {
    pub fn new(matrix: &'a OctMatrix<T>) -> Self {
        OctMatrixView { matrix }
    }

    pub fn space_dim(&self) -> usize {
        self.matrix.space_dim()
    }

    pub fn at(&self, i: usize, j: usize) -> &Bound<T> {
        self.matrix.at(i, j)
    }

    pub fn iter_stored(&self) -> impl Iterator<Item = (usize, usize, &Bound<T>)> {
        self.matrix.iter_stored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adom_core::Coefficient;

    type M = OctMatrix<Coefficient>;

    fn fin(n: i64) -> Bound<Coefficient> {
        Bound::Finite(Coefficient::from(n))
    }

    #[test]
    fn test_row_sizes() {
        assert_eq!(row_size(0), 2);
        assert_eq!(row_size(1), 2);
        assert_eq!(row_size(2), 4);
        assert_eq!(row_size(5), 6);
    }

    #[test]
    fn test_coherence_resolution() {
        let mut m = M::universe(2);
        // (1, 2) is not stored; it aliases (coh(2), coh(1)) = (3, 0).
        m.set(1, 2, fin(9));
        assert_eq!(*m.at(3, 0), fin(9));
        assert_eq!(*m.at(1, 2), fin(9));
    }

    #[test]
    fn test_stored_count() {
        let m = M::universe(3);
        // Rows 0,1 hold 2 entries each; 2,3 hold 4; 4,5 hold 6.
        assert_eq!(m.iter_stored().count(), 2 * (2 + 4 + 6));
    }

    #[test]
    fn test_grow_shrink() {
        let mut m = M::universe(1);
        m.set(1, 0, fin(4));
        m.grow(1);
        assert_eq!(m.space_dim(), 2);
        assert_eq!(*m.at(1, 0), fin(4));
        assert!(m.at(3, 0).is_plus_infinity());
        m.shrink(1);
        assert_eq!(m.num_rows(), 2);
        assert_eq!(*m.at(1, 0), fin(4));
    }

    #[test]
    fn test_remap_swap_variables() {
        let mut m = M::universe(2);
        m.set(1, 0, fin(4)); // 2·x0 ≤ 4
        let swapped = m.remap(2, |k| Some(1 - k));
        assert_eq!(*swapped.at(3, 2), fin(4)); // 2·x1 ≤ 4
        assert!(swapped.at(1, 0).is_plus_infinity());
    }
}
