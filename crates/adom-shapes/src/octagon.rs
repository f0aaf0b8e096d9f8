//! Octagonal shapes: conjunctions of `±xᵢ ± xⱼ ≤ k` constraints.
//!
//! ## Representation
//!
//! The shape owns a pseudo-triangular [`OctMatrix`] where row/column `2k`
//! stands for `+x_k` and `2k+1` for `−x_k`; entry `(i, j)` upper-bounds
//! `v_j − v_i`. Unary bounds live in the doubled cells: `m[2k+1][2k]`
//! bounds `2·x_k` and `m[2k][2k+1]` bounds `−2·x_k`.
//!
//! ## Closure
//!
//! [`Octagon::strong_closure_assign`] saturates the triangle inequalities
//! (two pseudo-triangular shortest-path passes) and then enforces strong
//! coherence `m[i][j] ≤ (m[i][coh(i)] + m[coh(j)][j]) / 2`. A negative
//! diagonal entry after the shortest-path passes proves emptiness. Closure
//! is logically read-only: it rewrites the owned matrix, which is cache, so
//! it is exposed on `&self` through interior mutability. Unary transfer
//! functions re-establish closure in quadratic time with the incremental
//! variant.
//!
//! For the integer policy, tight coherence additionally detects shapes
//! whose rational points all fall between integer lattice points
//! (an odd unary bound paired with its exact negation).

use std::cell::RefCell;
use std::io::{BufRead, Write};

use num_rational::BigRational;
use num_traits::{Signed, Zero};
use tracing::debug;

use adom_core::{
    Bound, BoundingBox, Coefficient, Congruence, Constraint, ConstraintSystem, DimensionMap,
    DomainError, DomainResult, FiniteNumber, Generator, GeneratorSystem, LinearExpr, Rounding,
    Variable, VariableSet, Watchdog,
};
use adom_lp::{LpProblem, LpStatus, OptimizationMode};

use crate::extract::{extract_octagonal_difference, CellConstraint};
use crate::octmat::{coherent, row_size, OctMatrix, OctMatrixView};
use crate::relations::{
    empty_shape_relation, relation_from_extrema, ConstraintRelation, GeneratorRelation, RelSym,
};
use crate::status::{BitRow, Status};

/// An octagonal shape over the numeric policy `T`.
#[derive(Debug)]
pub struct Octagon<T: FiniteNumber> {
    inner: RefCell<OctInner<T>>,
}

#[derive(Debug, Clone)]
struct OctInner<T: FiniteNumber> {
    space_dim: usize,
    matrix: OctMatrix<T>,
    status: Status,
    /// Non-redundant entry cache, valid while the status says reduced.
    redundancy: Vec<BitRow>,
}

fn rat_half(v: &impl FiniteNumber) -> BigRational {
    v.to_rational() / BigRational::from_integer(Coefficient::from(2))
}

/// Number of non-zero coefficients (capped at 2) and the highest variable
/// index carrying one.
fn analyze_expr(expr: &LinearExpr) -> (usize, usize) {
    let mut t = 0;
    let mut w_id = 0;
    for (v, _) in expr.terms() {
        t += 1;
        w_id = v.index();
        if t == 2 {
            break;
        }
    }
    (t, w_id)
}

impl<T: FiniteNumber> OctInner<T> {
    fn universe(space_dim: usize) -> Self {
        OctInner {
            space_dim,
            matrix: OctMatrix::universe(space_dim),
            status: Status::universe(space_dim),
            redundancy: Vec::new(),
        }
    }

    fn empty(space_dim: usize) -> Self {
        let mut inner = Self::universe(space_dim);
        inner.status.set_empty();
        inner
    }

    fn n_rows(&self) -> usize {
        2 * self.space_dim
    }

    fn marked_empty(&self) -> bool {
        self.status.is_empty()
    }

    fn set_empty(&mut self) {
        self.status.set_empty();
        self.redundancy.clear();
    }

    /// Invalidate every cached property after a matrix change.
    fn matrix_touched(&mut self) {
        self.status.reset_closed();
        self.status.reset_reduced();
        self.redundancy.clear();
    }

    fn min_cell(&mut self, i: usize, j: usize, b: &Bound<T>) {
        self.matrix.min_assign_at(i, j, b);
    }

    /// `m[i][j] := min(m[i][j], num/den)` with Up rounding.
    fn add_cell(&mut self, i: usize, j: usize, num: &Coefficient, den: &Coefficient) {
        let d = Bound::<T>::div_round_up(num, den);
        self.matrix.min_assign_at(i, j, &d);
    }

    // --- closure ---------------------------------------------------------

    fn strong_closure(&mut self) -> DomainResult<()> {
        if self.marked_empty() || self.status.is_closed() || self.space_dim == 0 {
            return Ok(());
        }
        let n = self.n_rows();
        for i in 0..n {
            self.matrix.set(i, i, Bound::zero());
        }

        let mut vec_k: Vec<Bound<T>> = vec![Bound::PlusInfinity; n];
        let mut vec_ck: Vec<Bound<T>> = vec![Bound::PlusInfinity; n];
        // The inner loop only visits the stored half, so the pivot sweep
        // runs twice to let updates flow across the diagonal.
        for _pass in 0..2 {
            for k in (0..n).step_by(2) {
                Watchdog::tick(1)?;
                let ck = k + 1;
                for h in 0..n {
                    vec_k[h] = self.matrix.at(k, h).clone();
                    vec_ck[h] = self.matrix.at(ck, h).clone();
                }
                for i in 0..n {
                    let ci = coherent(i);
                    // m[i][k] == m[ck][ci] and m[i][ck] == m[k][ci].
                    let x_i_k = vec_ck[ci].clone();
                    let x_i_ck = vec_k[ci].clone();
                    if x_i_k.is_plus_infinity() && x_i_ck.is_plus_infinity() {
                        continue;
                    }
                    for j in 0..row_size(i) {
                        let sum1 = x_i_k.add(&vec_k[j], Rounding::Up);
                        let sum2 = x_i_ck.add(&vec_ck[j], Rounding::Up);
                        let best = if sum2 < sum1 { sum2 } else { sum1 };
                        self.matrix.at_mut(i, j).min_assign(&best);
                    }
                }
            }
        }

        // The octagon is empty iff the closure drove a diagonal entry
        // strictly negative.
        for i in 0..n {
            if self.matrix.at(i, i).sgn() < 0 {
                debug!(space_dim = self.space_dim, "strong closure detected emptiness");
                self.set_empty();
                return Ok(());
            }
            self.matrix.set(i, i, Bound::PlusInfinity);
        }

        self.strong_coherence();
        self.status.set_closed();
        self.status.reset_reduced();
        self.redundancy.clear();
        Ok(())
    }

    fn strong_coherence(&mut self) {
        let n = self.n_rows();
        for i in 0..n {
            let x_i_ci = self.matrix.at(i, coherent(i)).clone();
            if x_i_ci.is_plus_infinity() {
                continue;
            }
            for j in 0..row_size(i) {
                if i == j {
                    continue;
                }
                let x_cj_j = self.matrix.at(coherent(j), j).clone();
                if x_cj_j.is_plus_infinity() {
                    continue;
                }
                let semi = x_i_ci.add(&x_cj_j, Rounding::Up).half(Rounding::Up);
                self.matrix.at_mut(i, j).min_assign(&semi);
            }
        }
    }

    /// Re-establish strong closure in Θ(n²) after the constraints on a
    /// single variable changed.
    fn incremental_strong_closure(&mut self, var_id: usize) -> DomainResult<()> {
        if self.marked_empty() || self.status.is_closed() || self.space_dim == 0 {
            return Ok(());
        }
        let n = self.n_rows();
        let v = 2 * var_id;
        let cv = v + 1;
        for i in 0..n {
            self.matrix.set(i, i, Bound::zero());
        }

        // Step 1: improve every constraint involving `var`.
        for k in 0..n {
            Watchdog::tick(1)?;
            for i in 0..n {
                let x_i_k = self.matrix.at(i, k).clone();
                if !x_i_k.is_plus_infinity() {
                    let x_k_v = self.matrix.at(k, v).clone();
                    if !x_k_v.is_plus_infinity() {
                        let sum = x_i_k.add(&x_k_v, Rounding::Up);
                        self.min_cell(i, v, &sum);
                    }
                    let x_k_cv = self.matrix.at(k, cv).clone();
                    if !x_k_cv.is_plus_infinity() {
                        let sum = x_i_k.add(&x_k_cv, Rounding::Up);
                        self.min_cell(i, cv, &sum);
                    }
                }
                let x_k_i = self.matrix.at(k, i).clone();
                if !x_k_i.is_plus_infinity() {
                    let x_v_k = self.matrix.at(v, k).clone();
                    if !x_v_k.is_plus_infinity() {
                        let sum = x_v_k.add(&x_k_i, Rounding::Up);
                        self.min_cell(v, i, &sum);
                    }
                    let x_cv_k = self.matrix.at(cv, k).clone();
                    if !x_cv_k.is_plus_infinity() {
                        let sum = x_cv_k.add(&x_k_i, Rounding::Up);
                        self.min_cell(cv, i, &sum);
                    }
                }
            }
        }

        // Step 2: propagate the sharpened bounds on `var` to every pair.
        for i in 0..n {
            Watchdog::tick(1)?;
            let x_i_v = self.matrix.at(i, v).clone();
            let x_i_cv = self.matrix.at(i, cv).clone();
            for j in 0..n {
                if !x_i_v.is_plus_infinity() {
                    let x_v_j = self.matrix.at(v, j).clone();
                    if !x_v_j.is_plus_infinity() {
                        let sum = x_i_v.add(&x_v_j, Rounding::Up);
                        self.min_cell(i, j, &sum);
                    }
                }
                if !x_i_cv.is_plus_infinity() {
                    let x_cv_j = self.matrix.at(cv, j).clone();
                    if !x_cv_j.is_plus_infinity() {
                        let sum = x_i_cv.add(&x_cv_j, Rounding::Up);
                        self.min_cell(i, j, &sum);
                    }
                }
            }
        }

        for i in 0..n {
            if self.matrix.at(i, i).sgn() < 0 {
                self.set_empty();
                return Ok(());
            }
            self.matrix.set(i, i, Bound::PlusInfinity);
        }
        self.strong_coherence();
        self.status.set_closed();
        self.status.reset_reduced();
        self.redundancy.clear();
        Ok(())
    }

    /// Integer-only: a strongly closed matrix is integer-empty when some
    /// odd unary bound is paired with its exact negation.
    fn tight_coherence_would_make_empty(&self) -> bool {
        debug_assert!(T::IS_INTEGER);
        debug_assert!(self.status.is_closed());
        for i in (0..self.n_rows()).step_by(2) {
            let m_i_ci = self.matrix.at(i, i + 1);
            if let Bound::Finite(v) = m_i_ci {
                if !v.is_even_value() && m_i_ci.is_additive_inverse(self.matrix.at(i + 1, i)) {
                    return true;
                }
            }
        }
        false
    }

    // --- zero-equivalence classes and reduction --------------------------

    /// `successor[j]` is the next index in `j`'s zero-equivalence class.
    fn compute_successors(&self) -> Vec<usize> {
        debug_assert!(!self.marked_empty() && self.status.is_closed());
        let n = self.n_rows();
        let mut successor: Vec<usize> = (0..n).collect();
        for i in (0..n).rev() {
            let ci = coherent(i);
            for j in 0..i {
                let cj = coherent(j);
                if self.matrix.at(ci, cj).is_additive_inverse(self.matrix.at(i, j)) {
                    successor[j] = i;
                }
            }
        }
        successor
    }

    /// `leaders[i]` is the smallest index in `i`'s zero-equivalence class.
    fn compute_leaders(&self) -> Vec<usize> {
        debug_assert!(!self.marked_empty() && self.status.is_closed());
        let n = self.n_rows();
        let mut leaders: Vec<usize> = (0..n).collect();
        for i in 0..n {
            let ci = coherent(i);
            for j in 0..i {
                let cj = coherent(j);
                if self.matrix.at(ci, cj).is_additive_inverse(self.matrix.at(i, j)) {
                    leaders[i] = leaders[j];
                }
            }
        }
        leaders
    }

    /// Leaders of the non-singular classes, plus the singular-class leader
    /// (the class containing both signs of one variable) if any.
    fn leaders_info(&self, successor: &[usize]) -> (Vec<usize>, bool, usize) {
        let n = successor.len();
        let mut dealt_with = vec![false; n];
        let mut no_sing_leaders = Vec::new();
        let mut exist_sing = false;
        let mut sing_leader = 0;
        for i in 0..n {
            let next_i = successor[i];
            if !dealt_with[i] {
                if next_i == coherent(i) {
                    exist_sing = true;
                    sing_leader = i;
                } else {
                    no_sing_leaders.push(i);
                }
            }
            dealt_with[next_i] = true;
        }
        (no_sing_leaders, exist_sing, sing_leader)
    }

    fn nr_set(nr: &mut [BitRow], i: usize, j: usize) {
        if j < row_size(i) {
            nr[i].set(j);
        } else {
            nr[coherent(j)].set(coherent(i));
        }
    }

    /// Bitmask of the entries that cannot be dropped without changing the
    /// shape: the per-class zero cycles plus, for each leader pair, the
    /// bounds not implied by strong coherence or by a two-step path.
    fn non_redundant_matrix_entries(&self) -> Vec<BitRow> {
        debug_assert!(self.space_dim > 0 && !self.marked_empty() && self.status.is_closed());
        let n = self.n_rows();
        let mut nr = vec![BitRow::new(); n];

        let successor = self.compute_successors();
        let (no_sing_leaders, exist_sing, sing_leader) = self.leaders_info(&successor);
        let num_nsl = no_sing_leaders.len();

        for li in 0..num_nsl {
            let i = no_sing_leaders[li];
            let ci = coherent(i);
            if i % 2 == 0 && i != successor[i] {
                // A positive class is connected by one 0-cycle running
                // through its members in increasing order; coherence links
                // the negative class automatically.
                let mut j = i;
                let mut next_j = successor[j];
                while j != next_j {
                    Self::nr_set(&mut nr, next_j, j);
                    j = next_j;
                    next_j = successor[j];
                }
                let cj = coherent(j);
                Self::nr_set(&mut nr, cj, ci);
            }

            let rs_li = if li % 2 != 0 { li } else { li + 1 };
            for lj in 0..=rs_li.min(num_nsl.saturating_sub(1)) {
                let j = no_sing_leaders[lj];
                if j == i {
                    continue;
                }
                let cj = coherent(j);
                let m_i_j = self.matrix.at(i, j);
                let m_i_ci = self.matrix.at(i, ci);
                // Implied by strong coherence?
                if j != ci {
                    let tmp = m_i_ci
                        .add(self.matrix.at(cj, j), Rounding::Up)
                        .half(Rounding::Up);
                    if *m_i_j >= tmp {
                        continue;
                    }
                } else if m_i_j.is_plus_infinity() {
                    continue;
                }
                // Implied by a path of length two through another leader?
                let mut to_add = true;
                for &k in &no_sing_leaders {
                    if k == i || k == j {
                        continue;
                    }
                    let ck = coherent(k);
                    let tmp = if k < j {
                        self.matrix.at(i, k).add(self.matrix.at(cj, ck), Rounding::Up)
                    } else if k < i {
                        self.matrix.at(i, k).add(self.matrix.at(k, j), Rounding::Up)
                    } else {
                        self.matrix.at(ck, ci).add(self.matrix.at(k, j), Rounding::Up)
                    };
                    if *m_i_j >= tmp {
                        to_add = false;
                        break;
                    }
                }
                if to_add {
                    Self::nr_set(&mut nr, i, j);
                }
            }
        }

        // The singular class keeps a single 0-cycle through both signs.
        if exist_sing {
            nr[sing_leader].set(sing_leader + 1);
            if successor[sing_leader + 1] != sing_leader + 1 {
                let mut j = sing_leader;
                let mut next_jj = successor[j + 1];
                while next_jj != j + 1 {
                    Self::nr_set(&mut nr, next_jj, j);
                    j = next_jj;
                    next_jj = successor[j + 1];
                }
                Self::nr_set(&mut nr, j + 1, j);
            } else {
                nr[sing_leader + 1].set(sing_leader);
            }
        }
        nr
    }

    /// Replace every redundant entry with `+∞`. Re-running closure on the
    /// result reproduces the pre-reduction matrix.
    fn strong_reduction(&mut self) -> DomainResult<()> {
        if self.space_dim == 0 {
            return Ok(());
        }
        self.strong_closure()?;
        if self.marked_empty() || self.status.is_reduced() {
            return Ok(());
        }
        let nr = self.non_redundant_matrix_entries();
        self.matrix.for_each_stored_mut(|i, j, cell| {
            if !nr[i].get(j) {
                *cell = Bound::PlusInfinity;
            }
        });
        self.status.reset_closed();
        self.status.set_reduced();
        self.redundancy = nr;
        Ok(())
    }

    // --- forgetting ------------------------------------------------------

    fn forget_all(&mut self, var_id: usize) {
        let n_v = 2 * var_id;
        for j in 0..row_size(n_v) {
            *self.matrix.at_mut(n_v, j) = Bound::PlusInfinity;
            *self.matrix.at_mut(n_v + 1, j) = Bound::PlusInfinity;
        }
        for i in (n_v + 2)..self.n_rows() {
            *self.matrix.at_mut(i, n_v) = Bound::PlusInfinity;
            *self.matrix.at_mut(i, n_v + 1) = Bound::PlusInfinity;
        }
    }

    fn forget_binary(&mut self, var_id: usize) {
        let n_v = 2 * var_id;
        for j in 0..n_v {
            *self.matrix.at_mut(n_v, j) = Bound::PlusInfinity;
            *self.matrix.at_mut(n_v + 1, j) = Bound::PlusInfinity;
        }
        for i in (n_v + 2)..self.n_rows() {
            *self.matrix.at_mut(i, n_v) = Bound::PlusInfinity;
            *self.matrix.at_mut(i, n_v + 1) = Bound::PlusInfinity;
        }
    }

    // --- constraint enumeration -----------------------------------------

    fn constraints_of(&self) -> ConstraintSystem {
        let mut cs = ConstraintSystem::with_space_dimension(self.space_dim);
        if self.space_dim == 0 {
            if self.marked_empty() {
                cs.insert(Constraint::ge_zero(LinearExpr::constant(-1)));
            }
            return cs;
        }
        if self.marked_empty() {
            cs.insert(Constraint::ge_zero(LinearExpr::constant(-1)));
            return cs;
        }

        let push = |cs: &mut ConstraintSystem, e: LinearExpr, eq: bool| {
            if eq {
                cs.insert(Constraint::eq_zero(e));
            } else {
                cs.insert(Constraint::ge_zero(e));
            }
        };

        // Unary constraints.
        for k in 0..self.space_dim {
            let i = 2 * k;
            let x = Variable::new(k);
            let c_i_ii = self.matrix.at(i, i + 1); // bounds −2x
            let c_ii_i = self.matrix.at(i + 1, i); // bounds +2x
            if c_i_ii.is_additive_inverse(c_ii_i) {
                if let Bound::Finite(v) = c_ii_i {
                    let (num, den) = v.numer_denom();
                    // 2·den·x == num
                    let mut e = LinearExpr::constant(-num);
                    e.add_mul_assign(den * Coefficient::from(2), x);
                    push(&mut cs, e, true);
                }
            } else {
                if let Bound::Finite(v) = c_i_ii {
                    let (num, den) = v.numer_denom();
                    // −2·den·x ≤ num
                    let mut e = LinearExpr::constant(num);
                    e.add_mul_assign(den * Coefficient::from(2), x);
                    push(&mut cs, e, false);
                }
                if let Bound::Finite(v) = c_ii_i {
                    let (num, den) = v.numer_denom();
                    // 2·den·x ≤ num
                    let mut e = LinearExpr::constant(num);
                    e.add_mul_assign(den * Coefficient::from(-2), x);
                    push(&mut cs, e, false);
                }
            }
        }

        // Binary constraints.
        for yk in 0..self.space_dim {
            let i = 2 * yk;
            let y = Variable::new(yk);
            for xk in 0..yk {
                let j = 2 * xk;
                let x = Variable::new(xk);

                // Differences: m[i][j] bounds x − y, m[i+1][j+1] bounds y − x.
                let c_i_j = self.matrix.at(i, j);
                let c_ii_jj = self.matrix.at(i + 1, j + 1);
                if c_ii_jj.is_additive_inverse(c_i_j) {
                    if let Bound::Finite(v) = c_i_j {
                        let (num, den) = v.numer_denom();
                        // den·x − den·y == num
                        let mut e = LinearExpr::constant(-num);
                        e.add_mul_assign(den.clone(), x);
                        e.add_mul_assign(-den, y);
                        push(&mut cs, e, true);
                    }
                } else {
                    if let Bound::Finite(v) = c_i_j {
                        let (num, den) = v.numer_denom();
                        // den·x − den·y ≤ num
                        let mut e = LinearExpr::constant(num);
                        e.add_mul_assign(-den.clone(), x);
                        e.add_mul_assign(den, y);
                        push(&mut cs, e, false);
                    }
                    if let Bound::Finite(v) = c_ii_jj {
                        let (num, den) = v.numer_denom();
                        // den·y − den·x ≤ num
                        let mut e = LinearExpr::constant(num);
                        e.add_mul_assign(den.clone(), x);
                        e.add_mul_assign(-den, y);
                        push(&mut cs, e, false);
                    }
                }

                // Sums: m[i+1][j] bounds x + y, m[i][j+1] bounds −x − y.
                let c_ii_j = self.matrix.at(i + 1, j);
                let c_i_jj = self.matrix.at(i, j + 1);
                if c_i_jj.is_additive_inverse(c_ii_j) {
                    if let Bound::Finite(v) = c_ii_j {
                        let (num, den) = v.numer_denom();
                        // den·x + den·y == num
                        let mut e = LinearExpr::constant(-num);
                        e.add_mul_assign(den.clone(), x);
                        e.add_mul_assign(den, y);
                        push(&mut cs, e, true);
                    }
                } else {
                    if let Bound::Finite(v) = c_i_jj {
                        let (num, den) = v.numer_denom();
                        // −den·x − den·y ≤ num
                        let mut e = LinearExpr::constant(num);
                        e.add_mul_assign(den.clone(), x);
                        e.add_mul_assign(den, y);
                        push(&mut cs, e, false);
                    }
                    if let Bound::Finite(v) = c_ii_j {
                        let (num, den) = v.numer_denom();
                        // den·x + den·y ≤ num
                        let mut e = LinearExpr::constant(num);
                        e.add_mul_assign(-den.clone(), x);
                        e.add_mul_assign(-den, y);
                        push(&mut cs, e, false);
                    }
                }
            }
        }
        cs
    }

    /// Tighten the cell selected by an extracted constraint; returns
    /// whether anything changed.
    fn refine_with_cell(&mut self, cell: &CellConstraint, is_equality: bool) -> bool {
        let coeff_abs = cell.coeff.abs();
        let mut changed = false;
        let d = Bound::<T>::div_round_up(&cell.term, &coeff_abs);
        if *self.matrix.at(cell.i, cell.j) > d {
            self.matrix.set(cell.i, cell.j, d);
            changed = true;
        }
        if is_equality {
            let neg_term = -cell.term.clone();
            let d2 = Bound::<T>::div_round_up(&neg_term, &coeff_abs);
            let (ci, cj) = (coherent(cell.i), coherent(cell.j));
            if *self.matrix.at(ci, cj) > d2 {
                self.matrix.set(ci, cj, d2);
                changed = true;
            }
        }
        changed
    }

    fn refine_lenient(&mut self, c: &Constraint) {
        if self.marked_empty() {
            return;
        }
        let Some(cell) = extract_octagonal_difference(c, self.space_dim) else {
            // Not an octagonal difference: must be ignored, never tightened.
            return;
        };
        if cell.num_vars == 0 {
            let b = c.inhomogeneous_term();
            if b.is_negative()
                || (c.is_equality() && !b.is_zero())
                || (c.is_strict_inequality() && b.is_zero())
            {
                self.set_empty();
            }
            return;
        }
        // A non-trivial strict inequality is relaxed to its closure.
        if self.refine_with_cell(&cell, c.is_equality()) {
            self.matrix_touched();
        }
    }

    // --- affine machinery -----------------------------------------------

    /// Upper approximation of `±sc_expr` over the closed matrix, scanning
    /// variables `0 ..= w_id`. Returns the accumulated finite part, the
    /// number of unbounded variables found (capped at 2) and the index of
    /// the last one.
    fn approximate_side(
        &self,
        sc_expr: &LinearExpr,
        sc_b: &Coefficient,
        w_id: usize,
        positive: bool,
    ) -> (T, usize, usize) {
        let mut sum = T::from_coefficient(sc_b);
        let mut pinf_count = 0;
        let mut pinf_index = 0;
        for id in 0..=w_id {
            let sc_i = sc_expr.coefficient(Variable::new(id));
            let sign = sc_i.signum();
            if sign.is_zero() {
                continue;
            }
            let use_upper = sign.is_positive() == positive;
            let cell = if use_upper {
                self.matrix.at(2 * id + 1, 2 * id)
            } else {
                self.matrix.at(2 * id, 2 * id + 1)
            };
            match cell {
                Bound::Finite(double_bound) => {
                    let half = double_bound.half(Rounding::Up).0;
                    let coeff = T::from_coefficient(&sc_i.abs());
                    sum = sum.add(&coeff.mul(&half));
                }
                Bound::PlusInfinity => {
                    pinf_count += 1;
                    pinf_index = id;
                    if pinf_count > 1 {
                        break;
                    }
                }
            }
        }
        (sum, pinf_count, pinf_index)
    }

    fn finish_div(sum: T, sc_den: &Coefficient) -> T {
        if *sc_den == Coefficient::from(1) {
            sum
        } else {
            sum.div_coeff(sc_den, Rounding::Up).0
        }
    }

    /// From a fresh upper bound `v ≤ ub_v` (computed from `sc_expr/sc_den`)
    /// propagate bounds of the form `v − u ≤ …` and `v + u ≤ …`.
    fn deduce_v_pm_u_bounds(
        &mut self,
        v_id: usize,
        last_id: usize,
        sc_expr: &LinearExpr,
        sc_den: &Coefficient,
        ub_v: &T,
    ) {
        let n_v = 2 * v_id;
        for u_id in (0..=last_id).rev() {
            if u_id == v_id {
                continue;
            }
            let expr_u = sc_expr.coefficient(Variable::new(u_id));
            if expr_u.is_zero() {
                continue;
            }
            let n_u = 2 * u_id;
            if expr_u.is_positive() {
                if expr_u >= *sc_den {
                    // q ≥ 1: v − u ≤ ub_v − ub_u.
                    if let Bound::Finite(double_ub) = self.matrix.at(n_u + 1, n_u).clone() {
                        let half = double_ub.half(Rounding::Up).0;
                        let val = ub_v.sub(&half);
                        self.min_cell(n_u, n_v, &Bound::Finite(val));
                    }
                } else {
                    // 0 < q < 1: v − u ≤ ub_v − (q·ub_u + (1−q)·lb_u).
                    let lo = self.matrix.at(n_u, n_u + 1).clone();
                    let hi = self.matrix.at(n_u + 1, n_u).clone();
                    if let (Bound::Finite(lo), Bound::Finite(hi)) = (lo, hi) {
                        let minus_lb_u = rat_half(&lo);
                        let ub_u = rat_half(&hi);
                        let q = BigRational::new(expr_u, sc_den.clone());
                        let val = &minus_lb_u - &q * (&ub_u + &minus_lb_u);
                        let up = T::from_rational(&val, Rounding::Up).0;
                        self.min_cell(n_u, n_v, &Bound::Finite(ub_v.add(&up)));
                    }
                }
            } else {
                let minus_expr_u = -expr_u.clone();
                if minus_expr_u >= *sc_den {
                    // q ≤ −1: v + u ≤ ub_v + lb_u.
                    if let Bound::Finite(double_lo) = self.matrix.at(n_u, n_u + 1).clone() {
                        let half = double_lo.half(Rounding::Up).0;
                        let val = ub_v.sub(&half);
                        self.min_cell(n_u + 1, n_v, &Bound::Finite(val));
                    }
                } else {
                    // −1 < q < 0: v + u ≤ ub_v + ((−q)·lb_u + (1+q)·ub_u).
                    let lo = self.matrix.at(n_u, n_u + 1).clone();
                    let hi = self.matrix.at(n_u + 1, n_u).clone();
                    if let (Bound::Finite(lo), Bound::Finite(hi)) = (lo, hi) {
                        let ub_u = rat_half(&hi);
                        let lb_u = -rat_half(&lo);
                        let minus_q = BigRational::new(minus_expr_u, sc_den.clone());
                        let val = &ub_u + &minus_q * (&lb_u - &ub_u);
                        let up = T::from_rational(&val, Rounding::Up).0;
                        self.min_cell(n_u + 1, n_v, &Bound::Finite(ub_v.add(&up)));
                    }
                }
            }
        }
    }

    /// From a fresh lower bound `−v ≤ minus_lb_v` propagate bounds of the
    /// form `u − v ≤ …` and `−v − u ≤ …`.
    fn deduce_minus_v_pm_u_bounds(
        &mut self,
        v_id: usize,
        last_id: usize,
        sc_expr: &LinearExpr,
        sc_den: &Coefficient,
        minus_lb_v: &T,
    ) {
        let n_v = 2 * v_id;
        for u_id in (0..=last_id).rev() {
            if u_id == v_id {
                continue;
            }
            let expr_u = sc_expr.coefficient(Variable::new(u_id));
            if expr_u.is_zero() {
                continue;
            }
            let n_u = 2 * u_id;
            if expr_u.is_positive() {
                if expr_u >= *sc_den {
                    // q ≥ 1: u − v ≤ (−lb_v) − (−lb_u).
                    if let Bound::Finite(double_lo) = self.matrix.at(n_u, n_u + 1).clone() {
                        let half = double_lo.half(Rounding::Up).0;
                        let val = minus_lb_v.sub(&half);
                        self.min_cell(n_v, n_u, &Bound::Finite(val));
                    }
                } else {
                    // 0 < q < 1: u − v ≤ (−lb_v) + (q·lb_u + (1−q)·ub_u)·(−1).
                    let lo = self.matrix.at(n_u, n_u + 1).clone();
                    let hi = self.matrix.at(n_u + 1, n_u).clone();
                    if let (Bound::Finite(lo), Bound::Finite(hi)) = (lo, hi) {
                        let minus_lb_u = rat_half(&lo);
                        let ub_u = rat_half(&hi);
                        let q = BigRational::new(expr_u, sc_den.clone());
                        let val = &ub_u - &q * (&ub_u + &minus_lb_u);
                        let up = T::from_rational(&val, Rounding::Up).0;
                        self.min_cell(n_v, n_u, &Bound::Finite(minus_lb_v.add(&up)));
                    }
                }
            } else {
                let minus_expr_u = -expr_u.clone();
                if minus_expr_u >= *sc_den {
                    // q ≤ −1: −v − u ≤ (−lb_v) − ub_u.
                    if let Bound::Finite(double_ub) = self.matrix.at(n_u + 1, n_u).clone() {
                        let half = double_ub.half(Rounding::Up).0;
                        let val = minus_lb_v.sub(&half);
                        self.min_cell(n_v, n_u + 1, &Bound::Finite(val));
                    }
                } else {
                    // −1 < q < 0: −v − u ≤ (−lb_v) + (−lb_u + q·(ub_u − lb_u)).
                    let lo = self.matrix.at(n_u, n_u + 1).clone();
                    let hi = self.matrix.at(n_u + 1, n_u).clone();
                    if let (Bound::Finite(lo), Bound::Finite(hi)) = (lo, hi) {
                        let minus_lb_u = rat_half(&lo);
                        let ub_u = rat_half(&hi);
                        let q = BigRational::new(expr_u, sc_den.clone());
                        let val = &minus_lb_u + &q * (&ub_u + &minus_lb_u);
                        let up = T::from_rational(&val, Rounding::Up).0;
                        self.min_cell(n_v, n_u + 1, &Bound::Finite(minus_lb_v.add(&up)));
                    }
                }
            }
        }
    }

    /// Conservatively add `var ⋈ expr/den` to the shape, never forgetting.
    /// The caller guarantees `den ≠ 0` and that `expr` does not mention
    /// `var`; non-representable parts are over-approximated.
    fn refine(&mut self, var_id: usize, relsym: RelSym, expr: &LinearExpr, den: &Coefficient) {
        debug_assert!(!den.is_zero());
        debug_assert!(expr.coefficient(Variable::new(var_id)).is_zero());
        let (mut t, w_id) = analyze_expr(expr);
        let b = expr.inhomogeneous_term().clone();
        let minus_den = -den.clone();
        let n_var = 2 * var_id;

        if t == 1 {
            let w_coeff = expr.coefficient(Variable::new(w_id));
            if w_coeff != *den && w_coeff != minus_den {
                t = 2;
            }
        }

        match t {
            0 => {
                let two_b = &b * Coefficient::from(2);
                match relsym {
                    RelSym::Equal => {
                        self.add_cell(n_var + 1, n_var, &two_b, den);
                        self.add_cell(n_var, n_var + 1, &two_b, &minus_den);
                    }
                    RelSym::LessOrEqual => self.add_cell(n_var + 1, n_var, &two_b, den),
                    RelSym::GreaterOrEqual => self.add_cell(n_var, n_var + 1, &two_b, &minus_den),
                }
                self.matrix_touched();
            }
            1 => {
                let w_coeff = expr.coefficient(Variable::new(w_id));
                let n_w = 2 * w_id;
                let positive = w_coeff == *den;
                match relsym {
                    RelSym::Equal => {
                        if positive {
                            self.add_cell(n_w, n_var, &b, den);
                            self.add_cell(n_var, n_w, &b, &minus_den);
                        } else {
                            self.add_cell(n_w + 1, n_var, &b, den);
                            self.add_cell(n_var, n_w + 1, &b, &minus_den);
                        }
                    }
                    RelSym::LessOrEqual => {
                        if positive {
                            self.add_cell(n_w, n_var, &b, den);
                        } else {
                            self.add_cell(n_w + 1, n_var, &b, den);
                        }
                    }
                    RelSym::GreaterOrEqual => {
                        if positive {
                            self.add_cell(n_var, n_w, &b, &minus_den);
                        } else {
                            self.add_cell(n_var, n_w + 1, &b, &minus_den);
                        }
                    }
                }
                self.matrix_touched();
            }
            _ => {
                let is_sc = den.is_positive();
                let sc_b = if is_sc { b.clone() } else { -b.clone() };
                let minus_sc_b = -sc_b.clone();
                let sc_den = den.abs();
                let sc_expr = if is_sc { expr.clone() } else { -expr.clone() };

                let upper = relsym != RelSym::GreaterOrEqual;
                let lower = relsym != RelSym::LessOrEqual;

                if upper {
                    let (sum, cnt, idx) = self.approximate_side(&sc_expr, &sc_b, w_id, true);
                    if cnt <= 1 {
                        self.matrix_touched();
                        let sum = Self::finish_div(sum, &sc_den);
                        if cnt == 0 {
                            self.min_cell(n_var + 1, n_var, &Bound::Finite(sum.double()));
                            self.deduce_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
                        } else if idx != var_id {
                            let ppi = sc_expr.coefficient(Variable::new(idx));
                            if ppi == sc_den {
                                self.min_cell(2 * idx, n_var, &Bound::Finite(sum));
                            } else if ppi == -sc_den.clone() {
                                self.min_cell(2 * idx + 1, n_var, &Bound::Finite(sum));
                            }
                        }
                    }
                }
                if lower {
                    let (sum, cnt, idx) = self.approximate_side(&sc_expr, &minus_sc_b, w_id, false);
                    if cnt <= 1 {
                        self.matrix_touched();
                        let sum = Self::finish_div(sum, &sc_den);
                        if cnt == 0 {
                            self.min_cell(n_var, n_var + 1, &Bound::Finite(sum.double()));
                            self.deduce_minus_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
                        } else if idx != var_id {
                            let npi = sc_expr.coefficient(Variable::new(idx));
                            if npi == sc_den {
                                self.min_cell(n_var, 2 * idx, &Bound::Finite(sum));
                            } else if npi == -sc_den.clone() {
                                self.min_cell(n_var, 2 * idx + 1, &Bound::Finite(sum));
                            }
                        }
                    }
                }
            }
        }
    }

    /// The affine image `var ← expr/den`, all three regimes.
    fn affine_image(
        &mut self,
        var_id: usize,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        self.strong_closure()?;
        if self.marked_empty() {
            return Ok(());
        }
        let (t, w_id) = analyze_expr(expr);
        let b = expr.inhomogeneous_term().clone();
        let minus_den = -den.clone();
        let n_var = 2 * var_id;

        if t == 0 {
            // var ← b/den: forget, then pin both unary bounds.
            self.forget_all(var_id);
            let two_b = &b * Coefficient::from(2);
            self.matrix
                .set(n_var + 1, n_var, Bound::div_round_up(&two_b, den));
            self.matrix
                .set(n_var, n_var + 1, Bound::div_round_up(&two_b, &minus_den));
            self.matrix_touched();
            return Ok(());
        }

        if t == 1 {
            let w_coeff = expr.coefficient(Variable::new(w_id));
            if w_coeff == *den || w_coeff == minus_den {
                if w_id == var_id {
                    if w_coeff == *den {
                        if b.is_zero() {
                            // Identity.
                            return Ok(());
                        }
                        // var ← var + b/den: translate every row touching var.
                        let d: Bound<T> = Bound::div_round_up(&b, den);
                        let md: Bound<T> = Bound::div_round_up(&b, &minus_den);
                        for j in 0..n_var {
                            let v = self.matrix.at(n_var, j).add(&md, Rounding::Up);
                            self.matrix.set(n_var, j, v);
                            let v = self.matrix.at(n_var + 1, j).add(&d, Rounding::Up);
                            self.matrix.set(n_var + 1, j, v);
                        }
                        for i in (n_var + 2)..self.n_rows() {
                            let v = self.matrix.at(i, n_var).add(&d, Rounding::Up);
                            self.matrix.set(i, n_var, v);
                            let v = self.matrix.at(i, n_var + 1).add(&md, Rounding::Up);
                            self.matrix.set(i, n_var + 1, v);
                        }
                        let dd = d.double();
                        let mdd = md.double();
                        let v = self.matrix.at(n_var + 1, n_var).add(&dd, Rounding::Up);
                        self.matrix.set(n_var + 1, n_var, v);
                        let v = self.matrix.at(n_var, n_var + 1).add(&mdd, Rounding::Up);
                        self.matrix.set(n_var, n_var + 1, v);
                        self.matrix_touched();
                    } else {
                        // var ← −var + b/den: swap the unary pair, translate.
                        self.forget_binary(var_id);
                        let lo = self.matrix.at(n_var, n_var + 1).clone();
                        let hi = self.matrix.at(n_var + 1, n_var).clone();
                        self.matrix.set(n_var, n_var + 1, hi);
                        self.matrix.set(n_var + 1, n_var, lo);
                        self.matrix_touched();
                        if !b.is_zero() {
                            let dd = Bound::<T>::div_round_up(&b, den).double();
                            let mdd = Bound::<T>::div_round_up(&b, &minus_den).double();
                            let v = self.matrix.at(n_var + 1, n_var).add(&dd, Rounding::Up);
                            self.matrix.set(n_var + 1, n_var, v);
                            let v = self.matrix.at(n_var, n_var + 1).add(&mdd, Rounding::Up);
                            self.matrix.set(n_var, n_var + 1, v);
                        }
                        self.incremental_strong_closure(var_id)?;
                    }
                } else {
                    // var ← ±w + b/den: forget var, add the exact relation.
                    self.forget_all(var_id);
                    let n_w = 2 * w_id;
                    if w_coeff == *den {
                        self.add_cell(n_w, n_var, &b, den);
                        self.add_cell(n_var, n_w, &b, &minus_den);
                    } else {
                        self.add_cell(n_w + 1, n_var, &b, den);
                        self.add_cell(n_var, n_w + 1, &b, &minus_den);
                    }
                    self.matrix_touched();
                    self.incremental_strong_closure(var_id)?;
                }
                return Ok(());
            }
        }

        // General case: evaluate expr over the closed shape.
        let is_sc = den.is_positive();
        let sc_b = if is_sc { b.clone() } else { -b.clone() };
        let minus_sc_b = -sc_b.clone();
        let sc_den = den.abs();
        let sc_expr = if is_sc { expr.clone() } else { -expr.clone() };

        let (pos_sum, pos_cnt, pos_idx) = self.approximate_side(&sc_expr, &sc_b, w_id, true);
        let (neg_sum, neg_cnt, neg_idx) = self.approximate_side(&sc_expr, &minus_sc_b, w_id, false);

        self.forget_all(var_id);
        if pos_cnt > 1 && neg_cnt > 1 {
            // No approximation at all: var stays unconstrained.
            return Ok(());
        }
        self.matrix_touched();

        if pos_cnt <= 1 {
            let sum = Self::finish_div(pos_sum, &sc_den);
            if pos_cnt == 0 {
                self.matrix.set(n_var + 1, n_var, Bound::Finite(sum.double()));
                self.deduce_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
            } else if pos_idx != var_id {
                let ppi = sc_expr.coefficient(Variable::new(pos_idx));
                if ppi == sc_den {
                    self.matrix.set(2 * pos_idx, n_var, Bound::Finite(sum));
                } else if ppi == -sc_den.clone() {
                    self.matrix.set(2 * pos_idx + 1, n_var, Bound::Finite(sum));
                }
            }
        }

        if neg_cnt <= 1 {
            let sum = Self::finish_div(neg_sum, &sc_den);
            if neg_cnt == 0 {
                self.matrix.set(n_var, n_var + 1, Bound::Finite(sum.double()));
                self.deduce_minus_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
            } else if neg_idx != var_id {
                let npi = sc_expr.coefficient(Variable::new(neg_idx));
                if npi == sc_den {
                    self.matrix.set(n_var, 2 * neg_idx, Bound::Finite(sum));
                } else if npi == -sc_den.clone() {
                    self.matrix.set(n_var, 2 * neg_idx + 1, Bound::Finite(sum));
                }
            }
        }

        self.incremental_strong_closure(var_id)
    }

    /// One-sided affine image `var ⋈ expr/den` for `⋈ ∈ {≤, ≥}`.
    fn generalized_affine_image(
        &mut self,
        var_id: usize,
        relsym: RelSym,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        debug_assert!(relsym != RelSym::Equal);
        self.strong_closure()?;
        if self.marked_empty() {
            return Ok(());
        }
        let (t, w_id) = analyze_expr(expr);
        let b = expr.inhomogeneous_term().clone();
        let minus_den = -den.clone();
        let n_var = 2 * var_id;

        if t == 0 {
            self.forget_all(var_id);
            let two_b = &b * Coefficient::from(2);
            match relsym {
                RelSym::LessOrEqual => {
                    self.matrix
                        .set(n_var + 1, n_var, Bound::div_round_up(&two_b, den));
                }
                RelSym::GreaterOrEqual => {
                    self.matrix
                        .set(n_var, n_var + 1, Bound::div_round_up(&two_b, &minus_den));
                }
                RelSym::Equal => unreachable!(),
            }
            self.matrix_touched();
            return Ok(());
        }

        if t == 1 && w_id != var_id {
            let w_coeff = expr.coefficient(Variable::new(w_id));
            if w_coeff == *den || w_coeff == minus_den {
                self.forget_all(var_id);
                let n_w = 2 * w_id;
                let positive = w_coeff == *den;
                match relsym {
                    RelSym::LessOrEqual => {
                        if positive {
                            self.add_cell(n_w, n_var, &b, den);
                        } else {
                            self.add_cell(n_w + 1, n_var, &b, den);
                        }
                    }
                    RelSym::GreaterOrEqual => {
                        if positive {
                            self.add_cell(n_var, n_w, &b, &minus_den);
                        } else {
                            self.add_cell(n_var, n_w + 1, &b, &minus_den);
                        }
                    }
                    RelSym::Equal => unreachable!(),
                }
                self.matrix_touched();
                return self.incremental_strong_closure(var_id);
            }
        }

        // General case, recording only the requested side.
        let is_sc = den.is_positive();
        let sc_b = if is_sc { b.clone() } else { -b.clone() };
        let minus_sc_b = -sc_b.clone();
        let sc_den = den.abs();
        let sc_expr = if is_sc { expr.clone() } else { -expr.clone() };
        // A negative denominator flips the requested side.
        let effective = if is_sc { relsym } else { relsym.mirrored() };

        match effective {
            RelSym::LessOrEqual => {
                let (sum, cnt, idx) = self.approximate_side(&sc_expr, &sc_b, w_id, true);
                self.forget_all(var_id);
                if cnt > 1 {
                    return Ok(());
                }
                self.matrix_touched();
                let sum = Self::finish_div(sum, &sc_den);
                if cnt == 0 {
                    self.matrix.set(n_var + 1, n_var, Bound::Finite(sum.double()));
                    self.deduce_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
                } else if idx != var_id {
                    let ppi = sc_expr.coefficient(Variable::new(idx));
                    if ppi == sc_den {
                        self.matrix.set(2 * idx, n_var, Bound::Finite(sum));
                    } else if ppi == -sc_den.clone() {
                        self.matrix.set(2 * idx + 1, n_var, Bound::Finite(sum));
                    }
                }
            }
            RelSym::GreaterOrEqual => {
                let (sum, cnt, idx) = self.approximate_side(&sc_expr, &minus_sc_b, w_id, false);
                self.forget_all(var_id);
                if cnt > 1 {
                    return Ok(());
                }
                self.matrix_touched();
                let sum = Self::finish_div(sum, &sc_den);
                if cnt == 0 {
                    self.matrix.set(n_var, n_var + 1, Bound::Finite(sum.double()));
                    self.deduce_minus_v_pm_u_bounds(var_id, w_id, &sc_expr, &sc_den, &sum);
                } else if idx != var_id {
                    let npi = sc_expr.coefficient(Variable::new(idx));
                    if npi == sc_den {
                        self.matrix.set(n_var, 2 * idx, Bound::Finite(sum));
                    } else if npi == -sc_den.clone() {
                        self.matrix.set(n_var, 2 * idx + 1, Bound::Finite(sum));
                    }
                }
            }
            RelSym::Equal => unreachable!(),
        }
        self.incremental_strong_closure(var_id)
    }

    /// Exact extrema of `expr` over the shape, dispatching non-octagonal
    /// expressions to the LP solver.
    fn max_min(
        &mut self,
        expr: &LinearExpr,
        maximize: bool,
    ) -> DomainResult<Option<(Coefficient, Coefficient, bool)>> {
        if self.space_dim == 0 {
            if self.marked_empty() {
                return Ok(None);
            }
            return Ok(Some((
                expr.inhomogeneous_term().clone(),
                Coefficient::from(1),
                true,
            )));
        }
        self.strong_closure()?;
        if self.marked_empty() {
            return Ok(None);
        }

        let zero = LinearExpr::new();
        let probe = if maximize {
            Constraint::le(expr.clone(), zero)
        } else {
            Constraint::ge(expr.clone(), zero)
        };
        match extract_octagonal_difference(&probe, self.space_dim) {
            Some(cell) => {
                if cell.num_vars == 0 {
                    return Ok(Some((
                        expr.inhomogeneous_term().clone(),
                        Coefficient::from(1),
                        true,
                    )));
                }
                let bound = self.matrix.at(cell.i, cell.j).clone();
                let Bound::Finite(bv) = bound else {
                    return Ok(None);
                };
                let b = expr.inhomogeneous_term();
                let sc_b = if maximize { b.clone() } else { -b.clone() };
                let coeff_abs = expr.coefficient(Variable::new(cell.i / 2)).abs();
                let coeff_t = T::from_coefficient(&coeff_abs);
                let mut d = T::from_coefficient(&sc_b);
                if cell.num_vars == 1 {
                    let half = bv.half(Rounding::Up).0;
                    d = d.add(&coeff_t.mul(&half));
                } else {
                    d = d.add(&coeff_t.mul(&bv));
                }
                let (mut num, den) = d.numer_denom();
                if !maximize {
                    num = -num;
                }
                Ok(Some((num, den, true)))
            }
            None => {
                // Not an octagonal difference: ask the simplex.
                let cs = self.constraints_of();
                let mode = if maximize {
                    OptimizationMode::Maximization
                } else {
                    OptimizationMode::Minimization
                };
                let mut lp = LpProblem::from_parts(self.space_dim, cs, expr.clone(), mode)?;
                if lp.solve()? == LpStatus::Optimized {
                    let (num, den) = lp.optimal_value()?;
                    Ok(Some((num, den, true)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn is_universe_matrix(&self) -> bool {
        self.matrix.iter_stored().all(|(_, _, c)| c.is_plus_infinity())
    }
}

impl<T: FiniteNumber> Clone for Octagon<T> {
    fn clone(&self) -> Self {
        Octagon {
            inner: RefCell::new(self.inner.borrow().clone()),
        }
    }
}

impl<T: FiniteNumber> PartialEq for Octagon<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.space_dimension() != other.space_dimension() {
            return false;
        }
        let _ = self.strong_closure_assign();
        let _ = other.strong_closure_assign();
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        match (a.marked_empty(), b.marked_empty()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => a.space_dim == 0 || a.matrix == b.matrix,
        }
    }
}

impl<T: FiniteNumber> Octagon<T> {
    fn wrap(inner: OctInner<T>) -> Self {
        Octagon {
            inner: RefCell::new(inner),
        }
    }

    fn dim_check(&self, required: usize, op: &'static str) -> DomainResult<()> {
        let dim = self.space_dimension();
        if required > dim {
            return Err(DomainError::DimensionIncompatible {
                op,
                this_dim: dim,
                required_dim: required,
            });
        }
        Ok(())
    }

    // --- construction ----------------------------------------------------

    /// The universe octagon of the given dimension.
    pub fn universe(space_dim: usize) -> Self {
        Self::wrap(OctInner::universe(space_dim))
    }

    /// The empty octagon of the given dimension.
    pub fn empty(space_dim: usize) -> Self {
        Self::wrap(OctInner::empty(space_dim))
    }

    /// The smallest octagon containing the set described by `cs`.
    ///
    /// Non-octagonal constraints are safely ignored, strict inequalities
    /// are relaxed to their closures.
    pub fn from_constraints(cs: &ConstraintSystem) -> Self {
        let mut inner = OctInner::universe(cs.space_dimension());
        for c in cs {
            inner.refine_lenient(c);
        }
        Self::wrap(inner)
    }

    /// The smallest octagon containing the points generated by `gs`.
    pub fn from_generators(gs: &GeneratorSystem) -> DomainResult<Self> {
        let dim = gs.space_dimension();
        if gs.is_empty() {
            return Ok(Self::empty(dim));
        }
        if !gs.has_points() {
            return Err(DomainError::NoPointGenerator { op: "Octagon::from_generators(gs)" });
        }
        let mut inner = OctInner::universe(dim);
        let mut first_point = true;

        // Points and closure points: per-cell maxima of the octagonal
        // gradients through each point.
        for g in gs {
            if !g.is_point_or_closure_point() {
                continue;
            }
            let d = g.divisor();
            for i in 0..dim {
                let g_i = g.coefficient(Variable::new(i));
                let di = 2 * i;
                let mut write = |mat: &mut OctMatrix<T>, r: usize, c: usize, num: Coefficient| {
                    let v = Bound::<T>::div_round_up(&num, d);
                    if first_point {
                        mat.set(r, c, v);
                    } else {
                        mat.at_mut(r, c).max_assign(&v);
                    }
                };
                for j in 0..i {
                    let g_j = g.coefficient(Variable::new(j));
                    let dj = 2 * j;
                    write(&mut inner.matrix, di, dj, &g_j - &g_i);
                    write(&mut inner.matrix, di + 1, dj + 1, &g_i - &g_j);
                    write(&mut inner.matrix, di, dj + 1, -(&g_j) - &g_i);
                    write(&mut inner.matrix, di + 1, dj, &g_i + &g_j);
                }
                write(&mut inner.matrix, di, di + 1, -(&g_i) - &g_i);
                write(&mut inner.matrix, di + 1, di, &g_i + &g_i);
            }
            first_point = false;
        }

        // Rays and lines relax the bounds their direction can grow.
        for g in gs {
            if g.is_line() {
                for i in 0..dim {
                    let g_i = g.coefficient(Variable::new(i));
                    let di = 2 * i;
                    for j in 0..i {
                        let g_j = g.coefficient(Variable::new(j));
                        let dj = 2 * j;
                        if g_i != g_j {
                            inner.matrix.set(di, dj, Bound::PlusInfinity);
                            inner.matrix.set(di + 1, dj + 1, Bound::PlusInfinity);
                        }
                        if g_i != -(&g_j) {
                            inner.matrix.set(di, dj + 1, Bound::PlusInfinity);
                            inner.matrix.set(di + 1, dj, Bound::PlusInfinity);
                        }
                    }
                    if !g_i.is_zero() {
                        inner.matrix.set(di, di + 1, Bound::PlusInfinity);
                        inner.matrix.set(di + 1, di, Bound::PlusInfinity);
                    }
                }
            } else if g.is_ray() {
                for i in 0..dim {
                    let g_i = g.coefficient(Variable::new(i));
                    let di = 2 * i;
                    for j in 0..i {
                        let g_j = g.coefficient(Variable::new(j));
                        let dj = 2 * j;
                        if g_i < g_j {
                            inner.matrix.set(di, dj, Bound::PlusInfinity);
                        }
                        if g_i > g_j {
                            inner.matrix.set(di + 1, dj + 1, Bound::PlusInfinity);
                        }
                        if g_i < -(&g_j) {
                            inner.matrix.set(di, dj + 1, Bound::PlusInfinity);
                        }
                        if g_i > -(&g_j) {
                            inner.matrix.set(di + 1, dj, Bound::PlusInfinity);
                        }
                    }
                    if g_i.is_negative() {
                        inner.matrix.set(di, di + 1, Bound::PlusInfinity);
                    }
                    if g_i.is_positive() {
                        inner.matrix.set(di + 1, di, Bound::PlusInfinity);
                    }
                }
            }
        }
        inner.status.set_closed();
        Ok(Self::wrap(inner))
    }

    /// The smallest octagon containing a rational box. Open bounds are
    /// relaxed to their closures.
    pub fn from_box(bbox: &BoundingBox) -> Self {
        let dim = bbox.space_dimension();
        if bbox.is_empty() {
            return Self::empty(dim);
        }
        let mut inner = OctInner::universe(dim);
        let two = BigRational::from_integer(Coefficient::from(2));
        for k in 0..dim {
            if let Some(ub) = bbox.upper(k) {
                let v = T::from_rational(&(&ub.value * &two), Rounding::Up).0;
                inner.matrix.set(2 * k + 1, 2 * k, Bound::Finite(v));
            }
            if let Some(lb) = bbox.lower(k) {
                let v = T::from_rational(&(-(&lb.value) * &two), Rounding::Up).0;
                inner.matrix.set(2 * k, 2 * k + 1, Bound::Finite(v));
            }
        }
        if dim > 0 {
            inner.status.reset_closed();
        }
        Self::wrap(inner)
    }

    /// The grid-style constructor: equality congruences refine the shape,
    /// proper congruences are safely ignored.
    pub fn from_congruences(cgs: &[Congruence]) -> Self {
        let dim = cgs.iter().map(Congruence::space_dimension).max().unwrap_or(0);
        let mut inner = OctInner::universe(dim);
        for cg in cgs {
            if cg.is_equality() {
                inner.refine_lenient(&cg.as_equality_constraint());
            } else if cg.is_inconsistent() {
                inner.set_empty();
            }
        }
        Self::wrap(inner)
    }

    /// Sound cross-policy conversion, rounding every bound towards `+∞`.
    pub fn approximation_of<U: FiniteNumber>(other: &Octagon<U>) -> Octagon<T> {
        let o = other.inner.borrow();
        let mut inner = OctInner::<T> {
            space_dim: o.space_dim,
            matrix: OctMatrix::universe(o.space_dim),
            status: o.status,
            redundancy: Vec::new(),
        };
        if !o.marked_empty() {
            for (i, j, cell) in o.matrix.iter_stored() {
                let (b, _) = Bound::<T>::assign_from(cell, Rounding::Up);
                inner.matrix.set(i, j, b);
            }
            // Rounding may have loosened bounds.
            inner.status.reset_closed();
            inner.status.reset_reduced();
        }
        Octagon::wrap(inner)
    }

    // --- basic queries ---------------------------------------------------

    pub fn space_dimension(&self) -> usize {
        self.inner.borrow().space_dim
    }

    /// Enforce strong closure (logically read-only).
    pub fn strong_closure_assign(&self) -> DomainResult<()> {
        self.inner.borrow_mut().strong_closure()
    }

    /// Detect and drop redundant entries (logically read-only).
    pub fn strong_reduction_assign(&self) -> DomainResult<()> {
        self.inner.borrow_mut().strong_reduction()
    }

    pub fn is_empty(&self) -> DomainResult<bool> {
        self.strong_closure_assign()?;
        Ok(self.inner.borrow().marked_empty())
    }

    pub fn is_universe(&self) -> bool {
        let inner = self.inner.borrow();
        if inner.marked_empty() {
            return false;
        }
        if inner.space_dim == 0 {
            return true;
        }
        inner.is_universe_matrix()
    }

    /// Octagons are topologically closed by construction.
    pub fn is_topologically_closed(&self) -> bool {
        true
    }

    pub fn is_bounded(&self) -> DomainResult<bool> {
        self.strong_closure_assign()?;
        let inner = self.inner.borrow();
        if inner.marked_empty() || inner.space_dim == 0 {
            return Ok(true);
        }
        let result = inner
            .matrix
            .iter_stored()
            .all(|(i, j, c)| i == j || !c.is_plus_infinity());
        Ok(result)
    }

    /// Dimension of the smallest affine subspace containing the shape.
    pub fn affine_dimension(&self) -> DomainResult<usize> {
        self.strong_closure_assign()?;
        let inner = self.inner.borrow();
        if inner.marked_empty() || inner.space_dim == 0 {
            return Ok(0);
        }
        let leaders = inner.compute_leaders();
        let mut affine_dim = 0;
        for i in (0..inner.n_rows()).step_by(2) {
            if leaders[i] == i && leaders[i + 1] == i + 1 {
                affine_dim += 1;
            }
        }
        Ok(affine_dim)
    }

    /// A shape is discrete when it holds at most one point.
    pub fn is_discrete(&self) -> DomainResult<bool> {
        Ok(self.affine_dimension()? == 0)
    }

    pub fn contains(&self, y: &Octagon<T>) -> DomainResult<bool> {
        self.dim_check(y.space_dimension(), "contains(y)")?;
        if y.space_dimension() != self.space_dimension() {
            return Err(DomainError::DimensionIncompatible {
                op: "contains(y)",
                this_dim: self.space_dimension(),
                required_dim: y.space_dimension(),
            });
        }
        if std::ptr::eq(self, y) {
            return Ok(true);
        }
        if self.space_dimension() == 0 {
            let x_empty = self.inner.borrow().marked_empty();
            let y_empty = y.inner.borrow().marked_empty();
            return Ok(!x_empty || y_empty);
        }
        y.strong_closure_assign()?;
        let y_inner = y.inner.borrow();
        if y_inner.marked_empty() {
            return Ok(true);
        }
        let x_inner = self.inner.borrow();
        if x_inner.marked_empty() {
            return Ok(false);
        }
        for (i, j, x_cell) in x_inner.matrix.iter_stored() {
            if *x_cell < *y_inner.matrix.at(i, j) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn strictly_contains(&self, y: &Octagon<T>) -> DomainResult<bool> {
        Ok(self.contains(y)? && !y.contains(self)?)
    }

    pub fn is_disjoint_from(&self, y: &Octagon<T>) -> DomainResult<bool> {
        if y.space_dimension() != self.space_dimension() {
            return Err(DomainError::DimensionIncompatible {
                op: "is_disjoint_from(y)",
                this_dim: self.space_dimension(),
                required_dim: y.space_dimension(),
            });
        }
        if std::ptr::eq(self, y) {
            return self.is_empty();
        }
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(true);
        }
        y.strong_closure_assign()?;
        let y_inner = y.inner.borrow();
        if y_inner.marked_empty() {
            return Ok(true);
        }
        let x_inner = self.inner.borrow();
        let n = x_inner.n_rows();
        for i in 0..n {
            let ci = coherent(i);
            for j in 0..n {
                let cj = coherent(j);
                let y_ci_cj = y_inner.matrix.at(ci, cj);
                let Bound::Finite(yv) = y_ci_cj else { continue };
                let neg = Bound::Finite(yv.neg());
                if *x_inner.matrix.at(i, j) < neg {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Whether the shape syntactically or semantically constrains `v`.
    pub fn constrains(&self, v: Variable) -> DomainResult<bool> {
        self.dim_check(v.space_dimension(), "constrains(v)")?;
        let inner = self.inner.borrow();
        if inner.marked_empty() {
            return Ok(true);
        }
        let n_v = 2 * v.index();
        for j in 0..row_size(n_v) {
            if j != n_v && !inner.matrix.at(n_v, j).is_plus_infinity() {
                return Ok(true);
            }
            if j != n_v + 1 && !inner.matrix.at(n_v + 1, j).is_plus_infinity() {
                return Ok(true);
            }
        }
        for i in (n_v + 2)..inner.n_rows() {
            if !inner.matrix.at(i, n_v).is_plus_infinity()
                || !inner.matrix.at(i, n_v + 1).is_plus_infinity()
            {
                return Ok(true);
            }
        }
        drop(inner);
        self.is_empty()
    }

    /// The constraints of the current matrix (no closure is forced).
    pub fn constraints(&self) -> ConstraintSystem {
        self.inner.borrow().constraints_of()
    }

    /// A minimized constraint description (closure plus reduction).
    pub fn minimized_constraints(&self) -> DomainResult<ConstraintSystem> {
        self.strong_reduction_assign()?;
        Ok(self.constraints())
    }

    /// Run `f` over a read-only view of the matrix.
    pub fn with_matrix_view<R>(&self, f: impl FnOnce(OctMatrixView<'_, T>) -> R) -> R {
        let inner = self.inner.borrow();
        f(OctMatrixView::new(&inner.matrix))
    }

    pub fn bounds_from_above(&self, expr: &LinearExpr) -> DomainResult<bool> {
        self.dim_check(expr.space_dimension(), "bounds_from_above(e)")?;
        Ok(self.inner.borrow_mut().max_min(expr, true)?.is_some()
            || self.inner.borrow().marked_empty()
            || self.space_dimension() == 0)
    }

    pub fn bounds_from_below(&self, expr: &LinearExpr) -> DomainResult<bool> {
        self.dim_check(expr.space_dimension(), "bounds_from_below(e)")?;
        Ok(self.inner.borrow_mut().max_min(expr, false)?.is_some()
            || self.inner.borrow().marked_empty()
            || self.space_dimension() == 0)
    }

    /// Supremum of `expr` as `(num, den, attained)`, `None` if unbounded
    /// or the shape is empty.
    pub fn maximize(&self, expr: &LinearExpr) -> DomainResult<Option<(Coefficient, Coefficient, bool)>> {
        self.dim_check(expr.space_dimension(), "maximize(e)")?;
        self.inner.borrow_mut().max_min(expr, true)
    }

    pub fn minimize(&self, expr: &LinearExpr) -> DomainResult<Option<(Coefficient, Coefficient, bool)>> {
        self.dim_check(expr.space_dimension(), "minimize(e)")?;
        self.inner.borrow_mut().max_min(expr, false)
    }

    /// Supremum of `expr` together with a witness point.
    pub fn maximize_with_point(
        &self,
        expr: &LinearExpr,
    ) -> DomainResult<Option<(Coefficient, Coefficient, bool, Generator)>> {
        self.dim_check(expr.space_dimension(), "maximize(e, ...)")?;
        self.extremum_with_point(expr, true)
    }

    pub fn minimize_with_point(
        &self,
        expr: &LinearExpr,
    ) -> DomainResult<Option<(Coefficient, Coefficient, bool, Generator)>> {
        self.dim_check(expr.space_dimension(), "minimize(e, ...)")?;
        self.extremum_with_point(expr, false)
    }

    fn extremum_with_point(
        &self,
        expr: &LinearExpr,
        maximize: bool,
    ) -> DomainResult<Option<(Coefficient, Coefficient, bool, Generator)>> {
        if self.space_dimension() == 0 {
            if self.inner.borrow().marked_empty() {
                return Ok(None);
            }
            return Ok(Some((
                expr.inhomogeneous_term().clone(),
                Coefficient::from(1),
                true,
                Generator::origin(),
            )));
        }
        self.strong_closure_assign()?;
        let (cs, dim, empty, universe) = {
            let inner = self.inner.borrow();
            (
                inner.constraints_of(),
                inner.space_dim,
                inner.marked_empty(),
                inner.is_universe_matrix(),
            )
        };
        if empty {
            return Ok(None);
        }
        if universe {
            if expr.all_homogeneous_terms_are_zero() {
                return Ok(Some((
                    expr.inhomogeneous_term().clone(),
                    Coefficient::from(1),
                    true,
                    Generator::origin(),
                )));
            }
            return Ok(None);
        }
        let mode = if maximize {
            OptimizationMode::Maximization
        } else {
            OptimizationMode::Minimization
        };
        let mut lp = LpProblem::from_parts(dim, cs, expr.clone(), mode)?;
        if lp.solve()? == LpStatus::Optimized {
            let (num, den) = lp.optimal_value()?;
            let point = lp.optimizing_point()?.clone();
            Ok(Some((num, den, true, point)))
        } else {
            Ok(None)
        }
    }

    /// Whether the shape holds at least one integral point.
    pub fn contains_integer_point(&self) -> DomainResult<bool> {
        if self.is_empty()? {
            return Ok(false);
        }
        let inner = self.inner.borrow();
        if inner.space_dim == 0 {
            return Ok(true);
        }
        if T::IS_INTEGER {
            return Ok(!inner.tight_coherence_would_make_empty());
        }
        // Tighten every bound to the integer lattice and re-check.
        let mut z = OctInner::<Coefficient> {
            space_dim: inner.space_dim,
            matrix: OctMatrix::universe(inner.space_dim),
            status: Status::Matrix { closed: false, reduced: false },
            redundancy: Vec::new(),
        };
        let mut all_integers = true;
        for (i, j, cell) in inner.matrix.iter_stored() {
            if let Bound::Finite(v) = cell {
                let (tightened, rel) =
                    Coefficient::from_rational(&v.to_rational(), Rounding::Down);
                if !rel.is_exact() {
                    all_integers = false;
                }
                z.matrix.set(i, j, Bound::Finite(tightened));
            }
        }
        if all_integers {
            z.status.set_closed();
        } else {
            z.strong_closure()?;
            if z.marked_empty() {
                return Ok(false);
            }
        }
        Ok(!z.tight_coherence_would_make_empty())
    }

    /// Consistency of the internal representation; used by assertions
    /// and the test suite.
    pub fn ok(&self) -> bool {
        let inner = self.inner.borrow();
        if inner.status.is_zero_dim_univ() && inner.space_dim != 0 {
            return false;
        }
        if inner.marked_empty() {
            return true;
        }
        if inner.space_dim == 0 {
            return inner.status.is_zero_dim_univ();
        }
        for i in 0..inner.n_rows() {
            if !inner.matrix.at(i, i).is_plus_infinity() {
                return false;
            }
        }
        if inner.status.is_closed() {
            let mut copy = inner.clone();
            copy.status.reset_closed();
            match copy.strong_closure() {
                Err(_) => return true,
                Ok(()) => {}
            }
            if copy.marked_empty() {
                return false;
            }
            if copy.matrix != inner.matrix {
                return false;
            }
            // A strongly closed matrix must be strong-coherent.
            let n = inner.n_rows();
            for i in 0..n {
                let x_i_ci = inner.matrix.at(i, coherent(i));
                for j in 0..row_size(i) {
                    if i == j {
                        continue;
                    }
                    let x_cj_j = inner.matrix.at(coherent(j), j);
                    if !x_i_ci.is_plus_infinity() && !x_cj_j.is_plus_infinity() {
                        let semi = x_i_ci.add(x_cj_j, Rounding::Up).half(Rounding::Up);
                        if *inner.matrix.at(i, j) > semi {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}

fn constraint_for(lhs: LinearExpr, relsym: RelSym, rhs: LinearExpr) -> Constraint {
    match relsym {
        RelSym::LessOrEqual => Constraint::le(lhs, rhs),
        RelSym::Equal => Constraint::eq(lhs, rhs),
        RelSym::GreaterOrEqual => Constraint::ge(lhs, rhs),
    }
}

impl<T: FiniteNumber> Octagon<T> {
    fn same_dim_check(&self, y: &Octagon<T>, op: &'static str) -> DomainResult<()> {
        if self.space_dimension() != y.space_dimension() {
            return Err(DomainError::DimensionIncompatible {
                op,
                this_dim: self.space_dimension(),
                required_dim: y.space_dimension(),
            });
        }
        Ok(())
    }

    // --- refinement ------------------------------------------------------

    /// Add an octagonal constraint; refuses anything else.
    pub fn add_constraint(&mut self, c: &Constraint) -> DomainResult<()> {
        let inner = self.inner.get_mut();
        if c.space_dimension() > inner.space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "add_constraint(c)",
                this_dim: inner.space_dim,
                required_dim: c.space_dimension(),
            });
        }
        if c.is_strict_inequality() {
            if c.is_inconsistent() {
                inner.set_empty();
                return Ok(());
            }
            if c.is_tautological() {
                return Ok(());
            }
            return Err(DomainError::StrictInequality { op: "add_constraint(c)" });
        }
        let Some(cell) = extract_octagonal_difference(c, inner.space_dim) else {
            return Err(DomainError::NonShapeConstraint {
                op: "add_constraint(c)",
                shape: "octagonal",
            });
        };
        if cell.num_vars == 0 {
            let b = c.inhomogeneous_term();
            if b.is_negative() || (c.is_equality() && !b.is_zero()) {
                inner.set_empty();
            }
            return Ok(());
        }
        if inner.marked_empty() {
            return Ok(());
        }
        if inner.refine_with_cell(&cell, c.is_equality()) {
            inner.matrix_touched();
        }
        Ok(())
    }

    pub fn add_constraints(&mut self, cs: &ConstraintSystem) -> DomainResult<()> {
        for c in cs {
            self.add_constraint(c)?;
        }
        Ok(())
    }

    /// Refine with a constraint, silently ignoring non-octagonal ones.
    pub fn refine_with_constraint(&mut self, c: &Constraint) -> DomainResult<()> {
        let inner = self.inner.get_mut();
        if c.space_dimension() > inner.space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "refine_with_constraint(c)",
                this_dim: inner.space_dim,
                required_dim: c.space_dimension(),
            });
        }
        inner.refine_lenient(c);
        Ok(())
    }

    pub fn refine_with_constraints(&mut self, cs: &ConstraintSystem) -> DomainResult<()> {
        for c in cs {
            self.refine_with_constraint(c)?;
        }
        Ok(())
    }

    /// Meet: elementwise minimum. Preserves emptiness, not closure.
    pub fn intersection_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        self.same_dim_check(y, "intersection_assign(y)")?;
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        if x.marked_empty() {
            return Ok(());
        }
        if y_inner.marked_empty() {
            x.set_empty();
            return Ok(());
        }
        if x.space_dim == 0 {
            return Ok(());
        }
        let mut changed = false;
        x.matrix.for_each_stored_mut(|i, j, cell| {
            let yv = y_inner.matrix.at(i, j);
            if *yv < *cell {
                *cell = yv.clone();
                changed = true;
            }
        });
        if changed {
            x.matrix_touched();
        }
        Ok(())
    }

    /// Join (octagonal hull): elementwise maximum on closed operands;
    /// the result is closed.
    pub fn upper_bound_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        self.same_dim_check(y, "upper_bound_assign(y)")?;
        y.strong_closure_assign()?;
        if y.inner.borrow().marked_empty() {
            return Ok(());
        }
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            *self.inner.get_mut() = y.inner.borrow().clone();
            return Ok(());
        }
        if self.space_dimension() == 0 {
            return Ok(());
        }
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        x.matrix.for_each_stored_mut(|i, j, cell| {
            cell.max_assign(y_inner.matrix.at(i, j));
        });
        x.status.set_closed();
        x.status.reset_reduced();
        x.redundancy.clear();
        Ok(())
    }

    /// Join, committed only when it is exactly the union (the BHZ09
    /// eight-condition test over non-redundant entry quadruples).
    pub fn upper_bound_assign_if_exact(&mut self, y: &Octagon<T>) -> DomainResult<bool> {
        self.same_dim_check(y, "upper_bound_assign_if_exact(y)")?;
        if self.space_dimension() == 0 {
            self.upper_bound_assign(y)?;
            return Ok(true);
        }
        if self.is_empty()? {
            *self.inner.get_mut() = y.inner.borrow().clone();
            return Ok(true);
        }
        if y.is_empty()? {
            return Ok(true);
        }

        let mut ub = self.clone();
        ub.upper_bound_assign(y)?;

        let exact = {
            let x_inner = self.inner.borrow();
            let y_inner = y.inner.borrow();
            let ub_inner = ub.inner.borrow();
            let x_nr = x_inner.non_redundant_matrix_entries();
            let y_nr = y_inner.non_redundant_matrix_entries();
            let n = x_inner.n_rows();
            let zero = Bound::<T>::zero();
            let up = Rounding::Up;

            let mut exact = true;
            'outer: for i in (0..n).rev() {
                let ci = coherent(i);
                let ub_i_ci = ub_inner.matrix.at(i, ci);
                for j in 0..row_size(i) {
                    if !x_nr[i].get(j) {
                        continue;
                    }
                    let x_i_j = x_inner.matrix.at(i, j);
                    // 1st condition.
                    if *x_i_j >= *y_inner.matrix.at(i, j) {
                        continue;
                    }
                    let cj = coherent(j);
                    let ub_cj_j = ub_inner.matrix.at(cj, j);
                    for k in 0..n {
                        let ck = coherent(k);
                        let ub_k_ck = ub_inner.matrix.at(k, ck);
                        let ub_k_j = if k == j { &zero } else { ub_inner.matrix.at(k, j) };
                        let ub_i_ck = if i == ck { &zero } else { ub_inner.matrix.at(i, ck) };
                        for ell in 0..row_size(k) {
                            if !y_nr[k].get(ell) {
                                continue;
                            }
                            let y_k_ell = y_inner.matrix.at(k, ell);
                            // 2nd condition.
                            if *y_k_ell >= *x_inner.matrix.at(k, ell) {
                                continue;
                            }
                            let cell = coherent(ell);
                            let ub_i_ell =
                                if i == ell { &zero } else { ub_inner.matrix.at(i, ell) };
                            let ub_cj_ell =
                                if cj == ell { &zero } else { ub_inner.matrix.at(cj, ell) };
                            // 3rd condition.
                            let lhs = x_i_j.add(y_k_ell, up);
                            if lhs >= ub_i_ell.add(ub_k_j, up) {
                                continue;
                            }
                            // 4th condition.
                            if lhs >= ub_i_ck.add(ub_cj_ell, up) {
                                continue;
                            }
                            // 5th condition.
                            let lhs5 = lhs.add(x_i_j, up);
                            if lhs5 >= ub_i_ell.add(ub_i_ck, up).add(ub_cj_j, up) {
                                continue;
                            }
                            // 6th condition.
                            if lhs5 >= ub_k_j.add(ub_cj_ell, up).add(ub_i_ci, up) {
                                continue;
                            }
                            // 7th condition.
                            let lhs7 = lhs.add(y_k_ell, up);
                            if lhs7 >= ub_i_ell.add(ub_cj_ell, up).add(ub_k_ck, up) {
                                continue;
                            }
                            // 8th (last) condition.
                            if lhs7 < ub_k_j.add(ub_i_ck, up).add(ub_inner.matrix.at(cell, ell), up)
                            {
                                exact = false;
                                break 'outer;
                            }
                        }
                    }
                }
            }
            exact
        };
        if exact {
            *self.inner.get_mut() = ub.inner.into_inner();
        }
        Ok(exact)
    }

    /// Smallest octagon containing `self ∖ y`.
    pub fn difference_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        self.same_dim_check(y, "difference_assign(y)")?;
        if self.is_empty()? {
            return Ok(());
        }
        if y.is_empty()? {
            return Ok(());
        }
        let dim = self.space_dimension();
        if dim == 0 {
            // Both are the zero-dimensional universe.
            self.inner.get_mut().set_empty();
            return Ok(());
        }
        if y.contains(self)? {
            self.inner.get_mut().set_empty();
            return Ok(());
        }

        let x = self.clone();
        let mut new_oct = Octagon::empty(dim);
        for c in &y.constraints() {
            // Skip constraints that keep all of x: their complement would
            // make the piece empty and only lose precision.
            if x.relation_with_constraint(c)?.implies(ConstraintRelation::is_included()) {
                continue;
            }
            let e = c.expr().clone();
            let mut z = x.clone();
            z.refine_with_constraint(&Constraint::le(e.clone(), LinearExpr::new()))?;
            if !z.is_empty()? {
                new_oct.upper_bound_assign(&z)?;
            }
            if c.is_equality() {
                let mut z = x.clone();
                z.refine_with_constraint(&Constraint::ge_zero(e))?;
                if !z.is_empty()? {
                    new_oct.upper_bound_assign(&z)?;
                }
            }
        }
        *self.inner.get_mut() = new_oct.inner.into_inner();
        Ok(())
    }

    /// Time elapse: a bound survives iff it cannot grow along any
    /// direction of `y` (its cell in closed `y` is at most zero).
    pub fn time_elapse_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        self.same_dim_check(y, "time_elapse_assign(y)")?;
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        y.strong_closure_assign()?;
        if y.inner.borrow().marked_empty() {
            self.inner.get_mut().set_empty();
            return Ok(());
        }
        if self.space_dimension() == 0 {
            return Ok(());
        }
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        x.matrix.for_each_stored_mut(|i, j, cell| {
            if i != j && y_inner.matrix.at(i, j).sgn() > 0 {
                *cell = Bound::PlusInfinity;
            }
        });
        x.matrix_touched();
        Ok(())
    }

    /// Existentially quantify one variable.
    pub fn unconstrain(&mut self, v: Variable) -> DomainResult<()> {
        self.dim_check(v.space_dimension(), "unconstrain(v)")?;
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        if inner.marked_empty() {
            return Ok(());
        }
        // Forgetting a closed variable preserves closure.
        inner.forget_all(v.index());
        Ok(())
    }

    pub fn unconstrain_set(&mut self, vs: &VariableSet) -> DomainResult<()> {
        self.dim_check(vs.space_dimension(), "unconstrain(vs)")?;
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        if inner.marked_empty() {
            return Ok(());
        }
        for v in vs.iter() {
            inner.forget_all(v.index());
        }
        Ok(())
    }

    // --- relation queries ------------------------------------------------

    pub fn relation_with_constraint(&self, c: &Constraint) -> DomainResult<ConstraintRelation> {
        self.dim_check(c.space_dimension(), "relation_with(c)")?;
        if self.is_empty()? {
            return Ok(empty_shape_relation());
        }
        let min = self.inner.borrow_mut().max_min(c.expr(), false)?;
        let max = self.inner.borrow_mut().max_min(c.expr(), true)?;
        let to_rat =
            |o: Option<(Coefficient, Coefficient, bool)>| o.map(|(n, d, _)| BigRational::new(n, d));
        Ok(relation_from_extrema(&to_rat(min), &to_rat(max), c.kind()))
    }

    pub fn relation_with_generator(&self, g: &Generator) -> DomainResult<GeneratorRelation> {
        self.dim_check(g.space_dimension(), "relation_with(g)")?;
        if self.is_empty()? {
            return Ok(GeneratorRelation::nothing());
        }
        for c in &self.constraints() {
            let hom: Coefficient = c
                .expr()
                .terms()
                .map(|(v, a)| a * g.coefficient(v))
                .sum();
            let satisfied = if g.is_point_or_closure_point() {
                let value = hom + c.inhomogeneous_term() * g.divisor();
                match c.kind() {
                    adom_core::ConstraintKind::Equal => value.is_zero(),
                    adom_core::ConstraintKind::GreaterOrEqual => !value.is_negative(),
                    adom_core::ConstraintKind::Greater => value.is_positive(),
                }
            } else if g.is_ray() {
                match c.kind() {
                    adom_core::ConstraintKind::Equal => hom.is_zero(),
                    _ => !hom.is_negative(),
                }
            } else {
                hom.is_zero()
            };
            if !satisfied {
                return Ok(GeneratorRelation::nothing());
            }
        }
        Ok(GeneratorRelation::subsumes())
    }

    pub fn relation_with_congruence(&self, cg: &Congruence) -> DomainResult<ConstraintRelation> {
        self.dim_check(cg.space_dimension(), "relation_with(cg)")?;
        if cg.is_equality() {
            return self.relation_with_constraint(&cg.as_equality_constraint());
        }
        if self.is_empty()? {
            return Ok(empty_shape_relation());
        }
        let min = self.inner.borrow_mut().max_min(cg.expr(), false)?;
        let max = self.inner.borrow_mut().max_min(cg.expr(), true)?;
        let to_rat =
            |o: Option<(Coefficient, Coefficient, bool)>| o.map(|(n, d, _)| BigRational::new(n, d));
        let (lo, hi) = (to_rat(min), to_rat(max));
        let modulus = BigRational::from_integer(cg.modulus().clone());
        match (&lo, &hi) {
            (Some(lo), Some(hi)) if lo == hi => {
                if (lo / &modulus).is_integer() {
                    if lo.is_zero() {
                        Ok(ConstraintRelation::saturates().and(ConstraintRelation::is_included()))
                    } else {
                        Ok(ConstraintRelation::is_included())
                    }
                } else {
                    Ok(ConstraintRelation::is_disjoint())
                }
            }
            (Some(lo), Some(hi)) => {
                let k = (lo / &modulus).ceil();
                if k * &modulus <= *hi {
                    Ok(ConstraintRelation::strictly_intersects())
                } else {
                    Ok(ConstraintRelation::is_disjoint())
                }
            }
            _ => Ok(ConstraintRelation::strictly_intersects()),
        }
    }

    // --- affine transfer functions ---------------------------------------

    pub fn affine_image(
        &mut self,
        var: Variable,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator { op: "affine_image(v, e, d)" });
        }
        self.dim_check(expr.space_dimension(), "affine_image(v, e, d)")?;
        self.dim_check(var.space_dimension(), "affine_image(v, e, d)")?;
        self.inner.get_mut().affine_image(var.index(), expr, den)
    }

    pub fn affine_preimage(
        &mut self,
        var: Variable,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator { op: "affine_preimage(v, e, d)" });
        }
        self.dim_check(expr.space_dimension(), "affine_preimage(v, e, d)")?;
        self.dim_check(var.space_dimension(), "affine_preimage(v, e, d)")?;
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        if inner.marked_empty() {
            return Ok(());
        }
        let coeff_v = expr.coefficient(var);
        if !coeff_v.is_zero() {
            // Invertible: apply the image of the inverse map.
            let mut inverse = -expr.clone();
            inverse.add_mul_assign(coeff_v.clone(), var);
            inverse.add_mul_assign(den.clone(), var);
            inner.affine_image(var.index(), &inverse, &coeff_v)
        } else {
            inner.refine(var.index(), RelSym::Equal, expr, den);
            inner.strong_closure()?;
            if inner.marked_empty() {
                return Ok(());
            }
            inner.forget_all(var.index());
            Ok(())
        }
    }

    pub fn generalized_affine_image(
        &mut self,
        var: Variable,
        relsym: RelSym,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator { op: "generalized_affine_image(v, r, e, d)" });
        }
        self.dim_check(expr.space_dimension(), "generalized_affine_image(v, r, e, d)")?;
        self.dim_check(var.space_dimension(), "generalized_affine_image(v, r, e, d)")?;
        if relsym == RelSym::Equal {
            return self.inner.get_mut().affine_image(var.index(), expr, den);
        }
        self.inner
            .get_mut()
            .generalized_affine_image(var.index(), relsym, expr, den)
    }

    pub fn generalized_affine_preimage(
        &mut self,
        var: Variable,
        relsym: RelSym,
        expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator {
                op: "generalized_affine_preimage(v, r, e, d)",
            });
        }
        self.dim_check(expr.space_dimension(), "generalized_affine_preimage(v, r, e, d)")?;
        self.dim_check(var.space_dimension(), "generalized_affine_preimage(v, r, e, d)")?;
        if relsym == RelSym::Equal {
            return self.affine_preimage(var, expr, den);
        }
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        if inner.marked_empty() {
            return Ok(());
        }
        let expr_v = expr.coefficient(var);
        if !expr_v.is_zero() {
            // Compute as the image of the inverse relation.
            let mut inverse = expr.clone();
            inverse.sub_mul_assign(expr_v.clone() + den.clone(), var);
            let inverse_den = -expr_v;
            let inverse_relsym = if den.signum() == inverse_den.signum() {
                relsym
            } else {
                relsym.mirrored()
            };
            inner.generalized_affine_image(var.index(), inverse_relsym, &inverse, &inverse_den)
        } else {
            inner.refine(var.index(), relsym, expr, den);
            inner.strong_closure()?;
            if inner.marked_empty() {
                return Ok(());
            }
            inner.forget_all(var.index());
            Ok(())
        }
    }

    /// Expression form: the image under `lhs' ⋈ rhs`.
    pub fn generalized_affine_image_lhs_rhs(
        &mut self,
        lhs: &LinearExpr,
        relsym: RelSym,
        rhs: &LinearExpr,
    ) -> DomainResult<()> {
        self.dim_check(lhs.space_dimension(), "generalized_affine_image(e1, r, e2)")?;
        self.dim_check(rhs.space_dimension(), "generalized_affine_image(e1, r, e2)")?;
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        let (t_lhs, j_lhs) = analyze_expr(lhs);
        if t_lhs == 0 {
            // Constant left-hand side: the relation filters the states.
            let c = constraint_for(lhs.clone(), relsym, rhs.clone());
            self.inner.get_mut().refine_lenient(&c);
            return Ok(());
        }
        if t_lhs == 1 {
            let v = Variable::new(j_lhs);
            let den = lhs.coefficient(v);
            let new_relsym = if den.is_negative() { relsym.mirrored() } else { relsym };
            let mut expr = rhs.clone();
            expr.add_to_inhomogeneous(-lhs.inhomogeneous_term().clone());
            return self.generalized_affine_image(v, new_relsym, &expr, &den);
        }
        let lhs_vars: Vec<usize> = lhs.terms().map(|(v, _)| v.index()).collect();
        let intersects = lhs_vars
            .iter()
            .any(|&u| !rhs.coefficient(Variable::new(u)).is_zero());
        if !intersects {
            let inner = self.inner.get_mut();
            for &u in &lhs_vars {
                inner.forget_all(u);
            }
            inner.matrix_touched();
            let c = constraint_for(lhs.clone(), relsym, rhs.clone());
            inner.refine_lenient(&c);
            Ok(())
        } else {
            // Capture rhs in a fresh dimension before overwriting lhs vars.
            let old_dim = self.space_dimension();
            let z = Variable::new(old_dim);
            self.add_space_dimensions_and_embed(1);
            self.affine_image(z, rhs, &Coefficient::from(1))?;
            self.strong_closure_assign()?;
            {
                let inner = self.inner.get_mut();
                for &u in &lhs_vars {
                    inner.forget_all(u);
                }
                inner.matrix_touched();
                let c = constraint_for(lhs.clone(), relsym, LinearExpr::from_variable(z));
                inner.refine_lenient(&c);
            }
            self.remove_higher_space_dimensions(old_dim)
        }
    }

    /// Expression form of the generalized preimage.
    pub fn generalized_affine_preimage_lhs_rhs(
        &mut self,
        lhs: &LinearExpr,
        relsym: RelSym,
        rhs: &LinearExpr,
    ) -> DomainResult<()> {
        self.dim_check(lhs.space_dimension(), "generalized_affine_preimage(e1, r, e2)")?;
        self.dim_check(rhs.space_dimension(), "generalized_affine_preimage(e1, r, e2)")?;
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        let (t_lhs, j_lhs) = analyze_expr(lhs);
        if t_lhs == 0 {
            // A constant lhs: preimage and image coincide.
            return self.generalized_affine_image_lhs_rhs(lhs, relsym, rhs);
        }
        if t_lhs == 1 {
            let v = Variable::new(j_lhs);
            let den = lhs.coefficient(v);
            let new_relsym = if den.is_negative() { relsym.mirrored() } else { relsym };
            let mut expr = rhs.clone();
            expr.add_to_inhomogeneous(-lhs.inhomogeneous_term().clone());
            return self.generalized_affine_preimage(v, new_relsym, &expr, &den);
        }
        let lhs_vars: Vec<usize> = lhs.terms().map(|(v, _)| v.index()).collect();
        let intersects = lhs_vars
            .iter()
            .any(|&u| !rhs.coefficient(Variable::new(u)).is_zero());
        if !intersects {
            {
                let inner = self.inner.get_mut();
                let c = constraint_for(lhs.clone(), relsym, rhs.clone());
                inner.refine_lenient(&c);
                inner.strong_closure()?;
                if inner.marked_empty() {
                    return Ok(());
                }
                for &u in &lhs_vars {
                    inner.forget_all(u);
                }
            }
            Ok(())
        } else {
            let old_dim = self.space_dimension();
            let z = Variable::new(old_dim);
            self.add_space_dimensions_and_embed(1);
            self.affine_image(z, lhs, &Coefficient::from(1))?;
            self.strong_closure_assign()?;
            {
                let inner = self.inner.get_mut();
                for &u in &lhs_vars {
                    inner.forget_all(u);
                }
                inner.matrix_touched();
                let c = constraint_for(LinearExpr::from_variable(z), relsym, rhs.clone());
                inner.refine_lenient(&c);
            }
            self.remove_higher_space_dimensions(old_dim)
        }
    }

    /// `lb/den ≤ var' ≤ ub/den`.
    pub fn bounded_affine_image(
        &mut self,
        var: Variable,
        lb_expr: &LinearExpr,
        ub_expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator { op: "bounded_affine_image(v, lb, ub, d)" });
        }
        self.dim_check(var.space_dimension(), "bounded_affine_image(v, lb, ub, d)")?;
        self.dim_check(lb_expr.space_dimension(), "bounded_affine_image(v, lb, ub, d)")?;
        self.dim_check(ub_expr.space_dimension(), "bounded_affine_image(v, lb, ub, d)")?;
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        let (t, w_id) = analyze_expr(lb_expr);
        let b = lb_expr.inhomogeneous_term().clone();
        let minus_den = -den.clone();
        let n_var = 2 * var.index();

        if t == 0 {
            self.generalized_affine_image(var, RelSym::LessOrEqual, ub_expr, den)?;
            let inner = self.inner.get_mut();
            if !inner.marked_empty() {
                let two_b = &b * Coefficient::from(2);
                inner.add_cell(n_var, n_var + 1, &two_b, &minus_den);
                inner.matrix_touched();
            }
            return Ok(());
        }
        if t == 1 {
            let w_coeff = lb_expr.coefficient(Variable::new(w_id));
            if w_coeff == *den || w_coeff == minus_den {
                if w_id == var.index() {
                    // var occurs in the lower bound: stash it first.
                    let old_dim = self.space_dimension();
                    let z = Variable::new(old_dim);
                    self.add_space_dimensions_and_embed(1);
                    self.affine_image(z, lb_expr, den)?;
                    self.strong_closure_assign()?;
                    self.generalized_affine_image(var, RelSym::LessOrEqual, ub_expr, den)?;
                    let c = Constraint::ge(
                        LinearExpr::from_variable(var),
                        LinearExpr::from_variable(z),
                    );
                    self.inner.get_mut().refine_lenient(&c);
                    return self.remove_higher_space_dimensions(old_dim);
                }
                self.generalized_affine_image(var, RelSym::LessOrEqual, ub_expr, den)?;
                let inner = self.inner.get_mut();
                if !inner.marked_empty() {
                    let n_w = 2 * w_id;
                    if w_coeff == *den {
                        inner.add_cell(n_var, n_w, &b, &minus_den);
                    } else {
                        inner.add_cell(n_var, n_w + 1, &b, &minus_den);
                    }
                    inner.matrix_touched();
                }
                return Ok(());
            }
        }
        // General lower bound: evaluate it before the image runs.
        let is_sc = den.is_positive();
        let sc_b = if is_sc { b.clone() } else { -b.clone() };
        let minus_sc_b = -sc_b;
        let sc_den = den.abs();
        let sc_expr = if is_sc { lb_expr.clone() } else { -lb_expr.clone() };
        let (neg_sum, neg_cnt, neg_idx) = self
            .inner
            .borrow()
            .approximate_side(&sc_expr, &minus_sc_b, w_id, false);
        self.generalized_affine_image(var, RelSym::LessOrEqual, ub_expr, den)?;
        if neg_cnt > 1 {
            return Ok(());
        }
        let inner = self.inner.get_mut();
        if inner.marked_empty() {
            return Ok(());
        }
        inner.matrix_touched();
        let sum = OctInner::<T>::finish_div(neg_sum, &sc_den);
        if neg_cnt == 0 {
            inner.min_cell(n_var, n_var + 1, &Bound::Finite(sum.double()));
            inner.deduce_minus_v_pm_u_bounds(var.index(), w_id, &sc_expr, &sc_den, &sum);
        } else if neg_idx != var.index() {
            let npi = sc_expr.coefficient(Variable::new(neg_idx));
            if npi == sc_den {
                inner.min_cell(n_var, 2 * neg_idx, &Bound::Finite(sum));
            } else if npi == -sc_den.clone() {
                inner.min_cell(n_var, 2 * neg_idx + 1, &Bound::Finite(sum));
            }
        }
        Ok(())
    }

    /// Preimage of `lb/den ≤ var' ≤ ub/den`.
    pub fn bounded_affine_preimage(
        &mut self,
        var: Variable,
        lb_expr: &LinearExpr,
        ub_expr: &LinearExpr,
        den: &Coefficient,
    ) -> DomainResult<()> {
        if den.is_zero() {
            return Err(DomainError::ZeroDenominator {
                op: "bounded_affine_preimage(v, lb, ub, d)",
            });
        }
        self.dim_check(var.space_dimension(), "bounded_affine_preimage(v, lb, ub, d)")?;
        self.dim_check(lb_expr.space_dimension(), "bounded_affine_preimage(v, lb, ub, d)")?;
        self.dim_check(ub_expr.space_dimension(), "bounded_affine_preimage(v, lb, ub, d)")?;
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        if ub_expr.coefficient(var).is_zero() {
            self.inner
                .get_mut()
                .refine(var.index(), RelSym::LessOrEqual, ub_expr, den);
            return self.generalized_affine_preimage(var, RelSym::GreaterOrEqual, lb_expr, den);
        }
        if lb_expr.coefficient(var).is_zero() {
            self.inner
                .get_mut()
                .refine(var.index(), RelSym::GreaterOrEqual, lb_expr, den);
            return self.generalized_affine_preimage(var, RelSym::LessOrEqual, ub_expr, den);
        }
        // var occurs on both sides: stash the inverted lower bound.
        let expr_v = lb_expr.coefficient(var);
        let old_dim = self.space_dimension();
        let z = Variable::new(old_dim);
        self.add_space_dimensions_and_embed(1);
        let mut lb_inverse = lb_expr.clone();
        lb_inverse.sub_mul_assign(expr_v.clone() + den.clone(), var);
        let inverse_den = -expr_v;
        self.affine_image(z, &lb_inverse, &inverse_den)?;
        self.strong_closure_assign()?;
        self.generalized_affine_preimage(var, RelSym::LessOrEqual, ub_expr, den)?;
        let c = if den.signum() == inverse_den.signum() {
            Constraint::ge(LinearExpr::from_variable(var), LinearExpr::from_variable(z))
        } else {
            Constraint::le(LinearExpr::from_variable(var), LinearExpr::from_variable(z))
        };
        self.inner.get_mut().refine_lenient(&c);
        self.remove_higher_space_dimensions(old_dim)
    }

    // --- widening and narrowing ------------------------------------------

    /// CC76 extrapolation with the default (empty) stop-point set.
    pub fn cc76_extrapolation_assign(
        &mut self,
        y: &Octagon<T>,
        tp: Option<&mut u32>,
    ) -> DomainResult<()> {
        self.cc76_extrapolation_assign_with_stop_points(y, &[], tp)
    }

    /// CC76 extrapolation: every unstable bound jumps to the first
    /// stop-point that can hold it, or to `+∞`. Requires `y ⊆ self`;
    /// `stops` must be sorted ascending.
    pub fn cc76_extrapolation_assign_with_stop_points(
        &mut self,
        y: &Octagon<T>,
        stops: &[T],
        mut tp: Option<&mut u32>,
    ) -> DomainResult<()> {
        self.same_dim_check(y, "CC76_extrapolation_assign(y)")?;
        if self.space_dimension() == 0 {
            return Ok(());
        }
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        y.strong_closure_assign()?;
        if y.inner.borrow().marked_empty() {
            return Ok(());
        }
        if let Some(tp) = tp.as_deref_mut() {
            if *tp > 0 {
                // Tokens delay widening: try on a copy first.
                let mut x_tmp = self.clone();
                x_tmp.cc76_extrapolation_assign_with_stop_points(y, stops, None)?;
                if !self.contains(&x_tmp)? {
                    *tp -= 1;
                }
                return Ok(());
            }
        }
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        x.matrix.for_each_stored_mut(|i, j, cell| {
            if *y_inner.matrix.at(i, j) < *cell {
                let widened = if let Bound::Finite(ev) = &*cell {
                    let idx = stops.partition_point(|s| s < ev);
                    if idx < stops.len() {
                        if *ev < stops[idx] {
                            Some(Bound::Finite(stops[idx].clone()))
                        } else {
                            None
                        }
                    } else {
                        Some(Bound::PlusInfinity)
                    }
                } else {
                    None
                };
                if let Some(w) = widened {
                    *cell = w;
                }
            }
        });
        x.matrix_touched();
        Ok(())
    }

    /// BHMZ05 widening: minimize `y`, then blast every disagreeing entry
    /// to `+∞`. An affine-dimension regression aborts (result = self).
    pub fn bhmz05_widening_assign(
        &mut self,
        y: &Octagon<T>,
        mut tp: Option<&mut u32>,
    ) -> DomainResult<()> {
        self.same_dim_check(y, "BHMZ05_widening_assign(y)")?;
        let y_affine_dim = y.affine_dimension()?;
        // A zero affine dimension means y is empty or a single point.
        if y_affine_dim == 0 {
            return Ok(());
        }
        let x_affine_dim = self.affine_dimension()?;
        if x_affine_dim != y_affine_dim {
            return Ok(());
        }
        if let Some(tp) = tp.as_deref_mut() {
            if *tp > 0 {
                let mut x_tmp = self.clone();
                x_tmp.bhmz05_widening_assign(y, None)?;
                if !self.contains(&x_tmp)? {
                    *tp -= 1;
                }
                return Ok(());
            }
        }
        y.strong_reduction_assign()?;
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        x.matrix.for_each_stored_mut(|i, j, cell| {
            // `!=` rather than `<` is intentional: the minimized y drops
            // redundant entries to +∞ and those must widen too.
            if *y_inner.matrix.at(i, j) != *cell {
                *cell = Bound::PlusInfinity;
            }
        });
        x.matrix_touched();
        Ok(())
    }

    /// The subset of `cs` already satisfied by `self`, collected into
    /// `limiting`.
    fn get_limiting_octagon(
        &self,
        cs: &ConstraintSystem,
        limiting: &mut Octagon<T>,
    ) -> DomainResult<()> {
        self.strong_closure_assign()?;
        let inner = self.inner.borrow();
        if inner.marked_empty() {
            return Ok(());
        }
        let lim = limiting.inner.get_mut();
        let mut changed = false;
        for c in cs {
            let Some(cell) = extract_octagonal_difference(c, inner.space_dim) else {
                continue;
            };
            if cell.num_vars == 0 {
                continue;
            }
            let coeff_abs = cell.coeff.abs();
            let d = Bound::<T>::div_round_up(&cell.term, &coeff_abs);
            if *inner.matrix.at(cell.i, cell.j) <= d && *lim.matrix.at(cell.i, cell.j) > d {
                lim.matrix.set(cell.i, cell.j, d);
                changed = true;
            }
            if c.is_equality() {
                let neg_term = -cell.term.clone();
                let d2 = Bound::<T>::div_round_up(&neg_term, &coeff_abs);
                let (ci, cj) = (coherent(cell.i), coherent(cell.j));
                if *inner.matrix.at(ci, cj) <= d2 && *lim.matrix.at(ci, cj) > d2 {
                    lim.matrix.set(ci, cj, d2);
                    changed = true;
                }
            }
        }
        if changed {
            lim.matrix_touched();
        }
        Ok(())
    }

    pub fn limited_cc76_extrapolation_assign(
        &mut self,
        y: &Octagon<T>,
        cs: &ConstraintSystem,
        tp: Option<&mut u32>,
    ) -> DomainResult<()> {
        self.same_dim_check(y, "limited_CC76_extrapolation_assign(y, cs)")?;
        self.dim_check(cs.space_dimension(), "limited_CC76_extrapolation_assign(y, cs)")?;
        if cs.has_strict_inequalities() {
            return Err(DomainError::StrictInequality {
                op: "limited_CC76_extrapolation_assign(y, cs)",
            });
        }
        if self.space_dimension() == 0 {
            return Ok(());
        }
        if self.is_empty()? || y.is_empty()? {
            return Ok(());
        }
        let mut limiting = Octagon::universe(self.space_dimension());
        self.get_limiting_octagon(cs, &mut limiting)?;
        self.cc76_extrapolation_assign(y, tp)?;
        self.intersection_assign(&limiting)
    }

    pub fn limited_bhmz05_extrapolation_assign(
        &mut self,
        y: &Octagon<T>,
        cs: &ConstraintSystem,
        tp: Option<&mut u32>,
    ) -> DomainResult<()> {
        self.same_dim_check(y, "limited_BHMZ05_extrapolation_assign(y, cs)")?;
        self.dim_check(cs.space_dimension(), "limited_BHMZ05_extrapolation_assign(y, cs)")?;
        if cs.has_strict_inequalities() {
            return Err(DomainError::StrictInequality {
                op: "limited_BHMZ05_extrapolation_assign(y, cs)",
            });
        }
        if self.space_dimension() == 0 {
            return Ok(());
        }
        if self.is_empty()? || y.is_empty()? {
            return Ok(());
        }
        let mut limiting = Octagon::universe(self.space_dimension());
        self.get_limiting_octagon(cs, &mut limiting)?;
        self.bhmz05_widening_assign(y, tp)?;
        self.intersection_assign(&limiting)
    }

    /// CC76 narrowing: where both operands are finite and differ, take the
    /// value of the larger operand `y`. Requires `self ⊆ y`.
    pub fn cc76_narrowing_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        self.same_dim_check(y, "CC76_narrowing_assign(y)")?;
        if self.space_dimension() == 0 {
            return Ok(());
        }
        y.strong_closure_assign()?;
        if y.inner.borrow().marked_empty() {
            return Ok(());
        }
        self.strong_closure_assign()?;
        if self.inner.borrow().marked_empty() {
            return Ok(());
        }
        let y_inner = y.inner.borrow();
        let x = self.inner.get_mut();
        let mut changed = false;
        x.matrix.for_each_stored_mut(|i, j, cell| {
            let yv = y_inner.matrix.at(i, j);
            if !cell.is_plus_infinity() && !yv.is_plus_infinity() && *cell != *yv {
                *cell = yv.clone();
                changed = true;
            }
        });
        if changed {
            x.matrix_touched();
        }
        Ok(())
    }

    // --- space-dimension manipulation ------------------------------------

    /// Grow by `m` unconstrained dimensions; preserves closure.
    pub fn add_space_dimensions_and_embed(&mut self, m: usize) {
        if m == 0 {
            return;
        }
        let inner = self.inner.get_mut();
        let was_zero_univ = inner.status.is_zero_dim_univ();
        inner.matrix.grow(m);
        inner.space_dim += m;
        if was_zero_univ {
            inner.status = Status::Matrix { closed: true, reduced: false };
        } else {
            inner.status.reset_reduced();
            inner.redundancy.clear();
        }
    }

    /// Grow by `m` dimensions pinned to zero; breaks closure.
    pub fn add_space_dimensions_and_project(&mut self, m: usize) {
        if m == 0 {
            return;
        }
        let old_dim = self.space_dimension();
        self.add_space_dimensions_and_embed(m);
        let inner = self.inner.get_mut();
        if inner.marked_empty() {
            return;
        }
        for k in old_dim..inner.space_dim {
            inner.matrix.set(2 * k, 2 * k + 1, Bound::zero());
            inner.matrix.set(2 * k + 1, 2 * k, Bound::zero());
        }
        inner.matrix_touched();
    }

    /// Remove exactly the dimensions in `vs`, closing first so no
    /// relational information is lost.
    pub fn remove_space_dimensions(&mut self, vs: &VariableSet) -> DomainResult<()> {
        if vs.is_empty() {
            return Ok(());
        }
        self.dim_check(vs.space_dimension(), "remove_space_dimensions(vs)")?;
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        let new_dim = inner.space_dim - vs.len();
        if new_dim == 0 {
            let was_empty = inner.marked_empty();
            inner.matrix = OctMatrix::universe(0);
            inner.space_dim = 0;
            inner.redundancy.clear();
            if was_empty {
                inner.status.set_empty();
            } else {
                inner.status.set_zero_dim_univ();
            }
            return Ok(());
        }
        if inner.marked_empty() {
            inner.matrix = OctMatrix::universe(new_dim);
            inner.space_dim = new_dim;
            return Ok(());
        }
        let mut next = 0usize;
        let map: Vec<Option<usize>> = (0..inner.space_dim)
            .map(|k| {
                if vs.contains(Variable::new(k)) {
                    None
                } else {
                    let slot = next;
                    next += 1;
                    Some(slot)
                }
            })
            .collect();
        inner.matrix = inner.matrix.remap(new_dim, |k| map[k]);
        inner.space_dim = new_dim;
        inner.status.reset_reduced();
        inner.redundancy.clear();
        Ok(())
    }

    pub fn remove_higher_space_dimensions(&mut self, new_dim: usize) -> DomainResult<()> {
        let dim = self.space_dimension();
        if new_dim > dim {
            return Err(DomainError::DimensionIncompatible {
                op: "remove_higher_space_dimensions(d)",
                this_dim: dim,
                required_dim: new_dim,
            });
        }
        if new_dim == dim {
            return Ok(());
        }
        let inner = self.inner.get_mut();
        inner.strong_closure()?;
        if new_dim == 0 {
            let was_empty = inner.marked_empty();
            inner.matrix = OctMatrix::universe(0);
            inner.space_dim = 0;
            inner.redundancy.clear();
            if was_empty {
                inner.status.set_empty();
            } else {
                inner.status.set_zero_dim_univ();
            }
            return Ok(());
        }
        if inner.marked_empty() {
            inner.matrix = OctMatrix::universe(new_dim);
            inner.space_dim = new_dim;
            return Ok(());
        }
        inner.matrix.shrink(new_dim);
        inner.space_dim = new_dim;
        inner.status.reset_reduced();
        inner.redundancy.clear();
        Ok(())
    }

    /// Apply a partial injective map over the dimensions. An empty
    /// codomain collapses to the zero-dimensional space; a contraction
    /// closes first.
    pub fn map_space_dimensions(&mut self, pfunc: &DimensionMap) -> DomainResult<()> {
        let dim = self.space_dimension();
        if dim == 0 {
            return Ok(());
        }
        if pfunc.has_empty_codomain() {
            return self.remove_higher_space_dimensions(0);
        }
        let new_dim = pfunc.max_in_codomain() + 1;
        let inner = self.inner.get_mut();
        if new_dim < inner.space_dim {
            inner.strong_closure()?;
        }
        if inner.marked_empty() {
            inner.matrix = OctMatrix::universe(new_dim);
            inner.space_dim = new_dim;
            return Ok(());
        }
        inner.matrix = inner.matrix.remap(new_dim, |k| pfunc.maps(k));
        inner.space_dim = new_dim;
        inner.status.reset_reduced();
        inner.redundancy.clear();
        Ok(())
    }

    /// Block-diagonal concatenation; breaks closure.
    pub fn concatenate_assign(&mut self, y: &Octagon<T>) -> DomainResult<()> {
        let y_inner = y.inner.borrow();
        let inner = self.inner.get_mut();
        if y_inner.space_dim == 0 {
            if y_inner.marked_empty() {
                inner.set_empty();
            }
            return Ok(());
        }
        let old_dim = inner.space_dim;
        if inner.status.is_zero_dim_univ() {
            inner.status.set_raw_matrix();
        }
        inner.matrix.grow(y_inner.space_dim);
        inner.space_dim += y_inner.space_dim;
        if y_inner.marked_empty() {
            inner.set_empty();
            return Ok(());
        }
        if inner.marked_empty() {
            return Ok(());
        }
        for (i, j, cell) in y_inner.matrix.iter_stored() {
            inner.matrix.set(2 * old_dim + i, 2 * old_dim + j, cell.clone());
        }
        inner.matrix_touched();
        Ok(())
    }

    /// Duplicate `var`'s constraints into `m` fresh dimensions.
    pub fn expand_space_dimension(&mut self, var: Variable, m: usize) -> DomainResult<()> {
        self.dim_check(var.space_dimension(), "expand_space_dimension(v, m)")?;
        if m == 0 {
            return Ok(());
        }
        let old_dim = self.space_dimension();
        self.add_space_dimensions_and_embed(m);
        let inner = self.inner.get_mut();
        if inner.marked_empty() {
            return Ok(());
        }
        let n_v = 2 * var.index();
        let old_rows = 2 * old_dim;
        for t in 0..m {
            let i = old_rows + 2 * t;
            for j in 0..old_rows {
                if j == n_v || j == n_v + 1 {
                    continue;
                }
                let a = inner.matrix.at(n_v, j).clone();
                inner.matrix.set(i, j, a);
                let b = inner.matrix.at(n_v + 1, j).clone();
                inner.matrix.set(i + 1, j, b);
            }
            let u1 = inner.matrix.at(n_v, n_v + 1).clone();
            inner.matrix.set(i, i + 1, u1);
            let u2 = inner.matrix.at(n_v + 1, n_v).clone();
            inner.matrix.set(i + 1, i, u2);
        }
        inner.matrix_touched();
        Ok(())
    }

    /// Fold the dimensions in `to_fold` into `var` (join of their
    /// constraints), then remove them.
    pub fn fold_space_dimensions(
        &mut self,
        to_fold: &VariableSet,
        var: Variable,
    ) -> DomainResult<()> {
        self.dim_check(var.space_dimension(), "fold_space_dimensions(vs, v)")?;
        if to_fold.is_empty() {
            return Ok(());
        }
        self.dim_check(to_fold.space_dimension(), "fold_space_dimensions(vs, v)")?;
        if to_fold.contains(var) {
            return Err(DomainError::Other(
                "fold_space_dimensions(vs, v): v must not occur in vs".into(),
            ));
        }
        {
            let inner = self.inner.get_mut();
            inner.strong_closure()?;
            if !inner.marked_empty() {
                let n = inner.n_rows();
                let n_v = 2 * var.index();
                for tbf in to_fold.iter() {
                    let n_t = 2 * tbf.index();
                    let u = inner.matrix.at(n_t, n_t + 1).clone();
                    inner.matrix.at_mut(n_v, n_v + 1).max_assign(&u);
                    let u = inner.matrix.at(n_t + 1, n_t).clone();
                    inner.matrix.at_mut(n_v + 1, n_v).max_assign(&u);
                    for j in 0..n {
                        if j == n_v || j == n_v + 1 || j == n_t || j == n_t + 1 {
                            continue;
                        }
                        let a = inner.matrix.at(n_t, j).clone();
                        inner.matrix.at_mut(n_v, j).max_assign(&a);
                        let a = inner.matrix.at(n_t + 1, j).clone();
                        inner.matrix.at_mut(n_v + 1, j).max_assign(&a);
                        let a = inner.matrix.at(j, n_t).clone();
                        inner.matrix.at_mut(j, n_v).max_assign(&a);
                        let a = inner.matrix.at(j, n_t + 1).clone();
                        inner.matrix.at_mut(j, n_v + 1).max_assign(&a);
                    }
                }
                inner.matrix_touched();
            }
        }
        self.remove_space_dimensions(to_fold)
    }

    // --- persistence ------------------------------------------------------

    /// Write the stable line-oriented ASCII form.
    pub fn ascii_dump<W: Write>(&self, w: &mut W) -> DomainResult<()> {
        let inner = self.inner.borrow();
        writeln!(w, "space_dim {}", inner.space_dim)?;
        writeln!(w, "{}", inner.status.ascii_token())?;
        for (_, _, cell) in inner.matrix.iter_stored() {
            writeln!(w, "{}", cell)?;
        }
        Ok(())
    }

    /// Read back the form produced by [`Octagon::ascii_dump`].
    pub fn ascii_load<R: BufRead>(r: &mut R) -> DomainResult<Octagon<T>> {
        let mut lines = r.lines();
        let mut next_line = || -> DomainResult<String> {
            match lines.next() {
                Some(l) => Ok(l?),
                None => Err(DomainError::Parse("unexpected end of input".into())),
            }
        };
        let header = next_line()?;
        let dim = match header.strip_prefix("space_dim ") {
            Some(rest) => rest
                .trim()
                .parse::<usize>()
                .map_err(|_| DomainError::Parse(format!("invalid space_dim line {:?}", header)))?,
            None => return Err(DomainError::Parse(format!("missing space_dim in {:?}", header))),
        };
        let status = Status::from_ascii_token(&next_line()?)?;
        let mut matrix = OctMatrix::universe(dim);
        for i in 0..2 * dim {
            for j in 0..row_size(i) {
                let line = next_line()?;
                let cell = Bound::parse_text(line.trim()).ok_or_else(|| {
                    DomainError::Parse(format!("invalid matrix entry {:?}", line))
                })?;
                matrix.set(i, j, cell);
            }
        }
        Ok(Octagon::wrap(OctInner {
            space_dim: dim,
            matrix,
            status,
            redundancy: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    type IntOct = Octagon<BigInt>;
    type RatOct = Octagon<BigRational>;

    fn x(i: usize) -> Variable {
        Variable::new(i)
    }

    fn var(i: usize) -> LinearExpr {
        LinearExpr::from_variable(x(i))
    }

    fn cst(n: i64) -> LinearExpr {
        LinearExpr::constant(n)
    }

    fn coeff(n: i64) -> Coefficient {
        Coefficient::from(n)
    }

    fn fin(n: i64) -> Bound<BigInt> {
        Bound::Finite(coeff(n))
    }

    /// The integer octagon of scenario E2.
    fn e2_octagon() -> IntOct {
        let mut oct = IntOct::universe(2);
        oct.add_constraint(&Constraint::le(var(0) + var(1), cst(2))).unwrap();
        oct.add_constraint(&Constraint::le(var(0) - var(1), cst(1))).unwrap();
        oct.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        oct.add_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        oct
    }

    fn unit_square() -> IntOct {
        let mut oct = IntOct::universe(2);
        oct.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        oct.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        oct.add_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        oct.add_constraint(&Constraint::le(var(1), cst(1))).unwrap();
        oct
    }

    #[test]
    fn test_e2_closure_cells() {
        let oct = e2_octagon();
        oct.strong_closure_assign().unwrap();
        assert!(oct.ok());
        oct.with_matrix_view(|m| {
            assert_eq!(*m.at(3, 0), fin(2)); // x + y ≤ 2
            assert_eq!(*m.at(2, 0), fin(1)); // x − y ≤ 1
            assert_eq!(*m.at(0, 1), fin(0)); // −2x ≤ 0
            assert_eq!(*m.at(2, 3), fin(0)); // −2y ≤ 0
            // Deduced by the shortest-path pass:
            assert_eq!(*m.at(1, 0), fin(3)); // 2x ≤ 3
            assert_eq!(*m.at(3, 2), fin(4)); // 2y ≤ 4
            // Deduced by strong coherence:
            assert_eq!(*m.at(3, 1), fin(2)); // y − x ≤ 2
        });
        // The odd unary bound rounds to 2 for the integer policy.
        let (num, den, included) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!((num, den, included), (coeff(2), coeff(1), true));
    }

    #[test]
    fn test_rational_octagon_keeps_half_bound() {
        let mut oct = RatOct::universe(2);
        oct.refine_with_constraint(&Constraint::le(var(0) + var(1), cst(2))).unwrap();
        oct.refine_with_constraint(&Constraint::le(var(0) - var(1), cst(1))).unwrap();
        oct.refine_with_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        oct.refine_with_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        let (num, den, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!((num, den), (coeff(3), coeff(2)));
    }

    #[test]
    fn test_add_constraint_rejects() {
        let mut oct = IntOct::universe(3);
        // Not an octagonal difference.
        let err = oct.add_constraint(&Constraint::le(var(0) + var(1) + var(2), cst(1)));
        assert!(matches!(err, Err(DomainError::NonShapeConstraint { .. })));
        // Non-trivial strict inequalities are refused.
        let err = oct.add_constraint(&Constraint::gt(var(0), cst(0)));
        assert!(matches!(err, Err(DomainError::StrictInequality { .. })));
        // But refine silently ignores the former and relaxes the latter.
        oct.refine_with_constraint(&Constraint::le(var(0) + var(1) + var(2), cst(1))).unwrap();
        oct.refine_with_constraint(&Constraint::gt(var(0), cst(0))).unwrap();
        assert!(!oct.is_empty().unwrap());
        assert!(oct.minimize(&var(0)).unwrap().is_some());
    }

    #[test]
    fn test_emptiness_from_contradiction() {
        let mut oct = IntOct::universe(1);
        oct.add_constraint(&Constraint::le(var(0), cst(0))).unwrap();
        oct.add_constraint(&Constraint::ge(var(0), cst(1))).unwrap();
        assert!(oct.is_empty().unwrap());
        assert!(oct.ok());
    }

    #[test]
    fn test_closure_idempotent() {
        let oct = e2_octagon();
        oct.strong_closure_assign().unwrap();
        let once = oct.clone();
        oct.strong_closure_assign().unwrap();
        assert_eq!(oct, once);
    }

    #[test]
    fn test_contains_and_strictly_contains() {
        let big = unit_square();
        let mut small = unit_square();
        small.add_constraint(&Constraint::le(var(0), cst(0))).unwrap();
        assert!(big.contains(&small).unwrap());
        assert!(big.strictly_contains(&small).unwrap());
        assert!(!small.contains(&big).unwrap());
        // The empty shape is contained in everything.
        let empty = IntOct::empty(2);
        assert!(small.contains(&empty).unwrap());
        assert!(!empty.contains(&small).unwrap());
    }

    #[test]
    fn test_intersection_and_join() {
        let mut a = IntOct::universe(1);
        a.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        a.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        let mut b = IntOct::universe(1);
        b.add_constraint(&Constraint::le(var(0), cst(3))).unwrap();
        b.add_constraint(&Constraint::ge(var(0), cst(2))).unwrap();

        let mut meet = a.clone();
        meet.intersection_assign(&b).unwrap();
        assert!(meet.is_empty().unwrap());

        let mut join = a.clone();
        join.upper_bound_assign(&b).unwrap();
        let (num, _, _) = join.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(3));
        let (num, _, _) = join.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        // Join of closed operands stays closed.
        assert!(join.ok());

        // Meet absorbs empty.
        let mut c = a.clone();
        c.intersection_assign(&IntOct::empty(1)).unwrap();
        assert!(c.is_empty().unwrap());
    }

    #[test]
    fn test_e6_exact_join() {
        // Two adjacent unit squares join exactly into a rectangle.
        let s = unit_square();
        let mut t = IntOct::universe(2);
        t.add_constraint(&Constraint::ge(var(0), cst(1))).unwrap();
        t.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        t.add_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        t.add_constraint(&Constraint::le(var(1), cst(1))).unwrap();

        let mut joined = s.clone();
        assert!(joined.upper_bound_assign_if_exact(&t).unwrap());
        let mut rectangle = IntOct::universe(2);
        rectangle.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        rectangle.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        rectangle.add_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        rectangle.add_constraint(&Constraint::le(var(1), cst(1))).unwrap();
        assert_eq!(joined, rectangle);

        // Two separated half-lines do not join exactly.
        let mut u = IntOct::universe(1);
        u.add_constraint(&Constraint::le(var(0), cst(0))).unwrap();
        let mut v = IntOct::universe(1);
        v.add_constraint(&Constraint::ge(var(0), cst(2))).unwrap();
        let before = u.clone();
        assert!(!u.upper_bound_assign_if_exact(&v).unwrap());
        assert_eq!(u, before);
    }

    #[test]
    fn test_difference_assign() {
        // [0, 2] ∖ [1, 2] = [0, 1].
        let mut a = IntOct::universe(1);
        a.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        a.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        let mut b = IntOct::universe(1);
        b.add_constraint(&Constraint::ge(var(0), cst(1))).unwrap();
        b.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        a.difference_assign(&b).unwrap();
        let (num, _, _) = a.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
        let (num, _, _) = a.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));

        // Subtracting a superset empties the shape.
        let mut c = b.clone();
        let mut big = IntOct::universe(1);
        big.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        c.difference_assign(&big).unwrap();
        assert!(c.is_empty().unwrap());
    }

    #[test]
    fn test_affine_image_constant_and_translation() {
        let mut oct = unit_square();
        // x ← 5.
        oct.affine_image(x(0), &cst(5), &coeff(1)).unwrap();
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(5));
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(5));

        // y is untouched.
        let (num, _, _) = oct.maximize(&var(1)).unwrap().unwrap();
        assert_eq!(num, coeff(1));

        // x ← x + 2 on a fresh square.
        let mut oct = unit_square();
        oct.affine_image(x(0), &(var(0) + cst(2)), &coeff(1)).unwrap();
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(2));
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(3));
        assert!(oct.ok());
    }

    #[test]
    fn test_affine_image_negation_and_alias() {
        // x ← −x on [0, 1] gives [−1, 0].
        let mut oct = unit_square();
        oct.affine_image(x(0), &(-var(0)), &coeff(1)).unwrap();
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(-1));

        // x ← y + 1 makes x − y = 1 exactly.
        let mut oct = unit_square();
        oct.affine_image(x(0), &(var(1) + cst(1)), &coeff(1)).unwrap();
        let (num, _, _) = oct.maximize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(1));
        let (num, _, _) = oct.minimize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(1));
    }

    #[test]
    fn test_affine_image_general_case() {
        // x ← x + y on the unit square: x ranges over [0, 2].
        let mut oct = unit_square();
        oct.affine_image(x(0), &(var(0) + var(1)), &coeff(1)).unwrap();
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(2));
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        // The deduced binary bound x − y ≤ 1 survives.
        let (num, _, _) = oct.maximize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(1));
    }

    #[test]
    fn test_affine_preimage_inverts_image() {
        // Invertible map: v ← v + y, then its preimage restores the square.
        let original = unit_square();
        original.strong_closure_assign().unwrap();
        let mut oct = original.clone();
        let e = var(0) + var(1);
        oct.affine_image(x(0), &e, &coeff(1)).unwrap();
        oct.affine_preimage(x(0), &e, &coeff(1)).unwrap();
        assert_eq!(oct, original);
    }

    #[test]
    fn test_affine_preimage_non_invertible() {
        // x ← y + 1: the preimage constrains nothing but y.
        let mut oct = unit_square();
        oct.add_constraint(&Constraint::le(var(0), cst(0))).unwrap(); // x = 0
        // preimage of x ← y + 1 requires y + 1 ∈ [x-bounds] = {0}: empty
        // intersection with y ∈ [0, 1] gives y = −1: empty.
        oct.affine_preimage(x(0), &(var(1) + cst(1)), &coeff(1)).unwrap();
        assert!(oct.is_empty().unwrap());
    }

    #[test]
    fn test_generalized_affine_image() {
        // x ≤ y over the unit square: x keeps only the upper relation.
        let mut oct = unit_square();
        oct.generalized_affine_image(x(0), RelSym::LessOrEqual, &var(1), &coeff(1))
            .unwrap();
        // x − y ≤ 0 holds, x is unbounded below.
        let (num, _, _) = oct.maximize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        assert!(oct.minimize(&var(0)).unwrap().is_none());
    }

    #[test]
    fn test_bounded_affine_image() {
        // 0 ≤ x' ≤ y over the unit square.
        let mut oct = unit_square();
        oct.bounded_affine_image(x(0), &cst(0), &var(1), &coeff(1)).unwrap();
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = oct.maximize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(0));
    }

    #[test]
    fn test_cc76_extrapolation_stop_points() {
        let stops: Vec<BigInt> = vec![coeff(0), coeff(4)];
        // Widening {x ≤ 1} (new) against {x ≤ 0} (old) with stop 4
        // lands on the stop: the doubled cell grows 0 → 2 → 4.
        let mut newer = IntOct::universe(1);
        newer.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        let mut older = IntOct::universe(1);
        older.add_constraint(&Constraint::le(var(0), cst(0))).unwrap();
        newer.cc76_extrapolation_assign_with_stop_points(&older, &stops, None).unwrap();
        let (num, _, _) = newer.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(2));

        // Without a stop point above, the bound flies to +∞.
        let mut newer = IntOct::universe(1);
        newer.add_constraint(&Constraint::le(var(0), cst(4))).unwrap();
        let mut older = IntOct::universe(1);
        older.add_constraint(&Constraint::le(var(0), cst(3))).unwrap();
        newer.cc76_extrapolation_assign_with_stop_points(&older, &stops, None).unwrap();
        assert!(newer.maximize(&var(0)).unwrap().is_none());
    }

    #[test]
    fn test_cc76_tokens_delay_widening() {
        let mut newer = IntOct::universe(1);
        newer.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        let mut older = IntOct::universe(1);
        older.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        let mut tokens = 1u32;
        newer.cc76_extrapolation_assign(&older, Some(&mut tokens)).unwrap();
        // The token was spent instead of widening.
        assert_eq!(tokens, 0);
        let (num, _, _) = newer.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(2));
    }

    #[test]
    fn test_bhmz05_widening() {
        let mut newer = IntOct::universe(1);
        newer.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        newer.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        let mut older = IntOct::universe(1);
        older.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        older.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        newer.bhmz05_widening_assign(&older, None).unwrap();
        // The unstable upper bound is gone, the stable lower bound stays.
        assert!(newer.maximize(&var(0)).unwrap().is_none());
        let (num, _, _) = newer.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
    }

    #[test]
    fn test_limited_extrapolation_keeps_satisfied_constraints() {
        let mut newer = IntOct::universe(1);
        newer.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        newer.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        let mut older = IntOct::universe(1);
        older.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        older.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::le(var(0), cst(10)));
        newer.limited_cc76_extrapolation_assign(&older, &cs, None).unwrap();
        // Plain widening would lose the upper bound; the limiting
        // constraint x ≤ 10 was satisfied pre-widening and is kept.
        let (num, _, _) = newer.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(10));
    }

    #[test]
    fn test_cc76_narrowing() {
        let mut smaller = IntOct::universe(1);
        smaller.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        smaller.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        let mut larger = IntOct::universe(1);
        larger.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        larger.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        smaller.cc76_narrowing_assign(&larger).unwrap();
        assert_eq!(smaller, larger);
    }

    #[test]
    fn test_dimension_operations() {
        let mut oct = unit_square();
        oct.add_space_dimensions_and_embed(1);
        assert_eq!(oct.space_dimension(), 3);
        assert!(oct.maximize(&var(2)).unwrap().is_none());

        oct.add_space_dimensions_and_project(1);
        assert_eq!(oct.space_dimension(), 4);
        let (num, _, _) = oct.maximize(&var(3)).unwrap().unwrap();
        assert_eq!(num, coeff(0));

        let vs: VariableSet = [x(2), x(3)].into_iter().collect();
        oct.remove_space_dimensions(&vs).unwrap();
        assert_eq!(oct.space_dimension(), 2);
        assert_eq!(oct, unit_square());

        // Swap the two remaining dimensions.
        let mut swap = DimensionMap::undefined(2);
        swap.map(0, 1).unwrap();
        swap.map(1, 0).unwrap();
        let mut asym = unit_square();
        asym.add_constraint(&Constraint::le(var(0), cst(0))).unwrap();
        asym.map_space_dimensions(&swap).unwrap();
        let (num, _, _) = asym.maximize(&var(1)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = asym.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
    }

    #[test]
    fn test_concatenate_assign() {
        let mut a = IntOct::universe(1);
        a.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        let mut b = IntOct::universe(1);
        b.add_constraint(&Constraint::le(var(0), cst(2))).unwrap();
        a.concatenate_assign(&b).unwrap();
        assert_eq!(a.space_dimension(), 2);
        let (num, _, _) = a.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
        let (num, _, _) = a.maximize(&var(1)).unwrap().unwrap();
        assert_eq!(num, coeff(2));
        // No cross-block relation was invented.
        assert!(a.maximize(&(var(0) + var(1))).unwrap().is_some());
        assert!(a.minimize(&(var(0) + var(1))).unwrap().is_none());
    }

    #[test]
    fn test_expand_and_fold() {
        let mut oct = IntOct::universe(2);
        oct.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        oct.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        oct.expand_space_dimension(x(0), 1).unwrap();
        assert_eq!(oct.space_dimension(), 3);
        let (num, _, _) = oct.maximize(&var(2)).unwrap().unwrap();
        assert_eq!(num, coeff(1));

        // Fold a looser dimension back in: bounds join.
        let mut oct = IntOct::universe(2);
        oct.add_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        oct.add_constraint(&Constraint::le(var(0), cst(1))).unwrap();
        oct.add_constraint(&Constraint::ge(var(1), cst(0))).unwrap();
        oct.add_constraint(&Constraint::le(var(1), cst(3))).unwrap();
        let folded: VariableSet = [x(1)].into_iter().collect();
        oct.fold_space_dimensions(&folded, x(0)).unwrap();
        assert_eq!(oct.space_dimension(), 1);
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(3));
    }

    #[test]
    fn test_unconstrain() {
        let mut oct = unit_square();
        oct.unconstrain(x(0)).unwrap();
        assert!(oct.maximize(&var(0)).unwrap().is_none());
        let (num, _, _) = oct.maximize(&var(1)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
    }

    #[test]
    fn test_time_elapse() {
        // Flowing the unit square along the point (1, 0) frees x upward.
        let square = unit_square();
        let mut flowed = square.clone();
        let mut direction = IntOct::universe(2);
        direction.add_constraint(&Constraint::eq(var(0), cst(1))).unwrap();
        direction.add_constraint(&Constraint::eq(var(1), cst(0))).unwrap();
        flowed.time_elapse_assign(&direction).unwrap();
        assert!(flowed.maximize(&var(0)).unwrap().is_none());
        let (num, _, _) = flowed.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = flowed.maximize(&var(1)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
        assert!(flowed.contains(&square).unwrap());
    }

    #[test]
    fn test_from_generators_segment() {
        let mut gs = GeneratorSystem::new();
        gs.insert(Generator::point(LinearExpr::new(), 1).unwrap());
        gs.insert(Generator::point(var(0) + var(1), 1).unwrap());
        let oct = IntOct::from_generators(&gs).unwrap();
        let (num, _, _) = oct.maximize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = oct.minimize(&(var(0) - var(1))).unwrap().unwrap();
        assert_eq!(num, coeff(0));
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(1));

        // The midpoint is subsumed.
        let mid = Generator::point(var(0) + var(1), 2).unwrap();
        assert!(oct
            .relation_with_generator(&mid)
            .unwrap()
            .implies(GeneratorRelation::subsumes()));

        // A ray makes the shape unbounded.
        let mut gs = GeneratorSystem::new();
        gs.insert(Generator::point(LinearExpr::new(), 1).unwrap());
        gs.insert(Generator::ray(var(0)).unwrap());
        let oct = IntOct::from_generators(&gs).unwrap();
        assert!(oct.maximize(&var(0)).unwrap().is_none());
        let (num, _, _) = oct.minimize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(0));

        // A system without points is rejected.
        let mut gs = GeneratorSystem::new();
        gs.insert(Generator::ray(var(0)).unwrap());
        assert!(matches!(
            IntOct::from_generators(&gs),
            Err(DomainError::NoPointGenerator { .. })
        ));
    }

    #[test]
    fn test_from_box() {
        let mut bbox = BoundingBox::universe(2);
        bbox.set_lower(0, BigRational::from_integer(coeff(0)), true);
        bbox.set_upper(0, BigRational::new(coeff(3), coeff(2)), true);
        let oct = RatOct::from_box(&bbox);
        let (num, den, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!((num, den), (coeff(3), coeff(2)));
        assert!(oct.maximize(&var(1)).unwrap().is_none());
    }

    #[test]
    fn test_from_congruences() {
        let cgs = vec![
            Congruence::equality(var(0) - cst(1)),
            Congruence::new(var(1), 2), // proper congruence: ignored
        ];
        let oct = IntOct::from_congruences(&cgs);
        let (num, _, _) = oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!(num, coeff(1));
        assert!(oct.maximize(&var(1)).unwrap().is_none());
    }

    #[test]
    fn test_approximation_of() {
        let mut rat = RatOct::universe(1);
        rat.refine_with_constraint(&Constraint::le(
            var(0) * coeff(2),
            cst(3),
        ))
        .unwrap(); // x ≤ 3/2
        let int_oct: IntOct = Octagon::approximation_of(&rat);
        // The doubled cell keeps 2x ≤ 3; the unary maximum rounds up.
        let (num, den, _) = int_oct.maximize(&var(0)).unwrap().unwrap();
        assert_eq!((num, den), (coeff(2), coeff(1)));
        assert!(int_oct.contains(&Octagon::approximation_of(&rat)).unwrap());
    }

    #[test]
    fn test_relations_with_constraint() {
        let square = unit_square();
        // x ≥ 0 is satisfied everywhere (and saturated on an edge).
        let rel = square.relation_with_constraint(&Constraint::ge(var(0), cst(0))).unwrap();
        assert!(rel.implies(ConstraintRelation::is_included()));
        // x ≥ 2 misses the square entirely.
        let rel = square.relation_with_constraint(&Constraint::ge(var(0), cst(2))).unwrap();
        assert!(rel.implies(ConstraintRelation::is_disjoint()));
        // 2x ≥ 1 cuts through it.
        let rel = square
            .relation_with_constraint(&Constraint::ge(var(0) * coeff(2), cst(1)))
            .unwrap();
        assert!(rel.implies(ConstraintRelation::strictly_intersects()));
    }

    #[test]
    fn test_relation_with_congruence() {
        let mut oct = IntOct::universe(1);
        oct.add_constraint(&Constraint::eq(var(0), cst(4))).unwrap();
        // x = 4 satisfies x ≡ 0 (mod 2).
        let rel = oct.relation_with_congruence(&Congruence::new(var(0), 2)).unwrap();
        assert!(rel.implies(ConstraintRelation::is_included()));
        // but not x ≡ 0 (mod 3).
        let rel = oct.relation_with_congruence(&Congruence::new(var(0), 3)).unwrap();
        assert!(rel.implies(ConstraintRelation::is_disjoint()));
        // An interval wider than the modulus intersects.
        let square = unit_square();
        let rel = square.relation_with_congruence(&Congruence::new(var(0), 1)).unwrap();
        assert!(rel.implies(ConstraintRelation::strictly_intersects()));
    }

    #[test]
    fn test_contains_integer_point_tight_coherence() {
        // 1 ≤ 2x ≤ 1 pins x = 1/2: no integer point.
        let mut oct = IntOct::universe(1);
        oct.add_constraint(&Constraint::eq(var(0) * coeff(2), cst(1))).unwrap();
        assert!(!oct.is_empty().unwrap());
        assert!(!oct.contains_integer_point().unwrap());

        // The same shape over rationals goes through integer tightening.
        let mut rat = RatOct::universe(1);
        rat.add_constraint(&Constraint::eq(var(0) * coeff(2), cst(1))).unwrap();
        assert!(!rat.contains_integer_point().unwrap());

        // The unit square has integer corners.
        assert!(unit_square().contains_integer_point().unwrap());
    }

    #[test]
    fn test_strong_reduction_round_trips_through_closure() {
        let oct = e2_octagon();
        oct.strong_closure_assign().unwrap();
        let closed = oct.clone();
        oct.strong_reduction_assign().unwrap();
        // Reduction drops entries; closure restores them all.
        oct.strong_closure_assign().unwrap();
        assert_eq!(oct, closed);
        assert!(oct.ok());
    }

    #[test]
    fn test_affine_dimension() {
        let mut oct = IntOct::universe(2);
        assert_eq!(oct.affine_dimension().unwrap(), 2);
        oct.add_constraint(&Constraint::eq(var(0), cst(1))).unwrap();
        assert_eq!(oct.affine_dimension().unwrap(), 1);
        oct.add_constraint(&Constraint::eq(var(1), var(0) + cst(1))).unwrap();
        assert_eq!(oct.affine_dimension().unwrap(), 0);
        assert!(oct.is_discrete().unwrap());
        assert!(IntOct::empty(3).affine_dimension().unwrap() == 0);
    }

    #[test]
    fn test_ascii_round_trip() {
        let oct = e2_octagon();
        oct.strong_closure_assign().unwrap();
        let mut buf = Vec::new();
        oct.ascii_dump(&mut buf).unwrap();
        let mut reader = std::io::BufReader::new(&buf[..]);
        let loaded = IntOct::ascii_load(&mut reader).unwrap();
        assert_eq!(loaded, oct);
        let mut buf2 = Vec::new();
        loaded.ascii_dump(&mut buf2).unwrap();
        assert_eq!(buf, buf2);

        // Empty and zero-dimensional shapes round-trip too.
        for oct in [IntOct::empty(2), IntOct::universe(0), IntOct::empty(0)] {
            let mut buf = Vec::new();
            oct.ascii_dump(&mut buf).unwrap();
            let mut reader = std::io::BufReader::new(&buf[..]);
            assert_eq!(IntOct::ascii_load(&mut reader).unwrap(), oct);
        }
    }

    #[test]
    fn test_dimension_mismatch_errors() {
        let mut a = IntOct::universe(2);
        let b = IntOct::universe(3);
        assert!(matches!(
            a.intersection_assign(&b),
            Err(DomainError::DimensionIncompatible { .. })
        ));
        assert!(matches!(
            a.affine_image(x(5), &cst(0), &coeff(1)),
            Err(DomainError::DimensionIncompatible { .. })
        ));
        assert!(matches!(
            a.affine_image(x(0), &cst(0), &coeff(0)),
            Err(DomainError::ZeroDenominator { .. })
        ));
    }

    #[test]
    fn test_watchdog_abandons_closure() {
        let oct = e2_octagon();
        Watchdog::arm(1);
        let result = oct.strong_closure_assign();
        Watchdog::disarm();
        assert!(matches!(result, Err(DomainError::Abandoned)));
    }
}
