//! Two-phase primal simplex over exact rationals.
//!
//! ## Formulation
//!
//! The feasible region is a [`ConstraintSystem`] of equalities and
//! non-strict inequalities (strict inequalities are rejected). The tableau
//! is kept in integers: every row is a constraint `b + Σ aⱼ·colⱼ = 0` and
//! each basic variable's value is recovered as a ratio of two entries, so
//! the arithmetic stays exact throughout.
//!
//! ```text
//! column 0                inhomogeneous term
//! columns 1 ..= n         problem variables
//! next k columns          negative parts of split variables
//! next s columns          slack variables (one per inequality)
//! last column             sign of the working cost function
//! ```
//!
//! Variables unconstrained in sign are **split** into two non-negative
//! parts; inequalities receive slack variables; the extra cost-sign column
//! lets minimisation ride on the same pivoting code via a sign flip.
//!
//! ## Pivoting
//!
//! Column selection uses an exact steepest-edge rule by default: every
//! candidate is normalized by the squared Euclidean norm of its column,
//! computed with integer lcm factors so no square root is ever taken. The
//! textbook first-improving-column rule is available as a fallback through
//! [`Pricing`]. Row selection takes the minimal positive ratio with ties
//! broken on the smallest basis index (Bland), which guarantees
//! termination under either pricing.

use std::collections::BTreeMap;

use num_integer::Integer;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use adom_core::{
    Coefficient, Constraint, ConstraintSystem, DomainError, DomainResult, Generator, LinearExpr,
    Variable, Watchdog,
};

use crate::tableau::Row;

/// Hard cap on tableau columns; exceeding it raises `LengthError`.
const MAX_TABLEAU_COLUMNS: usize = usize::MAX / 4;

/// Pivots between progress reports on the debug log.
const NOISY_PIVOT_PERIOD: u64 = 200;

/// Solver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LpStatus {
    /// Nothing computed yet.
    Unsolved,
    /// The feasible region is empty.
    Unsatisfiable,
    /// A feasible point is known; optimality not yet established.
    Satisfiable,
    /// The objective is unbounded over the (non-empty) feasible region.
    Unbounded,
    /// An optimal point is known.
    Optimized,
    /// Constraints were added after a solve; feasibility must be recomputed.
    PartiallySatisfiable,
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizationMode {
    Maximization,
    Minimization,
}

/// Column-selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pricing {
    /// Exact steepest-edge (default).
    SteepestEdge,
    /// First column whose reduced cost has the right sign.
    TextbookFirst,
}

/// A linear program over exact rationals.
#[derive(Debug, Clone)]
pub struct LpProblem {
    space_dim: usize,
    input_cs: ConstraintSystem,
    input_obj: LinearExpr,
    opt_mode: OptimizationMode,
    pricing: Pricing,
    status: LpStatus,
    tableau: Vec<Row>,
    working_cost: Row,
    base: Vec<usize>,
    /// Variables split into positive/negative parts: var index ↦ split index.
    split_map: BTreeMap<usize, usize>,
    last_witness: Option<Generator>,
    pivot_count: u64,
}

enum TableauOutcome {
    Unfeasible,
    Unbounded,
    Ready,
}

impl LpProblem {
    /// An unconstrained problem of the given dimension with zero objective.
    pub fn new(space_dim: usize) -> Self {
        LpProblem {
            space_dim,
            input_cs: ConstraintSystem::with_space_dimension(space_dim),
            input_obj: LinearExpr::new(),
            opt_mode: OptimizationMode::Maximization,
            pricing: Pricing::SteepestEdge,
            status: LpStatus::Unsolved,
            tableau: Vec::new(),
            working_cost: Row::default(),
            base: Vec::new(),
            split_map: BTreeMap::new(),
            last_witness: None,
            pivot_count: 0,
        }
    }

    /// Build a problem from a constraint system, objective and mode.
    pub fn from_parts(
        space_dim: usize,
        cs: ConstraintSystem,
        objective: LinearExpr,
        mode: OptimizationMode,
    ) -> DomainResult<Self> {
        if cs.space_dimension() > space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "LpProblem::from_parts(dim, cs, obj, mode)",
                this_dim: space_dim,
                required_dim: cs.space_dimension(),
            });
        }
        if objective.space_dimension() > space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "LpProblem::from_parts(dim, cs, obj, mode)",
                this_dim: space_dim,
                required_dim: objective.space_dimension(),
            });
        }
        if cs.has_strict_inequalities() {
            return Err(DomainError::StrictInequality {
                op: "LpProblem::from_parts(dim, cs, obj, mode)",
            });
        }
        let mut lp = LpProblem::new(space_dim);
        lp.input_cs = cs;
        lp.input_obj = objective;
        lp.opt_mode = mode;
        Ok(lp)
    }

    pub fn space_dimension(&self) -> usize {
        self.space_dim
    }

    pub fn status(&self) -> LpStatus {
        self.status
    }

    pub fn constraints(&self) -> &ConstraintSystem {
        &self.input_cs
    }

    pub fn objective_function(&self) -> &LinearExpr {
        &self.input_obj
    }

    pub fn optimization_mode(&self) -> OptimizationMode {
        self.opt_mode
    }

    pub fn set_pricing(&mut self, pricing: Pricing) {
        self.pricing = pricing;
    }

    /// Add one constraint; feasibility must be re-established.
    pub fn add_constraint(&mut self, c: Constraint) -> DomainResult<()> {
        if c.is_strict_inequality() {
            return Err(DomainError::StrictInequality { op: "add_constraint(c)" });
        }
        self.space_dim = self.space_dim.max(c.space_dimension());
        self.input_cs.insert(c);
        self.status = match self.status {
            LpStatus::Unsatisfiable => LpStatus::Unsatisfiable,
            _ => LpStatus::PartiallySatisfiable,
        };
        Ok(())
    }

    /// Add a whole system of constraints.
    pub fn add_constraints(&mut self, cs: &ConstraintSystem) -> DomainResult<()> {
        for c in cs {
            self.add_constraint(c.clone())?;
        }
        Ok(())
    }

    /// Replace the objective; any known feasible point stays valid.
    pub fn set_objective_function(&mut self, objective: LinearExpr) -> DomainResult<()> {
        if objective.space_dimension() > self.space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "set_objective_function(obj)",
                this_dim: self.space_dim,
                required_dim: objective.space_dimension(),
            });
        }
        self.input_obj = objective;
        self.demote_to_satisfiable();
        Ok(())
    }

    /// Switch between maximisation and minimisation.
    pub fn set_optimization_mode(&mut self, mode: OptimizationMode) {
        if mode != self.opt_mode {
            self.opt_mode = mode;
            self.demote_to_satisfiable();
        }
    }

    fn demote_to_satisfiable(&mut self) {
        self.status = match self.status {
            LpStatus::Optimized | LpStatus::Unbounded | LpStatus::Satisfiable => {
                LpStatus::Satisfiable
            }
            other => other,
        };
    }

    /// Is the feasible region non-empty? Caches a feasible witness.
    pub fn is_satisfiable(&mut self) -> DomainResult<bool> {
        match self.status {
            LpStatus::Unsatisfiable => Ok(false),
            LpStatus::Satisfiable | LpStatus::Unbounded | LpStatus::Optimized => Ok(true),
            LpStatus::Unsolved | LpStatus::PartiallySatisfiable => self.solve_feasibility(),
        }
    }

    /// Run the solver to completion.
    pub fn solve(&mut self) -> DomainResult<LpStatus> {
        match self.status {
            LpStatus::Unsatisfiable | LpStatus::Unbounded | LpStatus::Optimized => Ok(self.status),
            LpStatus::Satisfiable => {
                self.second_phase()?;
                Ok(self.status)
            }
            LpStatus::Unsolved | LpStatus::PartiallySatisfiable => {
                if !self.solve_feasibility()? {
                    return Ok(LpStatus::Unsatisfiable);
                }
                if self.status == LpStatus::Satisfiable {
                    self.second_phase()?;
                }
                Ok(self.status)
            }
        }
    }

    /// A feasible point, available once satisfiability is established.
    pub fn feasible_point(&self) -> DomainResult<&Generator> {
        match self.status {
            LpStatus::Satisfiable | LpStatus::Unbounded | LpStatus::Optimized => {
                Ok(self.last_witness.as_ref().expect("witness cached with status"))
            }
            _ => Err(DomainError::Other(
                "feasible_point(): the problem is not known to be satisfiable".into(),
            )),
        }
    }

    /// The optimal point, available once the status is `Optimized`.
    pub fn optimizing_point(&self) -> DomainResult<&Generator> {
        if self.status == LpStatus::Optimized {
            Ok(self.last_witness.as_ref().expect("witness cached with status"))
        } else {
            Err(DomainError::Other(
                "optimizing_point(): the problem has not been optimized".into(),
            ))
        }
    }

    /// Evaluate the objective at a point, as a reduced `(num, den)` pair.
    pub fn evaluate_objective_function(
        &self,
        point: &Generator,
    ) -> DomainResult<(Coefficient, Coefficient)> {
        if point.space_dimension() > self.space_dim {
            return Err(DomainError::DimensionIncompatible {
                op: "evaluate_objective_function(p)",
                this_dim: self.space_dim,
                required_dim: point.space_dimension(),
            });
        }
        if !point.is_point() {
            return Err(DomainError::Other(
                "evaluate_objective_function(p): p is not a point".into(),
            ));
        }
        let divisor = point.divisor().clone();
        let mut num = self.input_obj.inhomogeneous_term() * &divisor;
        for (v, c) in self.input_obj.terms() {
            num += c * point.coefficient(v);
        }
        let g = num.gcd(&divisor);
        Ok((num / &g, divisor / &g))
    }

    /// The optimal objective value as a reduced `(num, den)` pair.
    pub fn optimal_value(&self) -> DomainResult<(Coefficient, Coefficient)> {
        let point = self.optimizing_point()?.clone();
        self.evaluate_objective_function(&point)
    }

    // --- tableau construction -------------------------------------------

    fn solve_feasibility(&mut self) -> DomainResult<bool> {
        self.tableau.clear();
        self.split_map.clear();
        self.base.clear();
        self.pivot_count = 0;

        match self.compute_tableau()? {
            TableauOutcome::Unfeasible => {
                self.status = LpStatus::Unsatisfiable;
                Ok(false)
            }
            TableauOutcome::Unbounded => {
                self.last_witness = Some(Generator::origin());
                self.status = LpStatus::Unbounded;
                Ok(true)
            }
            TableauOutcome::Ready => {
                if self.tableau.is_empty() {
                    // Only non-negativity constraints: the origin is optimal.
                    self.last_witness = Some(Generator::origin());
                    self.status = LpStatus::Optimized;
                    return Ok(true);
                }
                self.base = vec![0; self.tableau.len()];
                self.prepare_first_phase()?;
                let reached_optimum = self.compute_simplex()?;
                debug!(pivots = self.pivot_count, "simplex: first phase ended");
                if !reached_optimum || !self.working_cost[0].is_zero() {
                    self.status = LpStatus::Unsatisfiable;
                    return Ok(false);
                }
                self.last_witness = Some(self.compute_witness_point());
                self.status = LpStatus::Satisfiable;
                self.erase_artificials();
                Ok(true)
            }
        }
    }

    /// Build the initial tableau from the input constraints.
    ///
    /// Detects trivially-false rows (unfeasible), drops trivially-true ones
    /// and plain non-negativity constraints, decides which variables must be
    /// split, and allocates slack columns for the surviving inequalities.
    fn compute_tableau(&mut self) -> DomainResult<TableauOutcome> {
        let n = self.space_dim;
        let cs: Vec<&Constraint> = self.input_cs.iter().collect();
        let m = cs.len();

        let mut tableau_num_rows = m;
        let mut tableau_num_cols = 2 * n + 1;
        let mut num_slack_variables = 0usize;

        let mut is_tableau_constraint = vec![true; m];
        let mut nonnegative_variable = vec![false; n];

        for (i, c) in cs.iter().enumerate() {
            let mut nonzero_index = None;
            let mut many_nonzero = false;
            for (v, _) in c.expr().terms() {
                if nonzero_index.is_some() {
                    many_nonzero = true;
                    if c.is_inequality() {
                        num_slack_variables += 1;
                    }
                    break;
                }
                nonzero_index = Some(v.index());
            }
            if many_nonzero {
                continue;
            }

            match nonzero_index {
                None => {
                    // Trivially true or trivially false.
                    if c.is_inconsistent() {
                        return Ok(TableauOutcome::Unfeasible);
                    }
                    is_tableau_constraint[i] = false;
                    tableau_num_rows -= 1;
                }
                Some(var) => {
                    // One non-zero coefficient: a·v + b ⋈ 0.
                    let sgn_a = c.coefficient(Variable::new(var)).signum();
                    let sgn_b = c.inhomogeneous_term().signum();
                    if sgn_a == sgn_b {
                        // Keep the row, slack if inequality.
                        if c.is_inequality() {
                            num_slack_variables += 1;
                        }
                    } else if c.is_equality() {
                        // a > 0 by canonicalization, b ≤ 0: v is fixed ≥ 0.
                        if !nonnegative_variable[var] {
                            nonnegative_variable[var] = true;
                            tableau_num_cols -= 1;
                        }
                    } else if sgn_b.is_negative() {
                        // a > 0, b < 0: v ≥ -b/a > 0.
                        if !nonnegative_variable[var] {
                            nonnegative_variable[var] = true;
                            tableau_num_cols -= 1;
                        }
                        num_slack_variables += 1;
                    } else if sgn_a.is_positive() {
                        // a > 0, b = 0: plain non-negativity, drop the row.
                        if !nonnegative_variable[var] {
                            nonnegative_variable[var] = true;
                            tableau_num_cols -= 1;
                        }
                        is_tableau_constraint[i] = false;
                        tableau_num_rows -= 1;
                    } else {
                        num_slack_variables += 1;
                    }
                }
            }
        }

        tableau_num_cols += num_slack_variables;

        // Split every variable not known to be non-negative.
        let mut split_index = n;
        for (var, nonneg) in nonnegative_variable.iter().enumerate() {
            if !nonneg {
                self.split_map.insert(var, split_index);
                split_index += 1;
            }
        }

        if tableau_num_rows > 0 {
            if tableau_num_cols > MAX_TABLEAU_COLUMNS {
                return Err(DomainError::LengthError { op: "LpProblem::solve" });
            }
            self.tableau = vec![Row::zeros(tableau_num_cols); tableau_num_rows];
        }

        // Insert the surviving constraints, slack columns from the right.
        let mut k = tableau_num_rows;
        let mut slack_index = tableau_num_cols;
        for (i, c) in cs.iter().enumerate().rev() {
            if !is_tableau_constraint[i] {
                continue;
            }
            k -= 1;
            let row = &mut self.tableau[k];
            row[0] = c.inhomogeneous_term().clone();
            for (v, a) in c.expr().terms() {
                row[v.index() + 1] = a.clone();
            }
            if c.is_inequality() {
                slack_index -= 1;
                row[slack_index] = Coefficient::from(-1);
            }
        }

        // Mirror split variables into their negative-part columns.
        for (&orig, &split) in &self.split_map {
            for row in &mut self.tableau {
                row[split + 1] = -row[orig + 1].clone();
            }
        }

        if self.tableau.is_empty() {
            // The feasible region is the non-negative orthant (split
            // variables are genuinely free): unbounded as soon as the
            // objective can grow in the feasible directions.
            let unbounded = self.input_obj.terms().any(|(v, c)| {
                let free = self.split_map.contains_key(&v.index());
                match self.opt_mode {
                    OptimizationMode::Maximization => {
                        if free {
                            !c.is_zero()
                        } else {
                            c.is_positive()
                        }
                    }
                    OptimizationMode::Minimization => {
                        if free {
                            !c.is_zero()
                        } else {
                            c.is_negative()
                        }
                    }
                }
            });
            if unbounded {
                return Ok(TableauOutcome::Unbounded);
            }
        }

        Ok(TableauOutcome::Ready)
    }

    /// Install the phase-1 artificial basis and cost function.
    fn prepare_first_phase(&mut self) -> DomainResult<()> {
        // Make every inhomogeneous term non-positive so the artificial
        // variables enter the base with value ≥ 0 and coefficient 1.
        let old_n_cols = self.tableau[0].len();
        for row in &mut self.tableau {
            if row[0].is_positive() {
                row.negate();
            }
        }

        let n_rows = self.tableau.len();
        if MAX_TABLEAU_COLUMNS - old_n_cols <= n_rows {
            return Err(DomainError::LengthError { op: "LpProblem::solve" });
        }
        let new_n_cols = old_n_cols + n_rows + 1;
        for row in &mut self.tableau {
            row.grow(new_n_cols);
        }
        self.working_cost = Row::zeros(new_n_cols);

        for (i, row) in self.tableau.iter_mut().enumerate() {
            let j = old_n_cols + i;
            row[j] = Coefficient::from(1);
            self.working_cost[j] = Coefficient::from(-1);
            self.base[i] = j;
        }

        // Record the sign of the cost function in the extra column.
        self.working_cost[new_n_cols - 1] = Coefficient::from(1);

        // Express the cost in terms of the artificial basis.
        for i in (0..n_rows).rev() {
            let base_i = self.base[i];
            if !self.working_cost[base_i].is_zero() {
                self.working_cost.linear_combine(&self.tableau[i], base_i);
            }
        }
        Ok(())
    }

    /// Drive the artificial variables out of the base and drop their
    /// columns, keeping the cost-sign cell in the (new) last column.
    fn erase_artificials(&mut self) {
        let last_index = self.tableau[0].len() - 1;
        let mut n_rows = self.tableau.len();
        let first_artificial = last_index - n_rows;

        let mut i = 0;
        while i < n_rows {
            if self.base[i] >= first_artificial {
                // Search for an original column to enter the base.
                let mut redundant = true;
                for j in (1..first_artificial).rev() {
                    if !self.tableau[i][j].is_zero() {
                        self.swap_base(j, i);
                        redundant = false;
                        break;
                    }
                }
                if redundant {
                    // The constraint is redundant: drop the row.
                    n_rows -= 1;
                    self.tableau.swap(i, n_rows);
                    self.tableau.truncate(n_rows);
                    self.base[i] = self.base[n_rows];
                    self.base.truncate(n_rows);
                    continue;
                }
            }
            i += 1;
        }

        let new_n_cols = first_artificial + 1;
        let new_last = first_artificial;
        for row in &mut self.tableau {
            row.shrink(new_n_cols);
            row[new_last] = Coefficient::zero();
        }
        let sign = self.working_cost[last_index].clone();
        self.working_cost.shrink(new_n_cols);
        self.working_cost[new_last] = sign;
    }

    /// Optimize the real objective from the feasible basis of phase 1.
    fn second_phase(&mut self) -> DomainResult<()> {
        debug_assert_eq!(self.status, LpStatus::Satisfiable);
        if self.tableau.is_empty() {
            // Feasibility came from an empty tableau; the witness stands.
            self.status = LpStatus::Optimized;
            return Ok(());
        }

        let cost_size = self.working_cost.len();
        let mut new_cost = Row::zeros(cost_size);
        new_cost[0] = self.input_obj.inhomogeneous_term().clone();
        for (v, c) in self.input_obj.terms() {
            new_cost[v.index() + 1] = c.clone();
        }
        if self.opt_mode == OptimizationMode::Minimization {
            new_cost.negate();
        }
        self.working_cost = new_cost;
        self.working_cost[cost_size - 1] = Coefficient::from(1);

        // Split the variables of the cost function.
        for (&orig, &split) in &self.split_map {
            self.working_cost[split + 1] = -self.working_cost[orig + 1].clone();
        }

        // Express the cost in terms of the current base.
        for i in (0..self.tableau.len()).rev() {
            let base_i = self.base[i];
            if !self.working_cost[base_i].is_zero() {
                self.working_cost.linear_combine(&self.tableau[i], base_i);
            }
        }

        let reached_optimum = self.compute_simplex()?;
        debug!(pivots = self.pivot_count, "simplex: second phase ended");
        if reached_optimum {
            self.last_witness = Some(self.compute_witness_point());
            self.status = LpStatus::Optimized;
        } else {
            self.status = LpStatus::Unbounded;
        }
        Ok(())
    }

    // --- pivoting --------------------------------------------------------

    /// Entering column by exact steepest edge; 0 when optimal.
    fn steepest_edge(&self) -> usize {
        let n_rows = self.tableau.len();
        debug_assert_eq!(n_rows, self.base.len());

        // lcm of the basis coefficients, and per-row normalization factors.
        let mut lcm_basis = Coefficient::from(1);
        for i in 0..n_rows {
            lcm_basis = lcm_basis.lcm(&self.tableau[i][self.base[i]]);
        }
        let norm_factor: Vec<Coefficient> = (0..n_rows)
            .map(|i| &lcm_basis / &self.tableau[i][self.base[i]])
            .collect();
        let squared_lcm_basis = &lcm_basis * &lcm_basis;

        let cost_sign = self.working_cost[self.working_cost.len() - 1].signum();
        let mut entering_index = 0;
        let mut current_num = Coefficient::zero();
        let mut current_den = Coefficient::zero();
        for j in (1..self.tableau[0].len() - 1).rev() {
            let cost_j = &self.working_cost[j];
            if cost_j.signum() != cost_sign || cost_j.is_zero() {
                continue;
            }
            // Square of the reduced cost over the squared column norm; the
            // `1` of the textbook formula becomes `lcm_basis²` because the
            // tableau is scaled by integers.
            let challenger_num = cost_j * cost_j;
            let mut challenger_den = squared_lcm_basis.clone();
            for i in 0..n_rows {
                let t_ij = &self.tableau[i][j];
                if !t_ij.is_zero() {
                    let scalar = t_ij * &norm_factor[i];
                    challenger_den += &scalar * &scalar;
                }
            }
            if entering_index == 0
                || &challenger_num * &current_den > &current_num * &challenger_den
            {
                current_num = challenger_num;
                current_den = challenger_den;
                entering_index = j;
            }
        }
        entering_index
    }

    /// Entering column by the textbook rule; 0 when optimal.
    fn textbook_entering_index(&self) -> usize {
        let cost_sign_index = self.working_cost.len() - 1;
        let cost_sign = self.working_cost[cost_sign_index].signum();
        debug_assert!(!cost_sign.is_zero());
        for i in 1..cost_sign_index {
            if self.working_cost[i].signum() == cost_sign {
                return i;
            }
        }
        0
    }

    /// Exiting row: minimal positive ratio, Bland tie-break.
    ///
    /// Returns `tableau.len()` when the column is unbounded.
    fn exiting_base_index(&self, entering: usize) -> usize {
        let n_rows = self.tableau.len();
        let mut exiting = n_rows;
        for (i, t_i) in self.tableau.iter().enumerate() {
            let num_sign = t_i[entering].signum();
            if !num_sign.is_zero() && num_sign == t_i[self.base[i]].signum() {
                exiting = i;
                break;
            }
        }
        if exiting == n_rows {
            return n_rows;
        }

        for i in (exiting + 1)..n_rows {
            let t_i = &self.tableau[i];
            let t_ie = &t_i[entering];
            let t_ib = &t_i[self.base[i]];
            if t_ie.is_zero() || t_ie.signum() != t_ib.signum() {
                continue;
            }
            // Compare |t_e[0]/t_ee| against |t_i[0]/t_ie| by lcm scaling.
            let t_e = &self.tableau[exiting];
            let t_ee = &t_e[entering];
            let lcm = t_ee.lcm(t_ie);
            let current_min = ((&lcm / t_ee) * &t_e[0]).abs();
            let challenger = ((&lcm / t_ie) * &t_i[0]).abs();
            match current_min.cmp(&challenger) {
                std::cmp::Ordering::Greater => exiting = i,
                std::cmp::Ordering::Equal if self.base[i] < self.base[exiting] => exiting = i,
                _ => {}
            }
        }
        exiting
    }

    /// Pivot: combine every row (and the cost) against the exiting row.
    fn swap_base(&mut self, entering: usize, exiting_row: usize) {
        let pivot_row = self.tableau[exiting_row].clone();
        for (i, row) in self.tableau.iter_mut().enumerate() {
            if i != exiting_row && !row[entering].is_zero() {
                row.linear_combine(&pivot_row, entering);
            }
        }
        if !self.working_cost[entering].is_zero() {
            self.working_cost.linear_combine(&pivot_row, entering);
        }
        self.base[exiting_row] = entering;
    }

    /// Pivot until optimality (`true`) or unboundedness (`false`).
    fn compute_simplex(&mut self) -> DomainResult<bool> {
        let n_rows = self.tableau.len();
        loop {
            Watchdog::tick(1)?;
            let entering = match self.pricing {
                Pricing::SteepestEdge => self.steepest_edge(),
                Pricing::TextbookFirst => self.textbook_entering_index(),
            };
            if entering == 0 {
                return Ok(true);
            }
            let exiting = self.exiting_base_index(entering);
            if exiting == n_rows {
                return Ok(false);
            }
            trace!(entering, exiting, "simplex: pivot");
            self.swap_base(entering, exiting);
            self.pivot_count += 1;
            if self.pivot_count % NOISY_PIVOT_PERIOD == 0 {
                debug!(pivots = self.pivot_count, "simplex: still pivoting");
            }
        }
    }

    // --- witness extraction ---------------------------------------------

    fn row_in_base(&self, var_index: usize) -> Option<usize> {
        self.base.iter().position(|&b| b == var_index)
    }

    /// Read the current vertex out of the tableau.
    ///
    /// For every original variable: look up its basis row (value 0 when
    /// non-basic), subtract the negative part if it was split, then scale
    /// everything to the lcm of the denominators.
    fn compute_witness_point(&self) -> Generator {
        let dim = self.space_dim;
        let mut num = vec![Coefficient::zero(); dim];
        let mut den = vec![Coefficient::from(1); dim];

        let read_value = |row: &Row, col: usize| -> (Coefficient, Coefficient) {
            if row[col].is_positive() {
                (-row[0].clone(), row[col].clone())
            } else {
                (row[0].clone(), -row[col].clone())
            }
        };

        for i in 0..dim {
            if let Some(r) = self.row_in_base(i + 1) {
                let (n_i, d_i) = read_value(&self.tableau[r], i + 1);
                num[i] = n_i;
                den[i] = d_i;
            }
            if let Some(&split) = self.split_map.get(&i) {
                if let Some(r) = self.row_in_base(split + 1) {
                    let (split_num, split_den) = read_value(&self.tableau[r], split + 1);
                    // num[i]/den[i] - split_num/split_den over the lcm.
                    let lcm = den[i].lcm(&split_den);
                    let scale_i = &lcm / &den[i];
                    let scale_s = &lcm / &split_den;
                    num[i] = &num[i] * &scale_i - &split_num * &scale_s;
                    den[i] = if num[i].is_zero() { Coefficient::from(1) } else { lcm };
                }
            }
        }

        let mut lcm = Coefficient::from(1);
        for d in &den {
            lcm = lcm.lcm(d);
        }
        let mut expr = LinearExpr::new();
        for i in 0..dim {
            let scaled = &num[i] * (&lcm / &den[i]);
            expr.add_mul_assign(scaled, Variable::new(i));
        }
        Generator::point(expr, lcm).expect("lcm of divisors is positive")
    }
}
