//! # adom-termination: Linear Ranking-Function Synthesis
//!
//! Decides termination of linear loops by synthesizing affine ranking
//! functions through the Mesnard–Serebrenik (MS) and Podelski–Rybalchenko
//! (PR) encodings. Satisfiability queries are dispatched to the exact
//! simplex in `adom-lp`; the "all ranking functions" queries are answered
//! by projecting the multiplier systems onto the μ coordinates
//! (see [`RankingCone`]).
//!
//! ## Input conventions
//!
//! - MS takes a single system over the primed variables `x'₁ … x'ₙ`
//!   (dimensions `0 … n−1`) and the unprimed `x₁ … xₙ` (dimensions
//!   `n … 2n−1`).
//! - PR takes the pre-state system `cs_before` over `x` (dimensions
//!   `0 … n−1`) and the transition system `cs_after` over `x'`
//!   (dimensions `0 … n−1`) and `x` (dimensions `n … 2n−1`).
//!
//! Equalities are expanded into inequality pairs; strict inequalities are
//! refused. A returned ranking function is a point generator whose
//! coordinate `i < n` is the coefficient of `xᵢ₊₁` and whose coordinate
//! `n` (MS only; PR ranking functions have zero intercept) is `μ₀`.
//!
//! ## Example
//!
//! ```ignore
//! // x = x' + 1, x ≥ 0: the classic decrementing loop terminates.
//! assert!(termination_test_ms(&loop_cs)?);
//! let mu = one_affine_ranking_function_ms(&loop_cs)?.unwrap();
//! ```

use num_traits::Zero;
use tracing::debug;

use adom_core::{
    Constraint, ConstraintSystem, DomainError, DomainResult, Generator, LinearExpr, Variable,
};
use adom_lp::{LpProblem, OptimizationMode};

mod encode;
pub mod project;

use encode::{expand_to_inequalities, fill_constraint_system_pr, fill_constraint_systems_ms};
pub use project::RankingCone;

fn prepare_ms(cs: &ConstraintSystem, op: &'static str) -> DomainResult<ConstraintSystem> {
    let expanded = expand_to_inequalities(cs, op)?;
    if expanded.space_dimension() % 2 != 0 {
        return Err(DomainError::InvalidSpaceDimension {
            op,
            dim: expanded.space_dimension(),
        });
    }
    Ok(expanded)
}

fn prepare_pr(
    cs_before: &ConstraintSystem,
    cs_after: &ConstraintSystem,
    op: &'static str,
) -> DomainResult<(ConstraintSystem, ConstraintSystem)> {
    let before = expand_to_inequalities(cs_before, op)?;
    let after = expand_to_inequalities(cs_after, op)?;
    let n = before
        .space_dimension()
        .max(after.space_dimension().div_ceil(2));
    let mut before_n = ConstraintSystem::with_space_dimension(n);
    for c in &before {
        before_n.insert(c.clone());
    }
    let mut after_n = ConstraintSystem::with_space_dimension(2 * n);
    for c in &after {
        after_n.insert(c.clone());
    }
    Ok((before_n, after_n))
}

fn satisfiable(cs: ConstraintSystem) -> DomainResult<bool> {
    let dim = cs.space_dimension();
    let mut lp = LpProblem::from_parts(dim, cs, LinearExpr::new(), OptimizationMode::Maximization)?;
    lp.is_satisfiable()
}

/// MS termination test: does any affine ranking function exist?
pub fn termination_test_ms(cs: &ConstraintSystem) -> DomainResult<bool> {
    let cs = prepare_ms(cs, "termination_test_MS(cs)")?;
    let systems = fill_constraint_systems_ms(&cs, true);
    let result = satisfiable(systems.first)?;
    debug!(result, "MS termination test");
    Ok(result)
}

/// One affine ranking function per the MS encoding, if any.
///
/// The returned point carries `μ₁ … μₙ` in coordinates `0 … n−1` and `μ₀`
/// in coordinate `n`, over a common positive divisor.
pub fn one_affine_ranking_function_ms(
    cs: &ConstraintSystem,
) -> DomainResult<Option<Generator>> {
    let cs = prepare_ms(cs, "one_affine_ranking_function_MS(cs)")?;
    let n = cs.space_dimension() / 2;
    let systems = fill_constraint_systems_ms(&cs, true);
    let dim = systems.first.space_dimension();
    let mut lp = LpProblem::from_parts(
        dim,
        systems.first,
        LinearExpr::new(),
        OptimizationMode::Maximization,
    )?;
    if !lp.is_satisfiable()? {
        return Ok(None);
    }
    let fp = lp.feasible_point()?.clone();
    let mut le = LinearExpr::new();
    for i in (0..=n).rev() {
        le.add_mul_assign(fp.coefficient(Variable::new(i)), Variable::new(i));
    }
    Ok(Some(Generator::point(le, fp.divisor().clone())?))
}

/// The space of *all* affine ranking functions per the MS encoding:
/// the intersection of the projected decrease and boundedness systems,
/// over `μ₁ … μₙ` (dimensions `0 … n−1`) and `μ₀` (dimension `n`).
pub fn all_affine_ranking_functions_ms(cs: &ConstraintSystem) -> DomainResult<RankingCone> {
    let cs = prepare_ms(cs, "all_affine_ranking_functions_MS(cs)")?;
    let n = cs.space_dimension() / 2;
    let systems = fill_constraint_systems_ms(&cs, false);
    let second = systems.second.expect("split systems were requested");

    let ph1_dim = systems.first.space_dimension().max(n + 1);
    let mut ph1 = RankingCone::from_constraints(ph1_dim, systems.first);
    ph1.eliminate_higher_dimensions(n)?;
    ph1.embed(1); // μ₀ is unconstrained by the decrease system.

    let ph2_dim = second.space_dimension().max(n + 1);
    let mut ph2 = RankingCone::from_constraints(ph2_dim, second);
    ph2.eliminate_higher_dimensions(n + 1)?;

    ph1.intersection_assign(&ph2);
    Ok(ph1)
}

fn pr_satisfiability_system(
    before: &ConstraintSystem,
    after: &ConstraintSystem,
) -> ConstraintSystem {
    let (mut cs_out, le_out) = fill_constraint_system_pr(before, after);
    // Turn the minimization problem into satisfiability.
    cs_out.insert(Constraint::le(le_out, LinearExpr::constant(-1)));
    cs_out
}

/// PR termination test over a pre-state and a transition system.
pub fn termination_test_pr(
    cs_before: &ConstraintSystem,
    cs_after: &ConstraintSystem,
) -> DomainResult<bool> {
    let (before, after) = prepare_pr(cs_before, cs_after, "termination_test_PR(cs_before, cs_after)")?;
    let result = satisfiable(pr_satisfiability_system(&before, &after))?;
    debug!(result, "PR termination test");
    Ok(result)
}

/// One affine ranking function per the PR encoding: the product of the
/// feasible `u₃` with the primed transition block (zero intercept).
pub fn one_affine_ranking_function_pr(
    cs_before: &ConstraintSystem,
    cs_after: &ConstraintSystem,
) -> DomainResult<Option<Generator>> {
    let (before, after) = prepare_pr(
        cs_before,
        cs_after,
        "one_affine_ranking_function_PR(cs_before, cs_after)",
    )?;
    let n = before.space_dimension();
    let cs_out = pr_satisfiability_system(&before, &after);
    let dim = cs_out.space_dimension();
    let mut lp =
        LpProblem::from_parts(dim, cs_out, LinearExpr::new(), OptimizationMode::Maximization)?;
    if !lp.is_satisfiable()? {
        return Ok(None);
    }
    let fp = lp.feasible_point()?.clone();
    // μ = u₃ · E'_C; the positive divisor of the witness only rescales.
    let mut mu = LinearExpr::new();
    for (idx, c) in after.iter().enumerate() {
        let fp_i = fp.coefficient(Variable::new(idx));
        if fp_i.is_zero() {
            continue;
        }
        for j in 0..n {
            let k = &fp_i * c.coefficient(Variable::new(j));
            mu.sub_mul_assign(k, Variable::new(j));
        }
    }
    Ok(Some(Generator::point(mu, 1)?))
}

/// The space of all affine ranking functions per the PR encoding, over
/// `μ₁ … μₙ` (dimensions `0 … n−1`) and the always-zero `μ₀`
/// (dimension `n`).
pub fn all_affine_ranking_functions_pr(
    cs_before: &ConstraintSystem,
    cs_after: &ConstraintSystem,
) -> DomainResult<RankingCone> {
    let (before, after) = prepare_pr(
        cs_before,
        cs_after,
        "all_affine_ranking_functions_PR(cs_before, cs_after)",
    )?;
    let n = before.space_dimension();
    let (r, s) = (before.len(), after.len());
    let shift = n + 1;

    // The dual system, with every multiplier dimension lifted above the
    // μ block so the projection can strip them off the top.
    let raw = pr_satisfiability_system(&before, &after);
    let mut cs_out = ConstraintSystem::with_space_dimension(shift + s + 2 * r);
    for c in &raw {
        cs_out.insert(Constraint::new(c.expr().shifted(shift), c.kind()));
    }
    // Link the explicit μ coordinates to u₃ · E'_C.
    for j in 0..n {
        let mut link = LinearExpr::from_variable(Variable::new(j));
        for (idx, c) in after.iter().enumerate() {
            let ap = c.coefficient(Variable::new(j));
            if !ap.is_zero() {
                link.add_mul_assign(ap, Variable::new(shift + idx));
            }
        }
        cs_out.insert(Constraint::eq(link, LinearExpr::new()));
    }
    // PR ranking functions have a zero intercept.
    cs_out.insert(Constraint::eq(
        LinearExpr::from_variable(Variable::new(n)),
        LinearExpr::new(),
    ));

    let mut cone = RankingCone::from_constraints(shift + s + 2 * r, cs_out);
    cone.eliminate_higher_dimensions(shift)?;
    Ok(cone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use num_traits::Signed;

    fn var(i: usize) -> LinearExpr {
        LinearExpr::from_variable(Variable::new(i))
    }

    fn cst(n: i64) -> LinearExpr {
        LinearExpr::constant(n)
    }

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    /// The decrementing loop of scenario E5: x = x' + 1, x ≥ 0
    /// (x' on dimension 0, x on dimension 1).
    fn decrementing_loop() -> ConstraintSystem {
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(1), var(0) + cst(1)));
        cs.insert(Constraint::ge(var(1), cst(0)));
        cs
    }

    /// The diverging loop: x' = x + 1, x ≥ 0.
    fn incrementing_loop() -> ConstraintSystem {
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(0), var(1) + cst(1)));
        cs.insert(Constraint::ge(var(1), cst(0)));
        cs
    }

    #[test]
    fn test_e5_ms_terminates() {
        assert!(termination_test_ms(&decrementing_loop()).unwrap());
    }

    #[test]
    fn test_e5_ms_ranking_function_is_sound() {
        let mu = one_affine_ranking_function_ms(&decrementing_loop())
            .unwrap()
            .expect("the decrementing loop has a ranking function");
        let mu1 = mu.coefficient(Variable::new(0));
        let mu0 = mu.coefficient(Variable::new(1));
        let d = mu.divisor().clone();
        // Decrease: μ(x) − μ(x') = μ₁·(x − x') = μ₁ ≥ 1.
        assert!(mu1 >= d);
        // Boundedness on the pre-states x ≥ 0: μ₁, μ₀ ≥ 0.
        assert!(!mu1.is_negative() && !mu0.is_negative());
    }

    #[test]
    fn test_ms_diverging_loop_fails() {
        assert!(!termination_test_ms(&incrementing_loop()).unwrap());
        assert!(one_affine_ranking_function_ms(&incrementing_loop())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ms_all_ranking_functions() {
        let cone = all_affine_ranking_functions_ms(&decrementing_loop()).unwrap();
        assert_eq!(cone.space_dimension(), 2);
        // μ(x) = x is a ranking function; μ(x) = −x is not.
        assert!(cone.contains_point(&[q(1), q(0)]));
        assert!(!cone.contains_point(&[q(-1), q(0)]));
        // Scaling up stays inside the cone.
        assert!(cone.contains_point(&[q(7), q(3)]));

        let mut cone = all_affine_ranking_functions_ms(&incrementing_loop()).unwrap();
        assert!(cone.is_empty().unwrap());
    }

    /// PR form of the decrementing loop: before {x ≥ 0}, after
    /// {x' = x − 1} with x' on dimension 0 and x on dimension 1.
    fn pr_decrementing() -> (ConstraintSystem, ConstraintSystem) {
        let mut before = ConstraintSystem::new();
        before.insert(Constraint::ge(var(0), cst(0)));
        let mut after = ConstraintSystem::new();
        after.insert(Constraint::eq(var(0), var(1) - cst(1)));
        (before, after)
    }

    fn pr_incrementing() -> (ConstraintSystem, ConstraintSystem) {
        let mut before = ConstraintSystem::new();
        before.insert(Constraint::ge(var(0), cst(0)));
        let mut after = ConstraintSystem::new();
        after.insert(Constraint::eq(var(0), var(1) + cst(1)));
        (before, after)
    }

    #[test]
    fn test_pr_terminates() {
        let (before, after) = pr_decrementing();
        assert!(termination_test_pr(&before, &after).unwrap());
    }

    #[test]
    fn test_pr_ranking_function_is_sound() {
        let (before, after) = pr_decrementing();
        let mu = one_affine_ranking_function_pr(&before, &after)
            .unwrap()
            .expect("the decrementing loop has a ranking function");
        // μ = μ₁·x with μ₁ ≥ 1: decrease over x' = x − 1 is exactly μ₁.
        let mu1 = mu.coefficient(Variable::new(0));
        assert!(mu1 >= BigInt::from(1) * mu.divisor());
    }

    #[test]
    fn test_pr_diverging_loop_fails() {
        let (before, after) = pr_incrementing();
        assert!(!termination_test_pr(&before, &after).unwrap());
        assert!(one_affine_ranking_function_pr(&before, &after)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_pr_all_ranking_functions() {
        let (before, after) = pr_decrementing();
        let cone = all_affine_ranking_functions_pr(&before, &after).unwrap();
        assert_eq!(cone.space_dimension(), 2);
        assert!(cone.contains_point(&[q(1), q(0)]));
        assert!(!cone.contains_point(&[q(-1), q(0)]));
        // The PR intercept is pinned to zero.
        assert!(!cone.contains_point(&[q(1), q(1)]));
    }

    #[test]
    fn test_strict_inequalities_rejected() {
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::gt(var(1), var(0)));
        assert!(matches!(
            termination_test_ms(&cs),
            Err(DomainError::StrictInequality { .. })
        ));
    }

    #[test]
    fn test_two_variable_lexicographic_style_loop() {
        // x = x' + 1, x ≥ 0, y = y' (y untouched): μ(x, y) = x still works.
        // Layout: x' at 0, y' at 1, x at 2, y at 3.
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(2), var(0) + cst(1)));
        cs.insert(Constraint::ge(var(2), cst(0)));
        cs.insert(Constraint::eq(var(3), var(1)));
        assert!(termination_test_ms(&cs).unwrap());
        let cone = all_affine_ranking_functions_ms(&cs).unwrap();
        assert_eq!(cone.space_dimension(), 3);
        assert!(cone.contains_point(&[q(1), q(0), q(0)]));
    }
}
