//! The Mesnard–Serebrenik and Podelski–Rybalchenko encodings.
//!
//! Both build Farkas-multiplier systems whose satisfiability witnesses the
//! existence of an affine ranking function.
//!
//! ## Variable layouts
//!
//! MS input: one system over `x'₁ … x'ₙ` (dimensions `0 … n−1`) and
//! `x₁ … xₙ` (dimensions `n … 2n−1`). Output systems:
//!
//! ```text
//! μ₁ … μₙ        dimensions 0 … n−1
//! μ₀             dimension n
//! y₁ … yₘ        dimensions n+1 … n+m
//! z₁ … zₘ₊₂      following (offset by m when both systems share a space)
//! ```
//!
//! PR input: `cs_before` over `x₁ … xₙ` (dimensions `0 … n−1`) and
//! `cs_after` over `x'` (dimensions `0 … n−1`) and `x` (dimensions
//! `n … 2n−1`). Output system: `u₃` on `0 … s−1`, `u₂` on `s … s+r−1`,
//! `u₁` on `s+r … s+2r−1`, with the inhomogeneous expression returned
//! separately (a value ≤ −1 entails termination).

use num_traits::Zero;
use tracing::debug;

use adom_core::{
    Constraint, ConstraintKind, ConstraintSystem, DomainError, DomainResult, LinearExpr, Variable,
};

/// Rewrite a loop description into pure `≥` inequalities: equalities are
/// split into two inequalities, strict inequalities are refused.
pub(crate) fn expand_to_inequalities(
    cs: &ConstraintSystem,
    op: &'static str,
) -> DomainResult<ConstraintSystem> {
    let mut out = ConstraintSystem::with_space_dimension(cs.space_dimension());
    for c in cs {
        match c.kind() {
            ConstraintKind::Greater => {
                return Err(DomainError::StrictInequality { op });
            }
            ConstraintKind::GreaterOrEqual => out.insert(c.clone()),
            ConstraintKind::Equal => {
                out.insert(Constraint::ge_zero(c.expr().clone()));
                out.insert(Constraint::ge_zero(-c.expr().clone()));
            }
        }
    }
    Ok(out)
}

/// The two MS multiplier systems; `second` is `None` when both were built
/// into the same space (the satisfiability form).
pub(crate) struct MsSystems {
    pub first: ConstraintSystem,
    pub second: Option<ConstraintSystem>,
}

/// Build the MS systems for a loop over `2n` dimensions.
///
/// The first system asserts the existence of multipliers `y ≥ 0` with
/// `yᵀA` matching `μ(x) − μ(x')` and `−yᵀb ≥ 1` (strict decrease); the
/// second asserts multipliers `z ≥ 0` bounding `μ(x) + μ₀` from below
/// (the two extra `z` components split the sign-free `μ₀`).
pub(crate) fn fill_constraint_systems_ms(cs: &ConstraintSystem, combined: bool) -> MsSystems {
    debug_assert!(cs.space_dimension() % 2 == 0);
    let n = cs.space_dimension() / 2;
    let m = cs.len();

    let y_begin = n + 1;
    let z_begin = y_begin + if combined { m } else { 0 };

    let mut first = ConstraintSystem::new();
    let mut second = ConstraintSystem::new();

    let mut y_le = LinearExpr::new();
    let mut z_le = LinearExpr::new();
    let mut y_les: Vec<LinearExpr> = vec![LinearExpr::new(); 2 * n];
    let mut z_les: Vec<LinearExpr> = vec![LinearExpr::new(); 2 * n + 1];

    for (idx, c) in cs.iter().enumerate() {
        let vy = Variable::new(y_begin + idx);
        let vz = Variable::new(z_begin + idx);
        first.insert(Constraint::ge_zero(LinearExpr::from_variable(vy)));
        second.insert(Constraint::ge_zero(LinearExpr::from_variable(vz)));
        let b_i = c.inhomogeneous_term().clone();
        if !b_i.is_zero() {
            y_le.sub_mul_assign(b_i.clone(), vy);
            z_le.sub_mul_assign(b_i, vz);
        }
        for (v, a) in c.expr().terms() {
            y_les[v.index()].add_mul_assign(a.clone(), vy);
            z_les[v.index()].add_mul_assign(a.clone(), vz);
        }
    }

    // The sign-free μ₀ is split into the two trailing z components.
    let z_pos = Variable::new(z_begin + m);
    let z_neg = Variable::new(z_begin + m + 1);
    z_le.add_mul_assign(1, z_pos);
    z_le.sub_mul_assign(1, z_neg);
    z_les[2 * n].add_mul_assign(1, z_pos);
    z_les[2 * n].sub_mul_assign(1, z_neg);
    second.insert(Constraint::ge_zero(LinearExpr::from_variable(z_pos)));
    second.insert(Constraint::ge_zero(LinearExpr::from_variable(z_neg)));

    // Decrease by at least one, boundedness from below.
    first.insert(Constraint::ge(y_le, LinearExpr::constant(1)));
    second.insert(Constraint::ge_zero(z_le));

    // Unprimed columns equal μ, primed columns equal −μ (first system)
    // and vanish (second system).
    for j in (n..2 * n).rev() {
        let mu = LinearExpr::from_variable(Variable::new(j - n));
        first.insert(Constraint::eq(y_les[j].clone(), mu.clone()));
        second.insert(Constraint::eq(z_les[j].clone(), mu));
    }
    for j in (0..n).rev() {
        let minus_mu = -LinearExpr::from_variable(Variable::new(j));
        first.insert(Constraint::eq(y_les[j].clone(), minus_mu));
        second.insert(Constraint::eq(z_les[j].clone(), LinearExpr::new()));
    }
    second.insert(Constraint::eq(
        z_les[2 * n].clone(),
        LinearExpr::from_variable(Variable::new(n)),
    ));

    debug!(
        n,
        m,
        combined,
        first_len = first.len(),
        second_len = second.len(),
        "built MS multiplier systems"
    );

    if combined {
        for c in &second {
            first.insert(c.clone());
        }
        MsSystems { first, second: None }
    } else {
        MsSystems { first, second: Some(second) }
    }
}

/// Build the PR dual system. Returns the equality/positivity system over
/// `(u₃, u₂, u₁)` and the expression `u₂·b_B + u₃·b_C` whose negativity
/// witnesses termination.
pub(crate) fn fill_constraint_system_pr(
    cs_before: &ConstraintSystem,
    cs_after: &ConstraintSystem,
) -> (ConstraintSystem, LinearExpr) {
    debug_assert!(cs_after.space_dimension() % 2 == 0);
    let n = cs_before.space_dimension();
    let r = cs_before.len();
    let s = cs_after.len();
    let m = r + s;

    let mut cs_out = ConstraintSystem::new();
    let mut le_out = LinearExpr::new();
    let mut les_eq: Vec<LinearExpr> = vec![LinearExpr::new(); 2 * n];

    for (idx, c) in cs_before.iter().enumerate() {
        let u1_i = Variable::new(m + idx);
        let u2_i = Variable::new(s + idx);
        for (v, a) in c.expr().terms() {
            let j = v.index();
            // (u₁ − u₂)·E_B on the unprimed block, u₂·E_B on the shifted one.
            les_eq[j].add_mul_assign(a.clone(), u1_i);
            les_eq[j].sub_mul_assign(a.clone(), u2_i);
            les_eq[j + n].add_mul_assign(a.clone(), u2_i);
        }
        let b = c.inhomogeneous_term().clone();
        if !b.is_zero() {
            le_out.add_mul_assign(b, u2_i);
        }
    }

    for (idx, c) in cs_after.iter().enumerate() {
        let u3_i = Variable::new(idx);
        for j in 0..n {
            let a_c = c.coefficient(Variable::new(j + n));
            if !a_c.is_zero() {
                les_eq[j].sub_mul_assign(a_c.clone(), u3_i);
                les_eq[j + n].add_mul_assign(a_c, u3_i);
            }
            let ap_c = c.coefficient(Variable::new(j));
            if !ap_c.is_zero() {
                les_eq[j + n].add_mul_assign(ap_c, u3_i);
            }
        }
        let b = c.inhomogeneous_term().clone();
        if !b.is_zero() {
            le_out.add_mul_assign(b, u3_i);
        }
    }

    for i in (0..s + 2 * r).rev() {
        cs_out.insert(Constraint::ge_zero(LinearExpr::from_variable(Variable::new(i))));
    }
    for le in les_eq {
        cs_out.insert(Constraint::eq(le, LinearExpr::new()));
    }

    debug!(n, r, s, out_len = cs_out.len(), "built PR dual system");
    (cs_out, le_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: usize) -> LinearExpr {
        LinearExpr::from_variable(Variable::new(i))
    }

    #[test]
    fn test_expand_splits_equalities() {
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(1), var(0) + LinearExpr::constant(1)));
        cs.insert(Constraint::ge(var(1), LinearExpr::constant(0)));
        let out = expand_to_inequalities(&cs, "test").unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| !c.is_equality()));

        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::gt(var(0), LinearExpr::constant(0)));
        assert!(matches!(
            expand_to_inequalities(&cs, "test"),
            Err(DomainError::StrictInequality { .. })
        ));
    }

    #[test]
    fn test_ms_layout_dimensions() {
        // Decrementing loop: x = x' + 1, x ≥ 0 (x' at 0, x at 1; n = 1).
        let mut cs = ConstraintSystem::new();
        cs.insert(Constraint::eq(var(1), var(0) + LinearExpr::constant(1)));
        cs.insert(Constraint::ge(var(1), LinearExpr::constant(0)));
        let cs = expand_to_inequalities(&cs, "test").unwrap();
        let m = cs.len();
        let n = 1;

        let combined = fill_constraint_systems_ms(&cs, true);
        assert!(combined.second.is_none());
        // μ₁ at 0, μ₀ at 1, y at 2..=1+m, z at 2+m..=3+2m.
        assert_eq!(combined.first.space_dimension(), n + 1 + 2 * m + 2);

        let split = fill_constraint_systems_ms(&cs, false);
        let second = split.second.unwrap();
        assert_eq!(split.first.space_dimension(), n + 1 + m);
        assert_eq!(second.space_dimension(), n + 1 + m + 2);
    }

    #[test]
    fn test_pr_layout_dimensions() {
        // before: x ≥ 0 (r = 1); after: x' = x − 1 (s = 2 once expanded).
        let mut before = ConstraintSystem::new();
        before.insert(Constraint::ge(var(0), LinearExpr::constant(0)));
        let mut after = ConstraintSystem::new();
        after.insert(Constraint::eq(var(0), var(1) - LinearExpr::constant(1)));
        let before = expand_to_inequalities(&before, "test").unwrap();
        let after = expand_to_inequalities(&after, "test").unwrap();

        let (cs_out, le_out) = fill_constraint_system_pr(&before, &after);
        let (r, s, n) = (1, 2, 1);
        // u₃ | u₂ | u₁ positivity plus 2n equalities.
        assert_eq!(cs_out.len(), s + 2 * r + 2 * n);
        assert!(le_out.space_dimension() <= s + 2 * r);
    }
}
