//! Randomized invariants of the shape engines.
//!
//! Shapes are built from random octagonal / bounded-difference constraint
//! lists and checked against the algebraic laws the fixpoint engines rely
//! on: closure idempotence and fixpoint saturation, meet/join algebra,
//! inclusion monotonicity, affine-image invertibility and persistence
//! round trips.

use std::io::BufReader;

use proptest::prelude::*;

use adom_core::{Coefficient, Constraint, LinearExpr, Rounding, Variable};
use adom_lp::LpProblem;
use adom_shapes::{coherent, row_size, IntBdShape, IntOctagon};

const DIM: usize = 3;

/// A raw octagonal (or, with `sj = 0`, unary) constraint description.
#[derive(Debug, Clone)]
struct RawConstraint {
    i: usize,
    j: usize,
    si: i8,
    sj: i8,
    bound: i64,
}

fn raw_constraint() -> impl Strategy<Value = RawConstraint> {
    (0..DIM, 0..DIM, prop_oneof![Just(-1i8), Just(1i8)], -1i8..=1i8, -8i64..8i64).prop_map(
        |(i, j, si, sj, bound)| RawConstraint { i, j, si, sj, bound },
    )
}

fn raw_constraints() -> impl Strategy<Value = Vec<RawConstraint>> {
    prop::collection::vec(raw_constraint(), 0..8)
}

fn to_constraint(raw: &RawConstraint) -> Constraint {
    let mut e = LinearExpr::new();
    e.add_mul_assign(Coefficient::from(raw.si), Variable::new(raw.i));
    if raw.j != raw.i && raw.sj != 0 {
        e.add_mul_assign(Coefficient::from(raw.sj), Variable::new(raw.j));
    }
    Constraint::le(e, LinearExpr::constant(raw.bound))
}

fn octagon_from(raws: &[RawConstraint]) -> IntOctagon {
    let mut oct = IntOctagon::universe(DIM);
    for raw in raws {
        oct.refine_with_constraint(&to_constraint(raw)).unwrap();
    }
    oct
}

fn bds_from(raws: &[RawConstraint]) -> IntBdShape {
    let mut bds = IntBdShape::universe(DIM);
    for raw in raws {
        // Non-BD constraints are silently dropped by design.
        bds.refine_with_constraint(&to_constraint(raw)).unwrap();
    }
    bds
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn closure_is_idempotent(raws in raw_constraints()) {
        let oct = octagon_from(&raws);
        oct.strong_closure_assign().unwrap();
        let once = oct.clone();
        oct.strong_closure_assign().unwrap();
        prop_assert!(oct == once);
        prop_assert!(oct.ok());

        let bds = bds_from(&raws);
        bds.shortest_path_closure_assign().unwrap();
        let once = bds.clone();
        bds.shortest_path_closure_assign().unwrap();
        prop_assert!(bds == once);
        prop_assert!(bds.ok());
    }

    #[test]
    fn closure_saturates_triangles(raws in raw_constraints()) {
        let oct = octagon_from(&raws);
        if !oct.is_empty().unwrap() {
            let n = 2 * DIM;
            oct.with_matrix_view(|m| {
                for i in 0..n {
                    for j in 0..row_size(i) {
                        if i == j {
                            continue;
                        }
                        for k in 0..n {
                            if k == i || k == j {
                                continue;
                            }
                            let path = m.at(i, k).add(m.at(k, j), Rounding::Up);
                            assert!(*m.at(i, j) <= path, "triangle not saturated");
                        }
                        // Strong coherence.
                        let semi = m
                            .at(i, coherent(i))
                            .add(m.at(coherent(j), j), Rounding::Up)
                            .half(Rounding::Up);
                        assert!(*m.at(i, j) <= semi, "strong coherence violated");
                    }
                }
            });
        }

        let bds = bds_from(&raws);
        if !bds.is_empty().unwrap() {
            bds.with_matrix_view(|m| {
                let dim = m.dim();
                for i in 0..dim {
                    for j in 0..dim {
                        if i == j {
                            continue;
                        }
                        for k in 0..dim {
                            if k == i || k == j {
                                continue;
                            }
                            let path = m.at(i, k).add(m.at(k, j), Rounding::Up);
                            assert!(*m.at(i, j) <= path, "triangle not saturated");
                        }
                    }
                }
            });
        }
    }

    #[test]
    fn emptiness_agrees_with_the_simplex(raws in raw_constraints()) {
        let oct = octagon_from(&raws);
        let empty = oct.is_empty().unwrap();
        let mut lp = LpProblem::new(DIM);
        lp.add_constraints(&oct.constraints()).unwrap();
        prop_assert_eq!(lp.is_satisfiable().unwrap(), !empty);
    }

    #[test]
    fn meet_is_commutative_and_associative(
        a in raw_constraints(),
        b in raw_constraints(),
        c in raw_constraints(),
    ) {
        let (sa, sb, sc) = (octagon_from(&a), octagon_from(&b), octagon_from(&c));

        let mut ab = sa.clone();
        ab.intersection_assign(&sb).unwrap();
        let mut ba = sb.clone();
        ba.intersection_assign(&sa).unwrap();
        prop_assert!(ab == ba);

        let mut ab_c = ab.clone();
        ab_c.intersection_assign(&sc).unwrap();
        let mut bc = sb.clone();
        bc.intersection_assign(&sc).unwrap();
        let mut a_bc = sa.clone();
        a_bc.intersection_assign(&bc).unwrap();
        prop_assert!(ab_c == a_bc);

        // Idempotence.
        let mut aa = sa.clone();
        aa.intersection_assign(&sa.clone()).unwrap();
        prop_assert!(aa == sa);
    }

    #[test]
    fn meet_absorbs_empty(a in raw_constraints()) {
        let sa = octagon_from(&a);
        let mut meet = sa.clone();
        meet.intersection_assign(&IntOctagon::empty(DIM)).unwrap();
        prop_assert!(meet.is_empty().unwrap());
    }

    #[test]
    fn join_is_an_upper_bound_and_stays_closed(
        a in raw_constraints(),
        b in raw_constraints(),
    ) {
        let (sa, sb) = (octagon_from(&a), octagon_from(&b));
        let mut join = sa.clone();
        join.upper_bound_assign(&sb).unwrap();
        prop_assert!(join.contains(&sa).unwrap());
        prop_assert!(join.contains(&sb).unwrap());
        prop_assert!(join.ok());

        // Meet is a lower bound of both operands.
        let mut meet = sa.clone();
        meet.intersection_assign(&sb).unwrap();
        prop_assert!(sa.contains(&meet).unwrap());
        prop_assert!(sb.contains(&meet).unwrap());
    }

    #[test]
    fn image_preserves_inclusion(a in raw_constraints(), b in raw_constraints()) {
        let sa = octagon_from(&a);
        let mut sb = octagon_from(&b);
        // Make sb ⊆ sa by meeting.
        sb.intersection_assign(&sa).unwrap();
        let expr = LinearExpr::from_variable(Variable::new(0))
            + LinearExpr::from_variable(Variable::new(1));
        let mut img_a = sa.clone();
        img_a.affine_image(Variable::new(0), &expr, &Coefficient::from(1)).unwrap();
        let mut img_b = sb.clone();
        img_b.affine_image(Variable::new(0), &expr, &Coefficient::from(1)).unwrap();
        prop_assert!(img_a.contains(&img_b).unwrap());
    }

    #[test]
    fn translation_image_is_invertible(a in raw_constraints(), delta in -5i64..5i64) {
        let sa = octagon_from(&a);
        sa.strong_closure_assign().unwrap();
        let mut moved = sa.clone();
        let expr = LinearExpr::from_variable(Variable::new(0)) + LinearExpr::constant(delta);
        moved.affine_image(Variable::new(0), &expr, &Coefficient::from(1)).unwrap();
        moved.affine_preimage(Variable::new(0), &expr, &Coefficient::from(1)).unwrap();
        prop_assert!(moved == sa);
    }

    #[test]
    fn ascii_round_trips_bit_exactly(raws in raw_constraints()) {
        let oct = octagon_from(&raws);
        oct.strong_closure_assign().unwrap();
        let mut buf = Vec::new();
        oct.ascii_dump(&mut buf).unwrap();
        let mut reader = BufReader::new(&buf[..]);
        let loaded = IntOctagon::ascii_load(&mut reader).unwrap();
        let mut buf2 = Vec::new();
        loaded.ascii_dump(&mut buf2).unwrap();
        prop_assert_eq!(&buf, &buf2);
        prop_assert!(loaded == oct);
    }

    #[test]
    fn reduction_loses_nothing(raws in raw_constraints()) {
        let oct = octagon_from(&raws);
        oct.strong_closure_assign().unwrap();
        let closed = oct.clone();
        oct.strong_reduction_assign().unwrap();
        oct.strong_closure_assign().unwrap();
        prop_assert!(oct == closed);
    }

    #[test]
    fn octagon_refines_bds(raws in raw_constraints()) {
        // Everything a BDS can say, the octagon says at least as tightly.
        let oct = octagon_from(&raws);
        let bds = bds_from(&raws);
        if !bds.is_empty().unwrap() && !oct.is_empty().unwrap() {
            for k in 0..DIM {
                let e = LinearExpr::from_variable(Variable::new(k));
                let oct_max = oct.maximize(&e).unwrap();
                let bds_max = bds.maximize(&e).unwrap();
                if let (Some((on, od, _)), Some((bn, bd, _))) = (oct_max, bds_max) {
                    // oct_max ≤ bds_max as rationals.
                    prop_assert!(&on * &bd <= &bn * &od);
                }
            }
        }
    }
}

#[test]
fn ascii_round_trips_through_a_file() {
    use std::io::{Seek, SeekFrom, Write};

    let mut oct = IntOctagon::universe(2);
    oct.refine_with_constraint(&Constraint::le(
        LinearExpr::from_variable(Variable::new(0)) + LinearExpr::from_variable(Variable::new(1)),
        LinearExpr::constant(3),
    ))
    .unwrap();
    oct.strong_closure_assign().unwrap();

    let mut file = tempfile::tempfile().unwrap();
    let mut buf = Vec::new();
    oct.ascii_dump(&mut buf).unwrap();
    file.write_all(&buf).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut reader = BufReader::new(file);
    let loaded = IntOctagon::ascii_load(&mut reader).unwrap();
    assert_eq!(loaded, oct);
}
