// tests/validation.rs
//
// End-to-end validation of the FAS solver: benchmark problems with known
// solutions, transfer-operator properties, and the failure paths.
// Run with: cargo test --test validation

use std::f64::consts::PI;

use fas_mg::config::SolverConfig;
use fas_mg::equation::{Atom, FasError};
use fas_mg::grid::Grid;
use fas_mg::smoother::RelaxScheme;
use fas_mg::solver::FasMultigrid;
use fas_mg::transfer::{prolong, restrict};

fn scenario_config(max_depth: usize) -> SolverConfig {
    SolverConfig {
        max_depth,
        max_relax_iters: 20,
        relaxation_tolerance: 1e-8,
        h_len_frac: 1.0,
        stencil_order: 2,
        relax_scheme: RelaxScheme::InexactNewton,
    }
}

/// Separable sinusoidal mode sampled at cell centres.
fn mode(n: usize, i: usize, j: usize, k: usize) -> f64 {
    let s = |t: usize| (2.0 * PI * (t as f64 + 0.5) / n as f64).sin();
    s(i) * s(j) * s(k)
}

fn fill_mode_src(solver: &mut FasMultigrid, eqn_id: usize, mol_id: usize, n: usize) {
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                solver
                    .set_poly_src_at_pt(
                        eqn_id,
                        mol_id,
                        i as isize,
                        j as isize,
                        k as isize,
                        mode(n, i, j, k),
                    )
                    .unwrap();
            }
        }
    }
}

#[test]
fn linear_poisson_converges_to_the_separable_mode() {
    let n = 16;
    let cfg = scenario_config(4);
    let mut solver = FasMultigrid::new(vec![Grid::new(n, n, n)], &[2], &cfg).unwrap();
    solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
    solver.add_atom_to_eqn(Atom::Const, 1, 0).unwrap();
    solver.set_molecule_coefficient(0, 1, -1.0).unwrap();
    fill_mode_src(&mut solver, 0, 1, n);
    solver.initialize_rho_hierarchy().unwrap();

    let summary = solver.v_cycles(10).unwrap();
    assert!(
        summary.final_max_residual < 1e-8,
        "residual after 10 V-cycles: {}",
        summary.final_max_residual
    );

    // Continuum solution of Δu = ρ for this mode is u = −ρ/(12π²); the
    // discrete answer differs by O(h²).
    let h = 1.0 / n as f64;
    let amp = 1.0 / (12.0 * PI * PI);
    let mut max_err = 0.0f64;
    let u = solver.solution(0);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let expected = -amp * mode(n, i, j, k);
                let got = u.at(i as isize, j as isize, k as isize);
                max_err = max_err.max((got - expected).abs());
            }
        }
    }
    assert!(
        max_err < h * h,
        "l-inf error {} exceeds h^2 = {}",
        max_err,
        h * h
    );
}

#[test]
fn nonlinear_phi5_fixed_point_is_preserved() {
    // Δu + u⁵ − 1 with u ≡ 1 is already exact; five V-cycles must not move it.
    let n = 16;
    let cfg = scenario_config(4);
    let mut u = Grid::new(n, n, n);
    u.shift(1.0);
    let mut solver = FasMultigrid::new(vec![u], &[3], &cfg).unwrap();
    solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
    solver
        .add_atom_to_eqn(Atom::Poly { u_id: 0, power: 5.0 }, 1, 0)
        .unwrap();
    solver.add_atom_to_eqn(Atom::Const, 2, 0).unwrap();
    solver.set_molecule_coefficient(0, 2, -1.0).unwrap();
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                solver
                    .set_poly_src_at_pt(0, 2, i as isize, j as isize, k as isize, 1.0)
                    .unwrap();
            }
        }
    }
    solver.initialize_rho_hierarchy().unwrap();

    let summary = solver.v_cycles(5).unwrap();
    assert!(
        summary.final_max_residual < 1e-10,
        "fixed point drifted: residual {}",
        summary.final_max_residual
    );
    let u = solver.solution(0);
    for &v in &u.data {
        assert!((v - 1.0).abs() < 1e-10, "u moved off the fixed point: {v}");
    }
    assert!(!summary.variables[0].crosses_zero);
}

#[test]
fn coupled_system_exercises_cross_derivatives() {
    // E1: Δu₀ − u₁ = 0, E2: Δu₁ − ρ = 0. The inner Jacobi must propagate
    // ∂F₀/∂u₁ for u₀ to converge at all.
    let n = 16;
    let cfg = scenario_config(4);
    let grids = vec![Grid::new(n, n, n), Grid::new(n, n, n)];
    let mut solver = FasMultigrid::new(grids, &[2, 2], &cfg).unwrap();

    solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
    solver
        .add_atom_to_eqn(Atom::Poly { u_id: 1, power: 1.0 }, 1, 0)
        .unwrap();
    solver.set_molecule_coefficient(0, 1, -1.0).unwrap();

    solver.add_atom_to_eqn(Atom::Lap { u_id: 1 }, 0, 1).unwrap();
    solver.add_atom_to_eqn(Atom::Const, 1, 1).unwrap();
    solver.set_molecule_coefficient(1, 1, -1.0).unwrap();
    fill_mode_src(&mut solver, 1, 1, n);
    solver.initialize_rho_hierarchy().unwrap();

    let summary = solver.v_cycles(10).unwrap();
    assert!(
        summary.final_max_residual < 1e-7,
        "coupled system residual: {}",
        summary.final_max_residual
    );

    // u₁ is the Poisson solution; u₀ integrates it once more, so its
    // amplitude is smaller by another factor of ~12π² and the mode survives
    // in both unknowns.
    let u0 = solver.solution(0);
    let u1 = solver.solution(1);
    let amp1 = u1.max_value();
    let amp0 = u0.max_value();
    assert!(amp1 > 1e-4, "u1 never picked up the source: {amp1}");
    assert!(
        amp0 > 0.0 && amp0 < amp1,
        "u0 amplitude {amp0} not below u1 amplitude {amp1}"
    );
}

#[test]
fn restriction_prolongation_round_trip_preserves_constants() {
    let mut fine = Grid::new(16, 16, 16);
    fine.shift(1.0);
    let mut mid = Grid::new(8, 8, 8);
    let mut coarse = Grid::new(4, 4, 4);
    restrict(&fine, &mut mid);
    restrict(&mid, &mut coarse);
    for &v in mid.data.iter().chain(coarse.data.iter()) {
        assert!((v - 1.0).abs() < 1e-14, "restriction drifted: {v}");
    }

    let mut back_mid = Grid::new(8, 8, 8);
    let mut back_fine = Grid::new(16, 16, 16);
    prolong(&coarse, &mut back_mid);
    prolong(&back_mid, &mut back_fine);
    for &v in back_mid.data.iter().chain(back_fine.data.iter()) {
        assert!((v - 1.0).abs() < 1e-14, "prolongation drifted: {v}");
    }
}

#[test]
fn transfer_round_trip_error_shrinks_quadratically() {
    // restrict(prolong(f)) − f is O(h²) on smooth fields: doubling the
    // resolution should shrink the error by roughly 4.
    fn round_trip_err(nc: usize) -> f64 {
        let mut coarse = Grid::new(nc, nc, nc);
        for k in 0..nc {
            for j in 0..nc {
                for i in 0..nc {
                    let x = (i as f64 + 0.5) / nc as f64;
                    coarse.set(i as isize, j as isize, k as isize, (2.0 * PI * x).sin());
                }
            }
        }
        let mut fine = Grid::new(2 * nc, 2 * nc, 2 * nc);
        prolong(&coarse, &mut fine);
        let mut back = Grid::new(nc, nc, nc);
        restrict(&fine, &mut back);
        let mut err = 0.0f64;
        for (a, b) in back.data.iter().zip(coarse.data.iter()) {
            err = err.max((a - b).abs());
        }
        err
    }

    let e8 = round_trip_err(8);
    let e16 = round_trip_err(16);
    assert!(e8 > 0.0);
    assert!(
        e16 < 0.35 * e8,
        "round-trip error did not shrink quadratically: {e8} -> {e16}"
    );
}

#[test]
fn line_search_failure_is_reported_for_an_unsolvable_equation() {
    // u² + 1 = 0 has no real solution. Started near the flat spot at
    // u = 0.01 the Newton step is −(u² + 1)/(2u) ≈ −50, so even the smallest
    // damping factor (0.01·v ≈ −0.5) overshoots and increases the residual;
    // every one of the 100 trials must fail.
    let n = 8;
    let cfg = scenario_config(1);
    let mut u = Grid::new(n, n, n);
    u.shift(0.01);
    let mut solver = FasMultigrid::new(vec![u], &[2], &cfg).unwrap();
    solver
        .add_atom_to_eqn(Atom::Poly { u_id: 0, power: 2.0 }, 0, 0)
        .unwrap();
    solver.add_atom_to_eqn(Atom::Const, 1, 0).unwrap();
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                solver
                    .set_poly_src_at_pt(0, 1, i as isize, j as isize, k as isize, 1.0)
                    .unwrap();
            }
        }
    }
    solver.initialize_rho_hierarchy().unwrap();

    let err = solver.v_cycle().unwrap_err();
    assert!(
        matches!(err, FasError::LineSearchFailure { depth: 1 }),
        "expected a line-search failure, got {err:?}"
    );
}

#[test]
fn singularity_warning_flags_a_sign_changing_solution() {
    // The sinusoidal Poisson solution is antisymmetric, so it must cross
    // zero and the summary must say so.
    let n = 16;
    let cfg = scenario_config(4);
    let mut solver = FasMultigrid::new(vec![Grid::new(n, n, n)], &[2], &cfg).unwrap();
    solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
    solver.add_atom_to_eqn(Atom::Const, 1, 0).unwrap();
    solver.set_molecule_coefficient(0, 1, -1.0).unwrap();
    fill_mode_src(&mut solver, 0, 1, n);
    solver.initialize_rho_hierarchy().unwrap();

    let summary = solver.v_cycles(3).unwrap();
    assert!(
        summary.variables[0].crosses_zero,
        "sign-changing solution was not flagged"
    );
    assert!(summary.variables[0].min < 0.0 && summary.variables[0].max > 0.0);
}

#[test]
fn v_cycle_on_an_exact_solution_is_the_identity() {
    // F = Δu with u ≡ 0 is exactly solved; a V-cycle must leave u at zero.
    let n = 16;
    let cfg = scenario_config(4);
    let mut solver = FasMultigrid::new(vec![Grid::new(n, n, n)], &[1], &cfg).unwrap();
    solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
    solver.initialize_rho_hierarchy().unwrap();

    solver.v_cycle().unwrap();
    let u = solver.solution(0);
    for &v in &u.data {
        assert!(v.abs() < 1e-13, "exact solution disturbed: {v}");
    }
}
