// src/main.rs
//
// Demo driver: sets up one of the benchmark problems on a periodic cube,
// runs V-cycles and writes the run artefacts (config.json, optional slice
// PNG) to an output directory.
//
// Usage: fas-mg [poisson|phi5] [grid size] [cycles]
// Solver knobs come from the FAS_MG_* env vars (see config.rs).

use std::env;
use std::f64::consts::PI;
use std::fs::create_dir_all;
use std::path::PathBuf;

use fas_mg::config::SolverConfig;
use fas_mg::equation::Atom;
use fas_mg::grid::Grid;
use fas_mg::solver::FasMultigrid;
use fas_mg::visualisation::save_slice_plot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Problem {
    /// Δu = ρ with a separable sinusoidal source.
    Poisson,
    /// Δu + u⁵ = ρ with ρ ≡ 1 and u started at the fixed point.
    Phi5,
}

impl Problem {
    fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poisson" => Some(Self::Poisson),
            "phi5" | "phi^5" => Some(Self::Phi5),
            _ => None,
        }
    }
}

fn build_solver(
    problem: Problem,
    n: usize,
    cfg: &SolverConfig,
) -> Result<FasMultigrid, Box<dyn std::error::Error>> {
    let mut u = Grid::new(n, n, n);
    let molecule_counts: Vec<usize> = match problem {
        Problem::Poisson => vec![2],
        Problem::Phi5 => {
            u.shift(1.0);
            vec![3]
        }
    };

    let mut solver = FasMultigrid::new(vec![u], &molecule_counts, cfg)?;
    match problem {
        Problem::Poisson => {
            solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0)?;
            solver.add_atom_to_eqn(Atom::Const, 1, 0)?;
            solver.set_molecule_coefficient(0, 1, -1.0)?;
            for k in 0..n {
                for j in 0..n {
                    for i in 0..n {
                        let s = |t: usize| (2.0 * PI * (t as f64 + 0.5) / n as f64).sin();
                        solver.set_poly_src_at_pt(
                            0,
                            1,
                            i as isize,
                            j as isize,
                            k as isize,
                            s(i) * s(j) * s(k),
                        )?;
                    }
                }
            }
        }
        Problem::Phi5 => {
            solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0)?;
            solver.add_atom_to_eqn(Atom::Poly { u_id: 0, power: 5.0 }, 1, 0)?;
            solver.add_atom_to_eqn(Atom::Const, 2, 0)?;
            solver.set_molecule_coefficient(0, 2, -1.0)?;
            for k in 0..n {
                for j in 0..n {
                    for i in 0..n {
                        solver.set_poly_src_at_pt(0, 2, i as isize, j as isize, k as isize, 1.0)?;
                    }
                }
            }
        }
    }
    solver.initialize_rho_hierarchy()?;
    Ok(solver)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let problem = args
        .get(1)
        .and_then(|s| Problem::from_str(s))
        .unwrap_or(Problem::Poisson);
    let n: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(16);
    let cycles: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);

    let cfg = SolverConfig::from_env();
    println!("[fas] problem {problem:?} on a {n}^3 grid, {cycles} V-cycles");
    println!(
        "[fas] max_depth={} max_relax_iters={} tol={:.1e} stencil_order={}",
        cfg.max_depth, cfg.max_relax_iters, cfg.relaxation_tolerance, cfg.stencil_order
    );

    let mut solver = build_solver(problem, n, &cfg)?;
    let summary = solver.v_cycles(cycles)?;

    let out_dir = PathBuf::from("out").join("fas_run");
    create_dir_all(&out_dir)?;
    cfg.write_to_dir(&out_dir)?;
    let png = out_dir.join("u0_slice.png");
    save_slice_plot(solver.solution(0), n / 2, png.to_str().unwrap_or("u0_slice.png"))?;
    println!(
        "[fas] wrote {} and {}",
        out_dir.join("config.json").display(),
        png.display()
    );

    solver.print_solution_strip(cfg.max_depth);
    println!(
        "[fas] done, final max residual {:.6e}",
        summary.final_max_residual
    );
    Ok(())
}
