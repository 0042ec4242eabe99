// src/solver.rs
//
// FAS multigrid solver: owns the equation system and the grid hierarchy,
// exposes the build API (atoms, molecule coefficients, ρ sources) and the
// solve API (V-cycles). The coarse-grid equation stores the full
// approximation; the τ correction lives in the coarse_src hierarchy.

use crate::config::SolverConfig;
use crate::equation::{Atom, EquationSystem, FasError};
use crate::grid::Grid;
use crate::hierarchy::Hierarchy;
use crate::smoother::{self, RelaxParams, RelaxReport, RelaxScheme};
use crate::stencil::StencilOrder;
use crate::transfer::{prolong, restrict};
use rayon::prelude::*;
use serde::Serialize;

/// Coarsest depth. Depths are dense integers up to `max_depth` (finest).
pub const MIN_DEPTH: usize = 1;

/// Iteration cap of the finalisation smooth after the last V-cycle.
const FINAL_SMOOTH_ITERS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    /// The solution changes sign somewhere on the finest grid; for conformal
    /// factors and similar strictly-signed fields this flags a singularity.
    pub crosses_zero: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    pub cycles: usize,
    pub final_max_residual: f64,
    pub variables: Vec<VariableSummary>,
}

pub struct FasMultigrid {
    sys: EquationSystem,
    hier: Hierarchy,
    order: StencilOrder,
    h_len_frac: f64,
    max_relax_iters: usize,
    relaxation_tolerance: f64,
    scheme: RelaxScheme,
}

impl FasMultigrid {
    /// Build a solver from the finest-level solution grids (one per unknown,
    /// all the same size; their current contents are the initial guess).
    pub fn new(
        u: Vec<Grid>,
        molecule_counts: &[usize],
        config: &SolverConfig,
    ) -> Result<Self, FasError> {
        if config.max_depth < MIN_DEPTH {
            return Err(FasError::InvalidMaxDepth(config.max_depth));
        }
        let order = StencilOrder::from_order(config.stencil_order)
            .ok_or(FasError::UnsupportedStencilOrder(config.stencil_order))?;
        let total_depths = config.max_depth - MIN_DEPTH + 1;
        let sys = EquationSystem::new(molecule_counts);
        let hier = Hierarchy::new(u, molecule_counts, total_depths)?;
        Ok(Self {
            sys,
            hier,
            order,
            h_len_frac: config.h_len_frac,
            max_relax_iters: config.max_relax_iters,
            relaxation_tolerance: config.relaxation_tolerance,
            scheme: config.relax_scheme,
        })
    }

    pub fn n_vars(&self) -> usize {
        self.sys.n_vars()
    }

    // ---------------------------
    // Build API
    // ---------------------------

    pub fn add_atom_to_eqn(
        &mut self,
        atom: Atom,
        mol_id: usize,
        eqn_id: usize,
    ) -> Result<(), FasError> {
        self.sys.add_atom(atom, mol_id, eqn_id)
    }

    pub fn set_molecule_coefficient(
        &mut self,
        eqn_id: usize,
        mol_id: usize,
        coef: f64,
    ) -> Result<(), FasError> {
        self.sys.set_coefficient(eqn_id, mol_id, coef)
    }

    /// Write one ρ value at the finest depth (periodic indexing).
    pub fn set_poly_src_at_pt(
        &mut self,
        eqn_id: usize,
        mol_id: usize,
        i: isize,
        j: isize,
        k: isize,
        value: f64,
    ) -> Result<(), FasError> {
        self.sys.check_ids(eqn_id, mol_id)?;
        let finest = self.hier.finest_idx();
        self.hier.rho[eqn_id][mol_id].grids[finest].set(i, j, k, value);
        Ok(())
    }

    /// Restrict every ρ grid down the hierarchy. Call after all ρ values are
    /// set and before solving.
    pub fn initialize_rho_hierarchy(&mut self) -> Result<(), FasError> {
        self.sys.validate_complete()?;
        let finest = self.hier.finest_idx();
        for eqn_id in 0..self.sys.n_vars() {
            for mol_id in 0..self.sys.eqns[eqn_id].molecules.len() {
                for fine_idx in (1..=finest).rev() {
                    let (lo, hi) = self.hier.rho[eqn_id][mol_id].grids.split_at_mut(fine_idx);
                    restrict(&hi[0], &mut lo[fine_idx - 1]);
                }
            }
        }
        Ok(())
    }

    // ---------------------------
    // Solve API
    // ---------------------------

    /// Max-norm residual on the finest grid.
    pub fn max_residual(&self) -> f64 {
        smoother::max_residual_all(
            &self.hier,
            &self.sys,
            self.hier.finest_idx(),
            self.order,
            self.h_len_frac,
        )
    }

    /// One FAS V-cycle: pre-smooth, descend assembling the τ sources, solve
    /// coarse, ascend applying error corrections, post-smooth.
    pub fn v_cycle(&mut self) -> Result<(), FasError> {
        self.sys.validate_complete()?;
        let max_idx = self.hier.finest_idx();

        self.relax_at(max_idx, self.max_relax_iters)?;
        println!(
            "[fas]   initial max residual on fine grid: {:.6e}",
            self.max_residual()
        );

        for eqn_id in 0..self.sys.n_vars() {
            for fine_idx in (1..=max_idx).rev() {
                self.compute_coarse_restriction(eqn_id, fine_idx);
            }
            // Snapshot the coarsest approximation; the ascent turns it into
            // the error of the coarse solve.
            let hier = &mut self.hier;
            let (tmp, u) = (&mut hier.tmp[eqn_id].grids[0], &hier.u[eqn_id].grids[0]);
            tmp.copy_from(u);
        }

        for coarse_idx in 0..max_idx {
            let report = self.relax_at(coarse_idx, self.max_relax_iters)?;
            println!(
                "[fas]   upward stroke at depth {}: residual after solving {:.6e}",
                coarse_idx + MIN_DEPTH,
                report.max_residual
            );
            for eqn_id in 0..self.sys.n_vars() {
                self.approx_to_error(eqn_id, coarse_idx);
            }
            for eqn_id in 0..self.sys.n_vars() {
                self.correct_fine_from_error(eqn_id, coarse_idx + 1);
            }
        }

        let report = self.relax_at(max_idx, self.max_relax_iters)?;
        println!(
            "[fas]   final max residual on fine grid: {:.6e}",
            report.max_residual
        );
        Ok(())
    }

    /// Run `num_cycles` V-cycles, a finalisation smooth, and summarise each
    /// unknown (printed and returned).
    pub fn v_cycles(&mut self, num_cycles: usize) -> Result<SolveSummary, FasError> {
        for cycle in 0..num_cycles {
            println!("[fas] V-cycle {} of {}", cycle + 1, num_cycles);
            self.v_cycle()?;
        }

        let max_idx = self.hier.finest_idx();
        let report = self.relax_at(max_idx, FINAL_SMOOTH_ITERS)?;
        println!(
            "[fas] final solution residual: {:.6e}",
            report.max_residual
        );

        let mut variables = Vec::with_capacity(self.sys.n_vars());
        for eqn_id in 0..self.sys.n_vars() {
            let crosses_zero = self.singularity_exists(eqn_id);
            if crosses_zero {
                println!(
                    "[fas] warning: solution for variable {eqn_id} crosses zero, it may be singular at some points"
                );
            } else {
                println!(
                    "[fas] solution for variable {eqn_id} stays one-signed (no singularity detected)"
                );
            }
            let g = &self.hier.u[eqn_id].grids[max_idx];
            let (min, avg, max) = (g.min_value(), g.average(), g.max_value());
            println!("[fas]   avg / min / max: {avg:.6e} / {min:.6e} / {max:.6e}");
            variables.push(VariableSummary {
                min,
                avg,
                max,
                crosses_zero,
            });
        }

        Ok(SolveSummary {
            cycles: num_cycles,
            final_max_residual: report.max_residual,
            variables,
        })
    }

    /// Finest-level solution of one unknown.
    pub fn solution(&self, eqn_id: usize) -> &Grid {
        &self.hier.u[eqn_id].grids[self.hier.finest_idx()]
    }

    pub fn solution_mut(&mut self, eqn_id: usize) -> &mut Grid {
        let finest = self.hier.finest_idx();
        &mut self.hier.u[eqn_id].grids[finest]
    }

    /// Consume the solver, handing back the finest-level solution grids.
    pub fn into_solutions(self) -> Vec<Grid> {
        let finest = self.hier.finest_idx();
        self.hier
            .u
            .into_iter()
            .map(|mut p| p.grids.swap_remove(finest))
            .collect()
    }

    /// Fixed-precision dump of u₀ along x at j = ny/4, k = nz/4.
    pub fn print_solution_strip(&self, depth: usize) {
        let depth_idx = depth - MIN_DEPTH;
        let g = &self.hier.u[0].grids[depth_idx];
        print!("Values: {{ ");
        for i in 0..g.nx {
            print!(
                "{:.15}, ",
                g.at(i as isize, (g.ny / 4) as isize, (g.nz / 4) as isize)
            );
        }
        println!("}}");
    }

    // ---------------------------
    // V-cycle internals
    // ---------------------------

    fn relax_params(&self, max_iters: usize) -> RelaxParams {
        RelaxParams {
            max_iters,
            tolerance: self.relaxation_tolerance,
            scheme: self.scheme,
            order: self.order,
            h_len_frac: self.h_len_frac,
        }
    }

    fn relax_at(&mut self, depth_idx: usize, max_iters: usize) -> Result<RelaxReport, FasError> {
        let params = self.relax_params(max_iters);
        smoother::relax(&mut self.hier, &self.sys, depth_idx, &params)
    }

    /// Assemble the FAS τ source one level down: restrict u, restrict the
    /// fine residual, and add it to the coarse operator value.
    fn compute_coarse_restriction(&mut self, eqn_id: usize, fine_idx: usize) {
        let coarse_idx = fine_idx - 1;
        let dims = self.hier.dims[fine_idx];
        let (nx, ny) = (dims.nx, dims.ny);

        {
            let (lo, hi) = self.hier.u[eqn_id].grids.split_at_mut(fine_idx);
            restrict(&hi[0], &mut lo[coarse_idx]);
        }

        // tmp ← coarse_src − F on the fine level.
        {
            let mut t = std::mem::take(&mut self.hier.tmp[eqn_id].grids[fine_idx]);
            {
                let view = self
                    .hier
                    .eqn_view(&self.sys, eqn_id, fine_idx, self.order, self.h_len_frac);
                let src = &self.hier.coarse_src[eqn_id].grids[fine_idx];
                t.data.par_chunks_mut(nx).enumerate().for_each(|(row, out)| {
                    let k = (row / ny) as isize;
                    let j = (row % ny) as isize;
                    let base = row * nx;
                    for (i, slot) in out.iter_mut().enumerate() {
                        *slot = src.data[base + i] - view.eval(i as isize, j, k);
                    }
                });
            }
            self.hier.tmp[eqn_id].grids[fine_idx] = t;
        }

        {
            let (lo, hi) = self.hier.tmp[eqn_id].grids.split_at_mut(fine_idx);
            restrict(&hi[0], &mut lo[coarse_idx]);
        }

        // coarse_src ← F evaluated on the restricted approximation, plus the
        // restricted fine residual.
        {
            let cdims = self.hier.dims[coarse_idx];
            let (cnx, cny) = (cdims.nx, cdims.ny);
            let mut cs = std::mem::take(&mut self.hier.coarse_src[eqn_id].grids[coarse_idx]);
            {
                let view =
                    self.hier
                        .eqn_view(&self.sys, eqn_id, coarse_idx, self.order, self.h_len_frac);
                cs.data
                    .par_chunks_mut(cnx)
                    .enumerate()
                    .for_each(|(row, out)| {
                        let k = (row / cny) as isize;
                        let j = (row % cny) as isize;
                        for (i, slot) in out.iter_mut().enumerate() {
                            *slot = view.eval(i as isize, j, k);
                        }
                    });
            }
            self.hier.coarse_src[eqn_id].grids[coarse_idx] = cs;
        }
        {
            let hier = &mut self.hier;
            let cs = &mut hier.coarse_src[eqn_id].grids[coarse_idx];
            let t = &hier.tmp[eqn_id].grids[coarse_idx];
            cs.data
                .par_iter_mut()
                .zip(t.data.par_iter())
                .for_each(|(c, ti)| *c += ti);
        }
    }

    /// tmp ← u − tmp (approximate solution becomes the error of the solve).
    fn approx_to_error(&mut self, eqn_id: usize, depth_idx: usize) {
        let hier = &mut self.hier;
        let t = &mut hier.tmp[eqn_id].grids[depth_idx];
        let u = &hier.u[eqn_id].grids[depth_idx];
        t.data
            .par_iter_mut()
            .zip(u.data.par_iter())
            .for_each(|(ti, ui)| *ti = ui - *ti);
    }

    /// Prolong the coarse error, correct the finer approximation, and leave
    /// the pre-correction approximation in tmp for the next stroke.
    fn correct_fine_from_error(&mut self, eqn_id: usize, fine_idx: usize) {
        {
            let (lo, hi) = self.hier.tmp[eqn_id].grids.split_at_mut(fine_idx);
            prolong(&lo[fine_idx - 1], &mut hi[0]);
        }
        let hier = &mut self.hier;
        let u = &mut hier.u[eqn_id].grids[fine_idx];
        let t = &mut hier.tmp[eqn_id].grids[fine_idx];
        u.data
            .par_iter_mut()
            .zip(t.data.par_iter_mut())
            .for_each(|(ui, ti)| {
                let old = *ui;
                *ui += *ti;
                *ti = old;
            });
    }

    fn singularity_exists(&self, eqn_id: usize) -> bool {
        let g = &self.hier.u[eqn_id].grids[self.hier.finest_idx()];
        let sign = |x: f64| -> i32 {
            if x > 0.0 {
                1
            } else if x < 0.0 {
                -1
            } else {
                0
            }
        };
        let s0 = sign(g.data[0]);
        g.data[1..].iter().any(|&x| sign(x) * s0 < 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SolverConfig {
        SolverConfig {
            max_depth: 2,
            max_relax_iters: 5,
            relaxation_tolerance: 1e-8,
            h_len_frac: 1.0,
            stencil_order: 2,
            relax_scheme: RelaxScheme::InexactNewton,
        }
    }

    #[test]
    fn constructor_validates_inputs() {
        let cfg = config();
        assert!(matches!(
            FasMultigrid::new(vec![], &[], &cfg),
            Err(FasError::NoVariables)
        ));
        assert!(matches!(
            FasMultigrid::new(vec![Grid::new(8, 8, 8)], &[1, 1], &cfg),
            Err(FasError::MismatchedVariableCounts { .. })
        ));
        let mut bad_order = config();
        bad_order.stencil_order = 3;
        assert!(matches!(
            FasMultigrid::new(vec![Grid::new(8, 8, 8)], &[1], &bad_order),
            Err(FasError::UnsupportedStencilOrder(3))
        ));
        let mut bad_depth = config();
        bad_depth.max_depth = 0;
        assert!(matches!(
            FasMultigrid::new(vec![Grid::new(8, 8, 8)], &[1], &bad_depth),
            Err(FasError::InvalidMaxDepth(0))
        ));
    }

    #[test]
    fn v_cycle_rejects_incomplete_equations() {
        let mut solver = FasMultigrid::new(vec![Grid::new(8, 8, 8)], &[1], &config()).unwrap();
        assert!(matches!(
            solver.v_cycle(),
            Err(FasError::EmptyMolecule { .. })
        ));
    }

    #[test]
    fn solutions_round_trip_through_the_solver() {
        let mut g = Grid::new(8, 8, 8);
        g.shift(1.5);
        let mut solver = FasMultigrid::new(vec![g], &[1], &config()).unwrap();
        solver.add_atom_to_eqn(Atom::Lap { u_id: 0 }, 0, 0).unwrap();
        assert_eq!(solver.solution(0).at(3, 3, 3), 1.5);
        solver.solution_mut(0).set(0, 0, 0, 2.0);
        let grids = solver.into_solutions();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].at(0, 0, 0), 2.0);
        assert_eq!(grids[0].nx, 8);
    }
}
