// src/smoother.rs
//
// Nonlinear relaxation at a single depth. The outer loop is an inexact
// Newton iteration: evaluate the residual, approximately solve the Jacobian
// system J v = -F by damped Jacobi sweeps, then take a damped step along v.
//
// Within one Jacobi sweep the correction of the equation being updated is
// frozen (Jacobi within an equation, Gauss–Seidel across equations); the
// update order is unspecified by design and this form keeps the parallel
// site loop free of read/write overlap. The linearised residual norm that
// decides convergence runs after a barrier and sees a quiescent state.

use crate::equation::{EquationSystem, FasError};
use crate::grid::pairwise_sum;
use crate::hierarchy::Hierarchy;
use crate::stencil::StencilOrder;
use rayon::prelude::*;
use serde::Serialize;

/// Give up on the inner Jacobi solve after this many sweeps without the
/// linearised residual norm improving.
const JACOBI_STALL_SWEEPS: usize = 500;

/// Damping trials of the line search: full step, then 0.01·v rollbacks.
const LINE_SEARCH_TRIALS: usize = 100;

/// Relaxation scheme of the outer Newton loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RelaxScheme {
    /// Newton outer iteration with an approximately solved Jacobian system.
    InexactNewton,
    /// Inexact Newton plus a volume constraint: each accepted step re-centres
    /// every unknown to the average it had when relaxation started.
    InexactNewtonConstrained,
    /// Alias of `InexactNewton`.
    Newton,
}

impl RelaxScheme {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inexact_newton" | "inexact" => Some(Self::InexactNewton),
            "inexact_newton_constrained" | "constrained" => Some(Self::InexactNewtonConstrained),
            "newton" => Some(Self::Newton),
            _ => None,
        }
    }

    fn constrained(self) -> bool {
        matches!(self, Self::InexactNewtonConstrained)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelaxParams {
    pub max_iters: usize,
    pub tolerance: f64,
    pub scheme: RelaxScheme,
    pub order: StencilOrder,
    pub h_len_frac: f64,
}

/// Outcome of one relaxation call at one depth.
#[derive(Debug, Clone, Copy)]
pub struct RelaxReport {
    /// Newton iterations actually taken.
    pub iters: usize,
    /// Max-norm residual on exit.
    pub max_residual: f64,
    /// False when the inner Jacobi solve hit its stall bound; the outer loop
    /// then exits early and the caller continues with a degraded step.
    pub jacobi_converged: bool,
}

/// Max-norm of the residual F_e − coarse_src_e over all equations and sites.
pub(crate) fn max_residual_all(
    hier: &Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    order: StencilOrder,
    h_len_frac: f64,
) -> f64 {
    let dims = hier.dims[depth_idx];
    let (nx, ny) = (dims.nx, dims.ny);
    let mut worst = 0.0f64;
    for eqn_id in 0..sys.n_vars() {
        let view = hier.eqn_view(sys, eqn_id, depth_idx, order, h_len_frac);
        let src = &hier.coarse_src[eqn_id].grids[depth_idx];
        let m = (0..dims.rows())
            .into_par_iter()
            .map(|row| {
                let k = (row / ny) as isize;
                let j = (row % ny) as isize;
                let base = row * nx;
                let mut mx = 0.0f64;
                for i in 0..nx {
                    let r = view.eval(i as isize, j, k) - src.data[base + i];
                    mx = mx.max(r.abs());
                }
                mx
            })
            .reduce(|| 0.0f64, f64::max);
        worst = worst.max(m);
    }
    worst
}

/// ℓ²-norm² of the residual over all equations and sites.
fn residual_norm2(
    hier: &Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    order: StencilOrder,
    h_len_frac: f64,
) -> f64 {
    let dims = hier.dims[depth_idx];
    let (nx, ny) = (dims.nx, dims.ny);
    let mut eqn_sums = Vec::with_capacity(sys.n_vars());
    for eqn_id in 0..sys.n_vars() {
        let view = hier.eqn_view(sys, eqn_id, depth_idx, order, h_len_frac);
        let src = &hier.coarse_src[eqn_id].grids[depth_idx];
        let rows: Vec<f64> = (0..dims.rows())
            .into_par_iter()
            .map(|row| {
                let k = (row / ny) as isize;
                let j = (row % ny) as isize;
                let base = row * nx;
                let mut acc = 0.0;
                for i in 0..nx {
                    let r = view.eval(i as isize, j, k) - src.data[base + i];
                    acc += r * r;
                }
                acc
            })
            .collect();
        eqn_sums.push(pairwise_sum(&rows));
    }
    pairwise_sum(&eqn_sums)
}

/// One combined pass: write jac_rhs_e = −(F_e − coarse_src_e) and return the
/// residual ℓ²-norm² S.
fn residual_to_jac_rhs(
    hier: &mut Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    order: StencilOrder,
    h_len_frac: f64,
) -> f64 {
    let dims = hier.dims[depth_idx];
    let (nx, ny) = (dims.nx, dims.ny);
    let mut eqn_sums = Vec::with_capacity(sys.n_vars());
    for eqn_id in 0..sys.n_vars() {
        let mut rhs = std::mem::take(&mut hier.jac_rhs[eqn_id].grids[depth_idx]);
        let rows: Vec<f64> = {
            let view = hier.eqn_view(sys, eqn_id, depth_idx, order, h_len_frac);
            let src = &hier.coarse_src[eqn_id].grids[depth_idx];
            rhs.data
                .par_chunks_mut(nx)
                .enumerate()
                .map(|(row, out)| {
                    let k = (row / ny) as isize;
                    let j = (row % ny) as isize;
                    let base = row * nx;
                    let mut acc = 0.0;
                    for (i, slot) in out.iter_mut().enumerate() {
                        let r = view.eval(i as isize, j, k) - src.data[base + i];
                        *slot = -r;
                        acc += r * r;
                    }
                    acc
                })
                .collect()
        };
        hier.jac_rhs[eqn_id].grids[depth_idx] = rhs;
        eqn_sums.push(pairwise_sum(&rows));
    }
    pairwise_sum(&eqn_sums)
}

/// Damped Jacobi solve of J v = jac_rhs. Stops once the linearised residual
/// norm drops to min(C · S^{p+1}, S); returns false when it stalls instead.
fn jacobian_relax(
    hier: &mut Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    norm: f64,
    c: f64,
    p: i32,
    order: StencilOrder,
    h_len_frac: f64,
) -> bool {
    let dims = hier.dims[depth_idx];
    let (nx, ny) = (dims.nx, dims.ny);
    let n_vars = sys.n_vars();

    for eqn_id in 0..n_vars {
        hier.damping_v[eqn_id].grids[depth_idx].zero();
    }

    let target = (norm.powi(p + 1) * c).min(norm);
    let mut scratch = vec![0.0f64; dims.pts()];
    let mut norm_r = f64::INFINITY;
    let mut best = f64::INFINITY;
    let mut stalled_for = 0usize;

    // NaN-safe guard: a non-finite norm (zero-diagonal unknowns produce
    // infinite corrections) must keep iterating into the stall bail-out
    // below, never exit as converged.
    while !(norm_r < target) {
        for eqn_id in 0..n_vars {
            {
                let view = hier.eqn_view(sys, eqn_id, depth_idx, order, h_len_frac);
                let rhs = &hier.jac_rhs[eqn_id].grids[depth_idx];
                scratch
                    .par_chunks_mut(nx)
                    .enumerate()
                    .for_each(|(row, out)| {
                        let k = (row / ny) as isize;
                        let j = (row % ny) as isize;
                        let base = row * nx;
                        for (i, slot) in out.iter_mut().enumerate() {
                            let (a, b) = view.jac_coeffs(i as isize, j, k, eqn_id);
                            let mut cross = 0.0;
                            for var in 0..n_vars {
                                if var != eqn_id {
                                    cross += view.eval_der(i as isize, j, k, var);
                                }
                            }
                            *slot = (a - rhs.data[base + i] + cross) / (-b);
                        }
                    });
            }
            hier.damping_v[eqn_id].grids[depth_idx]
                .data
                .copy_from_slice(&scratch);
        }

        // Linearised residual norm over the settled corrections.
        let mut eqn_sums = Vec::with_capacity(n_vars);
        for eqn_id in 0..n_vars {
            let view = hier.eqn_view(sys, eqn_id, depth_idx, order, h_len_frac);
            let rhs = &hier.jac_rhs[eqn_id].grids[depth_idx];
            let rows: Vec<f64> = (0..dims.rows())
                .into_par_iter()
                .map(|row| {
                    let k = (row / ny) as isize;
                    let j = (row % ny) as isize;
                    let base = row * nx;
                    let mut acc = 0.0;
                    for i in 0..nx {
                        let mut lin = 0.0;
                        for var in 0..n_vars {
                            lin += view.eval_der(i as isize, j, k, var);
                        }
                        let t = lin - rhs.data[base + i];
                        acc += t * t;
                    }
                    acc
                })
                .collect();
            eqn_sums.push(pairwise_sum(&rows));
        }
        norm_r = pairwise_sum(&eqn_sums);

        if norm_r < best {
            best = norm_r;
            stalled_for = 0;
        } else {
            stalled_for += 1;
            if stalled_for > JACOBI_STALL_SWEEPS {
                return false;
            }
        }
    }

    true
}

/// Take u ← u + v, then back off in 0.01·v decrements until the residual
/// norm² no longer exceeds `norm`. Exhausting every damping factor is fatal.
fn line_search(
    hier: &mut Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    norm: f64,
    order: StencilOrder,
    h_len_frac: f64,
) -> Result<(), FasError> {
    let n_vars = sys.n_vars();
    for eqn_id in 0..n_vars {
        let u = &mut hier.u[eqn_id].grids[depth_idx];
        let v = &hier.damping_v[eqn_id].grids[depth_idx];
        u.data
            .par_iter_mut()
            .zip(v.data.par_iter())
            .for_each(|(ui, vi)| *ui += vi);
    }

    for _s in 0..LINE_SEARCH_TRIALS {
        let sum = residual_norm2(hier, sys, depth_idx, order, h_len_frac);
        if sum <= norm {
            return Ok(());
        }
        for eqn_id in 0..n_vars {
            let u = &mut hier.u[eqn_id].grids[depth_idx];
            let v = &hier.damping_v[eqn_id].grids[depth_idx];
            u.data
                .par_iter_mut()
                .zip(v.data.par_iter())
                .for_each(|(ui, vi)| *ui -= 0.01 * vi);
        }
    }

    Err(FasError::LineSearchFailure {
        depth: depth_idx + 1,
    })
}

/// Relax the solution at one depth. Numerical stalls of the inner solve are
/// reported in the outcome; only line-search exhaustion is an error.
pub(crate) fn relax(
    hier: &mut Hierarchy,
    sys: &EquationSystem,
    depth_idx: usize,
    params: &RelaxParams,
) -> Result<RelaxReport, FasError> {
    let n_vars = sys.n_vars();
    let ref_avgs: Vec<f64> = if params.scheme.constrained() {
        (0..n_vars)
            .map(|e| hier.u[e].grids[depth_idx].average())
            .collect()
    } else {
        Vec::new()
    };

    let mut jacobi_converged = true;
    let mut iters = 0usize;
    for _ in 0..params.max_iters {
        if max_residual_all(hier, sys, depth_idx, params.order, params.h_len_frac)
            < params.tolerance
        {
            break;
        }
        iters += 1;

        let norm = residual_to_jac_rhs(hier, sys, depth_idx, params.order, params.h_len_frac);
        if !jacobian_relax(
            hier,
            sys,
            depth_idx,
            norm,
            1.0,
            0,
            params.order,
            params.h_len_frac,
        ) {
            eprintln!(
                "[fas] depth {}: Jacobi inner solve made no progress for {} sweeps, giving up on this depth",
                depth_idx + 1,
                JACOBI_STALL_SWEEPS
            );
            jacobi_converged = false;
            break;
        }

        line_search(hier, sys, depth_idx, norm, params.order, params.h_len_frac)?;

        if params.scheme.constrained() {
            for e in 0..n_vars {
                let shift = ref_avgs[e] - hier.u[e].grids[depth_idx].average();
                hier.u[e].grids[depth_idx].shift(shift);
            }
        }
    }

    let max_residual = max_residual_all(hier, sys, depth_idx, params.order, params.h_len_frac);
    Ok(RelaxReport {
        iters,
        max_residual,
        jacobi_converged,
    })
}
