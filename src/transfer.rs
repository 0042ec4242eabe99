// src/transfer.rs
//
// Grid transfer between adjacent depths.
//
// Restriction is the 27-point half-weighting kernel centred on the fine point
// (2i, 2j, 2k): weight 1/8 at the centre, 1/16 per face neighbour, 1/32 per
// edge neighbour, 1/64 per corner neighbour (weights sum to 1).
//
// Prolongation is trilinear interpolation written in gather form: every fine
// cell reads its coarse parents, so parallel writes are disjoint and no
// atomics are needed. On even-sized levels this produces exactly the same
// values as the scatter form that distributes 2^-(|a|+|b|+|c|) fractions.

use crate::grid::Grid;
use rayon::prelude::*;

// Kernel weight by Manhattan distance from the centre of the 3x3x3 block.
const RESTRICT_W: [f64; 4] = [0.125, 0.0625, 0.03125, 0.015625];

/// Fine → coarse half-weighting restriction. Overwrites `coarse`.
pub fn restrict(fine: &Grid, coarse: &mut Grid) {
    let ncx = coarse.nx;
    let ncy = coarse.ny;

    coarse
        .data
        .par_chunks_mut(ncx)
        .enumerate()
        .for_each(|(row, out)| {
            let kc = row / ncy;
            let jc = row % ncy;
            let fj = 2 * jc as isize;
            let fk = 2 * kc as isize;
            for (ic, slot) in out.iter_mut().enumerate() {
                let fi = 2 * ic as isize;
                let mut acc = 0.0;
                for dk in -1isize..=1 {
                    for dj in -1isize..=1 {
                        for di in -1isize..=1 {
                            let w = RESTRICT_W[(di.abs() + dj.abs() + dk.abs()) as usize];
                            acc += w * fine.at(fi + di, fj + dj, fk + dk);
                        }
                    }
                }
                *slot = acc;
            }
        });
}

/// Coarse parents of fine index `f` along one axis: (lower, upper, upper
/// weight). Even fine sites coincide with a coarse site; odd sites average
/// their two neighbours.
#[inline]
fn axis_parents(f: usize, nc: usize) -> (usize, usize, f64) {
    let c0 = (f / 2) % nc;
    if f % 2 == 0 {
        (c0, c0, 0.0)
    } else {
        (c0, (c0 + 1) % nc, 0.5)
    }
}

/// Coarse → fine trilinear prolongation. Overwrites `fine`.
pub fn prolong(coarse: &Grid, fine: &mut Grid) {
    let nfx = fine.nx;
    let nfy = fine.ny;

    fine.data
        .par_chunks_mut(nfx)
        .enumerate()
        .for_each(|(row, out)| {
            let kf = row / nfy;
            let jf = row % nfy;
            let (k0, k1, wk) = axis_parents(kf, coarse.nz);
            let (j0, j1, wj) = axis_parents(jf, coarse.ny);
            for (i, slot) in out.iter_mut().enumerate() {
                let (i0, i1, wi) = axis_parents(i, coarse.nx);
                let c = |ii: usize, jj: usize, kk: usize| coarse.data[coarse.idx(ii, jj, kk)];
                let lerp = |a: f64, b: f64, w: f64| a + (b - a) * w;
                let v0 = lerp(
                    lerp(c(i0, j0, k0), c(i1, j0, k0), wi),
                    lerp(c(i0, j1, k0), c(i1, j1, k0), wi),
                    wj,
                );
                let v1 = lerp(
                    lerp(c(i0, j0, k1), c(i1, j0, k1), wi),
                    lerp(c(i0, j1, k1), c(i1, j1, k1), wi),
                    wj,
                );
                *slot = lerp(v0, v1, wk);
            }
        });
}
