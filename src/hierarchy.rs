// src/hierarchy.rs
//
// Grid pyramids for the multigrid solve. Depths are dense integers
// d_min = 1 ..= d_max (larger = finer); internally everything is indexed by
// depth_idx = depth - 1, so index 0 is the coarsest level and the last index
// the finest. Coarser dimensions are the ceil-half of the next finer level.
//
// The solver owns five working hierarchies per variable (u, coarse_src, tmp,
// damping_v, jac_rhs) plus one ρ hierarchy per (equation, molecule). Each is
// a plain Vec<Grid> indexed by depth, not a pointer web.

use crate::equation::{EquationSystem, FasError};
use crate::evaluator::EqnView;
use crate::grid::Grid;
use crate::stencil::StencilOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub fn of(g: &Grid) -> Self {
        Self {
            nx: g.nx,
            ny: g.ny,
            nz: g.nz,
        }
    }

    pub fn pts(self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Number of contiguous x-rows, the parallelisation unit.
    pub fn rows(self) -> usize {
        self.ny * self.nz
    }

    /// Next coarser level: ceil-half on every axis.
    pub fn coarsened(self) -> Dims {
        Dims {
            nx: self.nx.div_ceil(2),
            ny: self.ny.div_ceil(2),
            nz: self.nz.div_ceil(2),
        }
    }

    pub fn tuple(self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }
}

/// One grid per depth, coarsest first.
#[derive(Debug)]
pub struct Pyramid {
    pub grids: Vec<Grid>,
}

impl Pyramid {
    fn allocate(dims: &[Dims]) -> Self {
        Self {
            grids: dims.iter().map(|d| Grid::new(d.nx, d.ny, d.nz)).collect(),
        }
    }
}

#[derive(Debug)]
pub struct Hierarchy {
    /// Per-depth dimensions, coarsest first.
    pub dims: Vec<Dims>,
    pub u: Vec<Pyramid>,
    pub coarse_src: Vec<Pyramid>,
    pub tmp: Vec<Pyramid>,
    pub damping_v: Vec<Pyramid>,
    pub jac_rhs: Vec<Pyramid>,
    /// ρ source grids, one pyramid per (equation, molecule).
    pub rho: Vec<Vec<Pyramid>>,
}

impl Hierarchy {
    /// Build all pyramids. `finest_u` supplies the finest-level solution
    /// grids (one per variable) and fixes the finest dimensions.
    pub fn new(
        finest_u: Vec<Grid>,
        molecule_counts: &[usize],
        total_depths: usize,
    ) -> Result<Self, FasError> {
        if finest_u.is_empty() {
            return Err(FasError::NoVariables);
        }
        if finest_u.len() != molecule_counts.len() {
            return Err(FasError::MismatchedVariableCounts {
                n_grids: finest_u.len(),
                n_counts: molecule_counts.len(),
            });
        }
        let finest = Dims::of(&finest_u[0]);
        for (eqn_id, g) in finest_u.iter().enumerate() {
            if Dims::of(g) != finest {
                return Err(FasError::MismatchedFinestGrids {
                    eqn_id,
                    expected: finest.tuple(),
                    got: Dims::of(g).tuple(),
                });
            }
        }

        let mut dims = Vec::with_capacity(total_depths);
        let mut d = finest;
        for _ in 0..total_depths {
            dims.push(d);
            d = d.coarsened();
        }
        dims.reverse();

        let n_vars = finest_u.len();
        let finest_idx = dims.len() - 1;
        let u: Vec<Pyramid> = finest_u
            .into_iter()
            .map(|g| {
                let mut p = Pyramid::allocate(&dims);
                p.grids[finest_idx] = g;
                p
            })
            .collect();
        let alloc_set = |n: usize| (0..n).map(|_| Pyramid::allocate(&dims)).collect::<Vec<_>>();
        let rho = molecule_counts
            .iter()
            .map(|&nm| alloc_set(nm))
            .collect::<Vec<_>>();
        let coarse_src = alloc_set(n_vars);
        let tmp = alloc_set(n_vars);
        let damping_v = alloc_set(n_vars);
        let jac_rhs = alloc_set(n_vars);

        Ok(Self {
            dims,
            u,
            coarse_src,
            tmp,
            damping_v,
            jac_rhs,
            rho,
        })
    }

    /// Index of the finest depth.
    pub fn finest_idx(&self) -> usize {
        self.dims.len() - 1
    }

    pub fn n_vars(&self) -> usize {
        self.u.len()
    }

    /// Borrowed evaluator view for one equation at one depth.
    pub(crate) fn eqn_view<'a>(
        &'a self,
        sys: &'a EquationSystem,
        eqn_id: usize,
        depth_idx: usize,
        order: StencilOrder,
        h_len_frac: f64,
    ) -> EqnView<'a> {
        let dims = self.dims[depth_idx];
        EqnView {
            h: h_len_frac / dims.nx as f64,
            order,
            eqn: &sys.eqns[eqn_id],
            u: self.u.iter().map(|p| &p.grids[depth_idx]).collect(),
            v: self.damping_v.iter().map(|p| &p.grids[depth_idx]).collect(),
            rho: self.rho[eqn_id]
                .iter()
                .map(|p| &p.grids[depth_idx])
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarser_dims_are_ceil_halved() {
        let u = vec![Grid::new(16, 16, 16)];
        let h = Hierarchy::new(u, &[1], 4).unwrap();
        let sizes: Vec<usize> = h.dims.iter().map(|d| d.nx).collect();
        assert_eq!(sizes, vec![2, 4, 8, 16]);
        for w in h.dims.windows(2) {
            assert_eq!(w[0], w[1].coarsened());
        }
    }

    #[test]
    fn odd_sizes_round_up_when_coarsened() {
        let u = vec![Grid::new(9, 7, 5)];
        let h = Hierarchy::new(u, &[1], 3).unwrap();
        assert_eq!(h.dims[1].tuple(), (5, 4, 3));
        assert_eq!(h.dims[0].tuple(), (3, 2, 2));
    }

    #[test]
    fn finest_grids_must_agree() {
        let u = vec![Grid::new(8, 8, 8), Grid::new(8, 8, 4)];
        assert!(matches!(
            Hierarchy::new(u, &[1, 1], 2),
            Err(FasError::MismatchedFinestGrids { eqn_id: 1, .. })
        ));
    }

    #[test]
    fn rho_pyramids_follow_molecule_counts() {
        let u = vec![Grid::new(8, 8, 8), Grid::new(8, 8, 8)];
        let h = Hierarchy::new(u, &[3, 1], 2).unwrap();
        assert_eq!(h.rho.len(), 2);
        assert_eq!(h.rho[0].len(), 3);
        assert_eq!(h.rho[1].len(), 1);
        assert_eq!(h.rho[0][0].grids.len(), 2);
        assert_eq!(h.finest_idx(), 1);
    }
}
