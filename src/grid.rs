// src/grid.rs
//
// Dense 3D scalar field on a uniformly spaced, periodic Cartesian grid.
// Storage is a flat Vec with x-rows contiguous: index = (k*ny + j)*nx + i.
// Bulk operations parallelise over x-rows; floating-point sums are combined
// with a fixed pairwise tree so a run is reproducible for a given grid size
// regardless of how rayon schedules the rows.

use rayon::prelude::*;

#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub data: Vec<f64>,
}

impl Grid {
    /// Create a zero-initialised nx × ny × nz grid.
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![0.0; nx * ny * nz],
        }
    }

    /// Total number of points.
    #[inline]
    pub fn pts(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Flat index for in-range indices (no wrapping).
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (k * self.ny + j) * self.nx + i
    }

    /// Flat index with toroidal wrapping; any integer index is valid.
    #[inline]
    pub fn wrap(&self, i: isize, j: isize, k: isize) -> usize {
        let i = i.rem_euclid(self.nx as isize) as usize;
        let j = j.rem_euclid(self.ny as isize) as usize;
        let k = k.rem_euclid(self.nz as isize) as usize;
        (k * self.ny + j) * self.nx + i
    }

    /// Read with periodic wrap.
    #[inline]
    pub fn at(&self, i: isize, j: isize, k: isize) -> f64 {
        self.data[self.wrap(i, j, k)]
    }

    /// Write with periodic wrap.
    #[inline]
    pub fn set(&mut self, i: isize, j: isize, k: isize, value: f64) {
        let idx = self.wrap(i, j, k);
        self.data[idx] = value;
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy values from a grid of the same dimensions.
    pub fn copy_from(&mut self, other: &Grid) {
        debug_assert_eq!(self.pts(), other.pts());
        self.data.copy_from_slice(&other.data);
    }

    /// Add a constant to every point.
    pub fn shift(&mut self, c: f64) {
        self.data.par_iter_mut().for_each(|v| *v += c);
    }

    /// Sum of all values (deterministic pairwise reduction).
    pub fn total(&self) -> f64 {
        let row_sums: Vec<f64> = self
            .data
            .par_chunks(self.nx.max(1))
            .map(pairwise_sum)
            .collect();
        pairwise_sum(&row_sums)
    }

    pub fn average(&self) -> f64 {
        self.total() / self.pts() as f64
    }

    pub fn min_value(&self) -> f64 {
        self.data
            .par_iter()
            .copied()
            .reduce(|| f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.data
            .par_iter()
            .copied()
            .reduce(|| f64::NEG_INFINITY, f64::max)
    }
}

/// Fixed-tree pairwise summation. The split points depend only on the slice
/// length, so the result is independent of thread count and scheduling.
pub(crate) fn pairwise_sum(values: &[f64]) -> f64 {
    if values.len() <= 8 {
        return values.iter().sum();
    }
    let mid = values.len() / 2;
    pairwise_sum(&values[..mid]) + pairwise_sum(&values[mid..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_is_row_major_in_x() {
        let g = Grid::new(4, 3, 2);
        assert_eq!(g.idx(0, 0, 0), 0);
        assert_eq!(g.idx(1, 0, 0), 1);
        assert_eq!(g.idx(0, 1, 0), 4);
        assert_eq!(g.idx(0, 0, 1), 12);
        assert_eq!(g.pts(), 24);
    }

    #[test]
    fn periodic_wrap_matches_opposite_face() {
        let mut g = Grid::new(4, 4, 4);
        g.set(3, 1, 2, 7.5);
        assert_eq!(g.at(-1, 1, 2), 7.5);
        assert_eq!(g.at(7, 1, 2), 7.5);
        assert_eq!(g.at(3, 5, -2), g.at(3, 1, 2));
    }

    #[test]
    fn reductions_and_shift() {
        let mut g = Grid::new(8, 8, 8);
        g.shift(2.0);
        g.set(0, 0, 0, -1.0);
        assert!((g.total() - (511.0 * 2.0 - 1.0)).abs() < 1e-12);
        assert_eq!(g.min_value(), -1.0);
        assert_eq!(g.max_value(), 2.0);
        let avg = g.average();
        assert!((avg - g.total() / 512.0).abs() < 1e-15);
    }

    #[test]
    fn pairwise_sum_matches_sequential_on_uniform_data() {
        let v = vec![0.125; 1000];
        assert!((pairwise_sum(&v) - 125.0).abs() < 1e-12);
    }
}
