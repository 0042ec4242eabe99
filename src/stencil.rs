// src/stencil.rs
//
// Central finite-difference stencils on a periodic Grid: first derivative,
// second (axis-aligned or mixed) derivative, and the Laplacian, at a fixed
// even order K ∈ {2, 4, 6, 8}. All operators are linear in the grid.
//
// Mixed derivatives are the composition of the two 1D first-derivative
// stencils, so their centre coefficient is zero; only axis-aligned second
// derivatives (and the Laplacian) contribute to the Jacobi diagonal, which is
// why `diag2` is the single constant the solver needs from this module.

use crate::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    fn unit(self) -> (isize, isize, isize) {
        match self {
            Axis::X => (1, 0, 0),
            Axis::Y => (0, 1, 0),
            Axis::Z => (0, 0, 1),
        }
    }
}

/// Finite-difference order of every stencil in a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOrder {
    Two,
    Four,
    Six,
    Eight,
}

impl StencilOrder {
    pub fn from_order(order: usize) -> Option<Self> {
        match order {
            2 => Some(Self::Two),
            4 => Some(Self::Four),
            6 => Some(Self::Six),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn order(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Four => 4,
            Self::Six => 6,
            Self::Eight => 8,
        }
    }

    /// Magnitude of the centre coefficient of the axis-aligned
    /// second-derivative stencil (before the 1/h² factor). The Laplacian's
    /// centre contribution is 3·diag2 over the three axes.
    pub fn diag2(self) -> f64 {
        match self {
            Self::Two => 2.0,
            Self::Four => 5.0 / 2.0,
            Self::Six => 49.0 / 18.0,
            Self::Eight => 205.0 / 72.0,
        }
    }

    /// Off-centre weights of the first-derivative stencil; entry m applies
    /// antisymmetrically at offsets ±(m+1).
    fn d1_weights(self) -> &'static [f64] {
        match self {
            Self::Two => &[1.0 / 2.0],
            Self::Four => &[2.0 / 3.0, -1.0 / 12.0],
            Self::Six => &[3.0 / 4.0, -3.0 / 20.0, 1.0 / 60.0],
            Self::Eight => &[4.0 / 5.0, -1.0 / 5.0, 4.0 / 105.0, -1.0 / 280.0],
        }
    }

    /// (centre, off-centre) weights of the second-derivative stencil; entry m
    /// applies symmetrically at offsets ±(m+1).
    fn d2_weights(self) -> (f64, &'static [f64]) {
        match self {
            Self::Two => (-2.0, &[1.0]),
            Self::Four => (-5.0 / 2.0, &[4.0 / 3.0, -1.0 / 12.0]),
            Self::Six => (-49.0 / 18.0, &[3.0 / 2.0, -3.0 / 20.0, 1.0 / 90.0]),
            Self::Eight => (
                -205.0 / 72.0,
                &[8.0 / 5.0, -1.0 / 5.0, 8.0 / 315.0, -1.0 / 560.0],
            ),
        }
    }
}

/// First derivative ∂g/∂axis at (i, j, k), spacing h.
pub fn d1(order: StencilOrder, g: &Grid, i: isize, j: isize, k: isize, axis: Axis, h: f64) -> f64 {
    let (di, dj, dk) = axis.unit();
    let mut acc = 0.0;
    for (m, &w) in order.d1_weights().iter().enumerate() {
        let s = (m + 1) as isize;
        acc += w * (g.at(i + s * di, j + s * dj, k + s * dk) - g.at(i - s * di, j - s * dj, k - s * dk));
    }
    acc / h
}

/// Second derivative ∂²g/∂a1∂a2 at (i, j, k), spacing h. Axis-aligned when
/// a1 == a2, otherwise the mixed derivative.
pub fn d2(
    order: StencilOrder,
    g: &Grid,
    i: isize,
    j: isize,
    k: isize,
    a1: Axis,
    a2: Axis,
    h: f64,
) -> f64 {
    if a1 == a2 {
        let (di, dj, dk) = a1.unit();
        let (c0, weights) = order.d2_weights();
        let mut acc = c0 * g.at(i, j, k);
        for (m, &w) in weights.iter().enumerate() {
            let s = (m + 1) as isize;
            acc += w
                * (g.at(i + s * di, j + s * dj, k + s * dk)
                    + g.at(i - s * di, j - s * dj, k - s * dk));
        }
        acc / (h * h)
    } else {
        let (pi, pj, pk) = a1.unit();
        let (qi, qj, qk) = a2.unit();
        let w1 = order.d1_weights();
        let mut acc = 0.0;
        for (m, &wm) in w1.iter().enumerate() {
            let s = (m + 1) as isize;
            for (n, &wn) in w1.iter().enumerate() {
                let t = (n + 1) as isize;
                acc += wm
                    * wn
                    * (g.at(i + s * pi + t * qi, j + s * pj + t * qj, k + s * pk + t * qk)
                        - g.at(i + s * pi - t * qi, j + s * pj - t * qj, k + s * pk - t * qk)
                        - g.at(i - s * pi + t * qi, j - s * pj + t * qj, k - s * pk + t * qk)
                        + g.at(i - s * pi - t * qi, j - s * pj - t * qj, k - s * pk - t * qk));
            }
        }
        acc / (h * h)
    }
}

/// Laplacian Δg at (i, j, k), spacing h.
pub fn laplacian(order: StencilOrder, g: &Grid, i: isize, j: isize, k: isize, h: f64) -> f64 {
    d2(order, g, i, j, k, Axis::X, Axis::X, h)
        + d2(order, g, i, j, k, Axis::Y, Axis::Y, h)
        + d2(order, g, i, j, k, Axis::Z, Axis::Z, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_grid(n: usize) -> Grid {
        let mut g = Grid::new(n, n, n);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let x = (i as f64 + 0.5) / n as f64;
                    g.set(i as isize, j as isize, k as isize, (2.0 * PI * x).sin());
                }
            }
        }
        g
    }

    #[test]
    fn diag2_matches_second_derivative_centre_coefficient() {
        for order in [
            StencilOrder::Two,
            StencilOrder::Four,
            StencilOrder::Six,
            StencilOrder::Eight,
        ] {
            let n = 16;
            let h = 1.0 / n as f64;
            let mut g = Grid::new(n, n, n);
            g.set(4, 4, 4, 1.0);
            let dxx = d2(order, &g, 4, 4, 4, Axis::X, Axis::X, h);
            assert!(
                (dxx + order.diag2() / (h * h)).abs() < 1e-9,
                "order {}: centre coefficient {} vs -diag2/h^2 {}",
                order.order(),
                dxx,
                -order.diag2() / (h * h)
            );
            let lap = laplacian(order, &g, 4, 4, 4, h);
            assert!((lap + 3.0 * order.diag2() / (h * h)).abs() < 1e-9);
        }
    }

    #[test]
    fn mixed_derivative_has_no_centre_coefficient() {
        let n = 16;
        let h = 1.0 / n as f64;
        let mut g = Grid::new(n, n, n);
        g.set(4, 4, 4, 1.0);
        let dxy = d2(StencilOrder::Four, &g, 4, 4, 4, Axis::X, Axis::Y, h);
        assert_eq!(dxy, 0.0);
    }

    #[test]
    fn first_derivative_of_sine_approximates_cosine() {
        let n = 32;
        let h = 1.0 / n as f64;
        let g = sine_grid(n);
        let x = 3.5 * h;
        let exact = 2.0 * PI * (2.0 * PI * x).cos();
        let approx = d1(StencilOrder::Two, &g, 3, 7, 9, Axis::X, h);
        assert!(
            (approx - exact).abs() < 0.05 * exact.abs().max(1.0),
            "approx {} vs exact {}",
            approx,
            exact
        );
        // Higher order shrinks the error.
        let approx6 = d1(StencilOrder::Six, &g, 3, 7, 9, Axis::X, h);
        assert!((approx6 - exact).abs() < (approx - exact).abs());
    }

    #[test]
    fn operators_vanish_on_constant_fields() {
        let n = 8;
        let h = 0.25;
        let mut g = Grid::new(n, n, n);
        g.shift(3.25);
        for order in [StencilOrder::Two, StencilOrder::Eight] {
            assert!(d1(order, &g, 2, 3, 4, Axis::Y, h).abs() < 1e-12);
            assert!(d2(order, &g, 2, 3, 4, Axis::Z, Axis::Z, h).abs() < 1e-9);
            assert!(d2(order, &g, 2, 3, 4, Axis::X, Axis::Z, h).abs() < 1e-12);
            assert!(laplacian(order, &g, 2, 3, 4, h).abs() < 1e-9);
        }
    }
}
