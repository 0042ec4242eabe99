// src/evaluator.rs
//
// Pointwise evaluation of one equation at one depth: the operator value
// F_e(x), its Fréchet derivative applied to the current Jacobi correction,
// and the diagonal coefficients used by the damped Jacobi update.
//
// All three walk each molecule's atoms in order with running accumulators:
//   non_der  is the product of the atom values consumed so far;
//   der      is the sum of products where exactly one factor has been replaced by
//              its linearisation with respect to the target unknown;
//   mol_to_a is like `der` evaluated at the current correction, minus the
//              stencil self-coefficient of the site;
//   mol_to_b is the coefficient of the site's own correction value in the
//              linearisation (the Jacobi diagonal).
// The recurrences are order-dependent; atoms must be consumed in molecule
// order with non_der = 1 and the others starting at 0.

use crate::equation::{Atom, Equation};
use crate::grid::Grid;
use crate::stencil::{self, StencilOrder};

/// Borrowed view of everything needed to evaluate one equation at one depth.
/// Holds only shared references, so it can be captured by parallel site loops.
pub(crate) struct EqnView<'a> {
    /// Grid spacing at this depth (h_len_frac / nx).
    pub h: f64,
    pub order: StencilOrder,
    pub eqn: &'a Equation,
    /// Current approximation, indexed by unknown.
    pub u: Vec<&'a Grid>,
    /// Jacobi correction (damping_v), indexed by unknown.
    pub v: Vec<&'a Grid>,
    /// ρ source grids of this equation, indexed by molecule.
    pub rho: Vec<&'a Grid>,
}

impl<'a> EqnView<'a> {
    #[inline]
    fn atom_value(&self, atom: &Atom, mol_id: usize, i: isize, j: isize, k: isize) -> f64 {
        match *atom {
            Atom::Const => self.rho[mol_id].at(i, j, k),
            Atom::Poly { u_id, power } => self.u[u_id].at(i, j, k).powf(power),
            Atom::Der1 { u_id, axis } => {
                stencil::d1(self.order, self.u[u_id], i, j, k, axis, self.h)
            }
            Atom::Der2 { u_id, a1, a2 } => {
                stencil::d2(self.order, self.u[u_id], i, j, k, a1, a2, self.h)
            }
            Atom::Lap { u_id } => stencil::laplacian(self.order, self.u[u_id], i, j, k, self.h),
        }
    }

    /// Linearisation of `atom` with respect to u_var, applied to the current
    /// correction v_var. Stencil atoms are linear, so this is the same
    /// stencil on v; the polynomial contributes p·u^{p-1}·v at the site.
    #[inline]
    fn atom_linearised(&self, atom: &Atom, var: usize, i: isize, j: isize, k: isize) -> f64 {
        match *atom {
            Atom::Poly { u_id, power } => {
                power * self.u[u_id].at(i, j, k).powf(power - 1.0) * self.v[var].at(i, j, k)
            }
            Atom::Der1 { axis, .. } => stencil::d1(self.order, self.v[var], i, j, k, axis, self.h),
            Atom::Der2 { a1, a2, .. } => {
                stencil::d2(self.order, self.v[var], i, j, k, a1, a2, self.h)
            }
            Atom::Lap { .. } => stencil::laplacian(self.order, self.v[var], i, j, k, self.h),
            Atom::Const => 0.0,
        }
    }

    /// F_e at the site: Σ_m coef_m · ∏ atom values.
    pub fn eval(&self, i: isize, j: isize, k: isize) -> f64 {
        let mut res = 0.0;
        for (mol_id, mol) in self.eqn.molecules.iter().enumerate() {
            let mut val = 1.0;
            for atom in &mol.atoms {
                val *= self.atom_value(atom, mol_id, i, j, k);
            }
            res += mol.coef * val;
        }
        res
    }

    /// (∂F_e/∂u_var · v_var) at the site. Zero correction gives exactly zero.
    pub fn eval_der(&self, i: isize, j: isize, k: isize, var: usize) -> f64 {
        let mut res = 0.0;
        for (mol_id, mol) in self.eqn.molecules.iter().enumerate() {
            let mut non_der = 1.0;
            let mut der = 0.0;
            for atom in &mol.atoms {
                let a_val = self.atom_value(atom, mol_id, i, j, k);
                if atom.depends_on(var) {
                    let a_lin = self.atom_linearised(atom, var, i, j, k);
                    der = non_der * a_lin + der * a_val;
                } else {
                    der *= a_val;
                }
                non_der *= a_val;
            }
            res += mol.coef * der;
        }
        res
    }

    /// Coefficients (a, b) of the damped Jacobi update on u_var: with
    /// cross = Σ_{j≠var} eval_der(·, j), one relaxation step writes
    /// v_var = (a − jac_rhs + cross) / (−b). `a` is the linearisation applied
    /// to the current v minus the site's self-term; `b` is the site's own
    /// (signed) diagonal coefficient.
    pub fn jac_coeffs(&self, i: isize, j: isize, k: isize, var: usize) -> (f64, f64) {
        let h2 = self.h * self.h;
        let diag2 = self.order.diag2();
        let v_site = self.v[var].at(i, j, k);

        let mut coef_a = 0.0;
        let mut coef_b = 0.0;
        for (mol_id, mol) in self.eqn.molecules.iter().enumerate() {
            let mut non_der = 1.0;
            let mut mol_to_a = 0.0;
            let mut mol_to_b = 0.0;
            for atom in &mol.atoms {
                let a_val = self.atom_value(atom, mol_id, i, j, k);
                if !atom.depends_on(var) {
                    non_der *= a_val;
                    mol_to_a *= a_val;
                    mol_to_b *= a_val;
                    continue;
                }
                match *atom {
                    Atom::Poly { u_id, power } => {
                        // The polynomial's whole linearisation is a site-local
                        // multiple of v, so it all lands in the diagonal.
                        let slope = power * self.u[u_id].at(i, j, k).powf(power - 1.0);
                        mol_to_a *= a_val;
                        mol_to_b = mol_to_b * a_val + non_der * slope;
                    }
                    Atom::Der1 { .. } => {
                        let lin = self.atom_linearised(atom, var, i, j, k);
                        mol_to_a = mol_to_a * a_val + non_der * lin;
                        mol_to_b *= a_val;
                    }
                    Atom::Der2 { a1, a2, .. } => {
                        let lin = self.atom_linearised(atom, var, i, j, k);
                        if a1 == a2 {
                            let diag = diag2 / h2;
                            mol_to_a = mol_to_a * a_val + non_der * (lin + diag * v_site);
                            mol_to_b = mol_to_b * a_val - non_der * diag;
                        } else {
                            mol_to_a = mol_to_a * a_val + non_der * lin;
                            mol_to_b *= a_val;
                        }
                    }
                    Atom::Lap { .. } => {
                        let lin = self.atom_linearised(atom, var, i, j, k);
                        let diag = 3.0 * diag2 / h2;
                        mol_to_a = mol_to_a * a_val + non_der * (lin + diag * v_site);
                        mol_to_b = mol_to_b * a_val - non_der * diag;
                    }
                    Atom::Const => unreachable!("Const atoms depend on no unknown"),
                }
                non_der *= a_val;
            }
            coef_a += mol.coef * mol_to_a;
            coef_b += mol.coef * mol_to_b;
        }
        (coef_a, coef_b)
    }
}
