// src/equation.rs
//
// Symbolic representation of the elliptic system: each equation is a sum of
// molecules, each molecule a constant coefficient times an ordered product of
// atoms. The evaluator dispatches on the atom tag with a plain match; there
// is no indirection in the inner loop.

use crate::stencil::Axis;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FasError {
    #[error("equation id {eqn_id} out of range (system has {n_eqns} equations)")]
    EquationOutOfRange { eqn_id: usize, n_eqns: usize },

    #[error("molecule id {mol_id} out of range for equation {eqn_id} ({n_molecules} molecules)")]
    MoleculeOutOfRange {
        eqn_id: usize,
        mol_id: usize,
        n_molecules: usize,
    },

    #[error("atom references unknown variable {u_id} (system has {n_vars} unknowns)")]
    VariableOutOfRange { u_id: usize, n_vars: usize },

    #[error("second-derivative axes must be ordered, got ({a1:?}, {a2:?})")]
    UnorderedDerivativeAxes { a1: Axis, a2: Axis },

    #[error("molecule {mol_id} of equation {eqn_id} has no atoms")]
    EmptyMolecule { eqn_id: usize, mol_id: usize },

    #[error("at least one unknown is required")]
    NoVariables,

    #[error("finest grids disagree in size: variable 0 is {expected:?}, variable {eqn_id} is {got:?}")]
    MismatchedFinestGrids {
        eqn_id: usize,
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("{n_grids} solution grids supplied for {n_counts} equations")]
    MismatchedVariableCounts { n_grids: usize, n_counts: usize },

    #[error("max_depth must be at least 1, got {0}")]
    InvalidMaxDepth(usize),

    #[error("unsupported stencil order {0} (supported: 2, 4, 6, 8)")]
    UnsupportedStencilOrder(usize),

    #[error("line search failed at depth {depth}: no damping factor in [0.01, 1] reduces the residual norm")]
    LineSearchFailure { depth: usize },
}

/// One factor of a product term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Atom {
    /// The per-(equation, molecule) ρ grid at the current depth.
    Const,
    /// u_{u_id}(x)^power.
    Poly { u_id: usize, power: f64 },
    /// ∂u_{u_id}/∂axis.
    Der1 { u_id: usize, axis: Axis },
    /// ∂²u_{u_id}/∂a1∂a2 with a1 ≤ a2 (axis-aligned or mixed).
    Der2 { u_id: usize, a1: Axis, a2: Axis },
    /// Δu_{u_id}.
    Lap { u_id: usize },
}

impl Atom {
    /// The unknown this atom reads, if any.
    pub fn u_id(&self) -> Option<usize> {
        match *self {
            Atom::Const => None,
            Atom::Poly { u_id, .. }
            | Atom::Der1 { u_id, .. }
            | Atom::Der2 { u_id, .. }
            | Atom::Lap { u_id } => Some(u_id),
        }
    }

    #[inline]
    pub(crate) fn depends_on(&self, var: usize) -> bool {
        self.u_id() == Some(var)
    }

    fn validate(&self, n_vars: usize) -> Result<(), FasError> {
        if let Some(u_id) = self.u_id() {
            if u_id >= n_vars {
                return Err(FasError::VariableOutOfRange { u_id, n_vars });
            }
        }
        if let Atom::Der2 { a1, a2, .. } = *self {
            if a1 > a2 {
                return Err(FasError::UnorderedDerivativeAxes { a1, a2 });
            }
        }
        Ok(())
    }
}

/// Product term: coef · ∏ atoms. Atom order is preserved; the derivative
/// accumulator sweep consumes atoms in exactly this order.
#[derive(Debug, Clone)]
pub struct Molecule {
    pub coef: f64,
    pub atoms: Vec<Atom>,
}

#[derive(Debug, Clone)]
pub struct Equation {
    pub molecules: Vec<Molecule>,
}

/// N equations, one unknown per equation, solved jointly.
#[derive(Debug, Clone)]
pub struct EquationSystem {
    pub eqns: Vec<Equation>,
}

impl EquationSystem {
    /// Empty system with the given molecule count per equation. Molecule
    /// coefficients default to 1.
    pub fn new(molecule_counts: &[usize]) -> Self {
        let eqns = molecule_counts
            .iter()
            .map(|&n| Equation {
                molecules: (0..n)
                    .map(|_| Molecule {
                        coef: 1.0,
                        atoms: Vec::new(),
                    })
                    .collect(),
            })
            .collect();
        Self { eqns }
    }

    pub fn n_vars(&self) -> usize {
        self.eqns.len()
    }

    pub(crate) fn check_ids(&self, eqn_id: usize, mol_id: usize) -> Result<(), FasError> {
        if eqn_id >= self.eqns.len() {
            return Err(FasError::EquationOutOfRange {
                eqn_id,
                n_eqns: self.eqns.len(),
            });
        }
        let n_molecules = self.eqns[eqn_id].molecules.len();
        if mol_id >= n_molecules {
            return Err(FasError::MoleculeOutOfRange {
                eqn_id,
                mol_id,
                n_molecules,
            });
        }
        Ok(())
    }

    pub fn add_atom(&mut self, atom: Atom, mol_id: usize, eqn_id: usize) -> Result<(), FasError> {
        self.check_ids(eqn_id, mol_id)?;
        atom.validate(self.n_vars())?;
        self.eqns[eqn_id].molecules[mol_id].atoms.push(atom);
        Ok(())
    }

    pub fn set_coefficient(
        &mut self,
        eqn_id: usize,
        mol_id: usize,
        coef: f64,
    ) -> Result<(), FasError> {
        self.check_ids(eqn_id, mol_id)?;
        self.eqns[eqn_id].molecules[mol_id].coef = coef;
        Ok(())
    }

    /// Every molecule must carry at least one atom before solving.
    pub fn validate_complete(&self) -> Result<(), FasError> {
        for (eqn_id, eqn) in self.eqns.iter().enumerate() {
            for (mol_id, mol) in eqn.molecules.iter().enumerate() {
                if mol.atoms.is_empty() {
                    return Err(FasError::EmptyMolecule { eqn_id, mol_id });
                }
            }
        }
        Ok(())
    }
}
