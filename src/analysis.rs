//! Finite-element analysis of the penalized density field

use crate::core::{CgSettings, Penalization};
use crate::element::{ElementMatrix, Q4};
use crate::error::{OryxError, Result};
use crate::mesh::Mesh;
use crate::solver::{CgSummary, LinearOperator, PcgSolver};
use log::{debug, info};
use nalgebra::{DVector, SVector};

/// Matrix-free global stiffness operator.
///
/// The global matrix is never materialized: the product gathers the eight
/// element displacements, multiplies by `E(rho_e) * KE`, and scatters the
/// result. Fixed DOFs are treated with the zero-row/column plus
/// unit-diagonal technique.
#[derive(Debug, Clone)]
pub struct ElasticModel {
    mesh: Mesh,
    ke: ElementMatrix,
    dofs: Vec<[usize; 8]>,
    youngs: Vec<f64>,
    fixed: Vec<bool>,
}

impl ElasticModel {
    pub fn new(mesh: Mesh, element: &Q4, fixed_dofs: &[usize]) -> Self {
        let dofs = (0..mesh.num_elements())
            .map(|e| mesh.element_dofs_of(e))
            .collect();
        let mut model = Self {
            mesh,
            ke: element.stiffness(),
            dofs,
            youngs: vec![0.0; mesh.num_elements()],
            fixed: vec![false; mesh.num_dofs()],
        };
        model.set_fixed_dofs(fixed_dofs);
        model
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn stiffness_matrix(&self) -> &ElementMatrix {
        &self.ke
    }

    /// Replace the set of prescribed-zero DOFs
    pub fn set_fixed_dofs(&mut self, fixed_dofs: &[usize]) {
        self.fixed.iter_mut().for_each(|f| *f = false);
        for &dof in fixed_dofs {
            self.fixed[dof] = true;
        }
    }

    /// Update the per-element penalized moduli from the current densities
    pub fn set_densities(&mut self, densities: &[f64], penalization: &Penalization) {
        debug_assert_eq!(densities.len(), self.youngs.len());
        for (young, &rho) in self.youngs.iter_mut().zip(densities.iter()) {
            *young = penalization.modulus(rho);
        }
    }

    fn gather(&self, x: &DVector<f64>, element: usize) -> SVector<f64, 8> {
        let dofs = &self.dofs[element];
        let mut local = SVector::<f64, 8>::zeros();
        for (a, &dof) in dofs.iter().enumerate() {
            if !self.fixed[dof] {
                local[a] = x[dof];
            }
        }
        local
    }
}

impl LinearOperator for ElasticModel {
    fn dimension(&self) -> usize {
        self.mesh.num_dofs()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        y.fill(0.0);
        for element in 0..self.mesh.num_elements() {
            let local = self.gather(x, element);
            let force = self.ke * local * self.youngs[element];
            for (a, &dof) in self.dofs[element].iter().enumerate() {
                if !self.fixed[dof] {
                    y[dof] += force[a];
                }
            }
        }
        for (dof, &is_fixed) in self.fixed.iter().enumerate() {
            if is_fixed {
                y[dof] = x[dof];
            }
        }
    }

    fn diagonal(&self, out: &mut DVector<f64>) {
        out.fill(0.0);
        for element in 0..self.mesh.num_elements() {
            let young = self.youngs[element];
            for (a, &dof) in self.dofs[element].iter().enumerate() {
                out[dof] += young * self.ke[(a, a)];
            }
        }
        for (dof, &is_fixed) in self.fixed.iter().enumerate() {
            if is_fixed {
                out[dof] = 1.0;
            }
        }
    }

    fn fixed(&self) -> &[bool] {
        &self.fixed
    }
}

/// Result of one equilibrium solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeaOutcome {
    pub compliance: f64,
    pub cg: CgSummary,
}

/// Static analysis of the SIMP-penalized structure.
///
/// Owns the displacement vector and the CG work vectors so that repeated
/// solves allocate nothing.
#[derive(Debug, Clone)]
pub struct StaticAnalysis {
    model: ElasticModel,
    solver: PcgSolver,
    displacements: DVector<f64>,
}

impl StaticAnalysis {
    pub fn new(mesh: Mesh, element: &Q4, fixed_dofs: &[usize], cg: CgSettings) -> Self {
        let model = ElasticModel::new(mesh, element, fixed_dofs);
        let ndof = mesh.num_dofs();
        info!(
            "Static analysis over {} elements, {} DOFs ({} fixed)",
            mesh.num_elements(),
            ndof,
            fixed_dofs.len()
        );
        Self {
            model,
            solver: PcgSolver::new(ndof, cg),
            displacements: DVector::zeros(ndof),
        }
    }

    pub fn model(&self) -> &ElasticModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ElasticModel {
        &mut self.model
    }

    pub fn displacements(&self) -> &DVector<f64> {
        &self.displacements
    }

    /// Solve equilibrium for the given densities and recover per-element
    /// strain energies, the total compliance, and the compliance
    /// sensitivities.
    ///
    /// `strain_energy[e]` receives the unit-modulus energy
    /// `u_e^T * KE * u_e`; the compliance accumulates `E(rho_e)` times that
    /// energy, and the sensitivity is its negative density derivative.
    pub fn run(
        &mut self,
        densities: &[f64],
        penalization: &Penalization,
        forces: &DVector<f64>,
        strain_energy: &mut [f64],
        sensitivities: &mut [f64],
    ) -> Result<FeaOutcome> {
        let elements = self.model.mesh.num_elements();
        debug_assert_eq!(densities.len(), elements);
        debug_assert_eq!(strain_energy.len(), elements);
        debug_assert_eq!(sensitivities.len(), elements);

        self.model.set_densities(densities, penalization);
        let cg = self
            .solver
            .solve(&self.model, forces, &mut self.displacements)?;
        debug!(
            "Equilibrium solve: {} CG iterations, residual {:.3e}",
            cg.iterations, cg.residual
        );

        let mut compliance = 0.0;
        for element in 0..elements {
            let local = self.model.gather(&self.displacements, element);
            let energy = local.dot(&(self.model.ke * local)).max(0.0);
            strain_energy[element] = energy;
            compliance += penalization.modulus(densities[element]) * energy;
            sensitivities[element] = -penalization.gradient(densities[element]) * energy;
        }

        if !compliance.is_finite() {
            return Err(OryxError::Nonfinite("compliance evaluation".to_string()));
        }

        Ok(FeaOutcome { compliance, cg })
    }
}
