//! Iterative SIMP optimizer driving the FEA / filter / OC pipeline

use crate::analysis::StaticAnalysis;
use crate::core::{
    FilterScheme, HistoryPoint, OptimizerConfig, Penalization, Snapshot,
};
use crate::element::Q4;
use crate::error::{OryxError, Result, Validate};
use crate::filter::Filter;
use crate::materials::SoftMaterial;
use crate::mesh::Mesh;
use crate::oc::OcUpdate;
use crate::stress::{StressModel, StressSettings, StressSummary};
use log::{debug, info, warn};
use nalgebra::DVector;

/// Compliance-minimizing topology optimizer over a rectangular Q4 mesh.
///
/// One value per run: the mesh, element stiffness, filter tables, and fixed
/// DOFs are frozen at construction, and every per-iteration buffer is
/// allocated once and reused. `step()` advances exactly one outer iteration
/// of FEA -> sensitivities -> filter -> OC and returns an owned snapshot;
/// the caller decides scheduling. After convergence further steps are
/// no-ops.
pub struct Optimizer {
    config: OptimizerConfig,
    mesh: Mesh,
    penalization: Penalization,
    filter: Filter,
    analysis: StaticAnalysis,
    oc: OcUpdate,
    stress: Option<StressModel>,

    forces: DVector<f64>,
    fixed_dofs: Vec<usize>,

    densities: Vec<f64>,
    strain_energy: Vec<f64>,
    sensitivities: Vec<f64>,
    filtered: Vec<f64>,
    next_densities: Vec<f64>,

    compliance: f64,
    volume: f64,
    iteration: u32,
    change: f64,
    converged: bool,
    poisoned: bool,
}

impl Optimizer {
    /// Build an optimizer for the standard compliance problem.
    ///
    /// `forces` must have length `2 * (nelx + 1) * (nely + 1)` and
    /// `fixed_dofs` must contain in-range DOF indices (duplicates are
    /// allowed and ignored).
    pub fn new(config: OptimizerConfig, forces: Vec<f64>, fixed_dofs: Vec<usize>) -> Result<Self> {
        let element = Q4::new(config.poisson_ratio, 1.0);
        Self::build(config, element, None, forces, fixed_dofs)
    }

    /// Build the stress-constrained variant for a soft material.
    ///
    /// The material's modulus and Poisson's ratio replace the configured
    /// `e_solid` and `poisson_ratio`, so forces are interpreted in physical
    /// units consistent with the material and the configured element size.
    pub fn with_soft_material(
        mut config: OptimizerConfig,
        material: SoftMaterial,
        stress: StressSettings,
        forces: Vec<f64>,
        fixed_dofs: Vec<usize>,
    ) -> Result<Self> {
        material.validate()?;
        config.e_solid = material.young_modulus;
        config.e_min = material.young_modulus * 1e-9;
        config.poisson_ratio = material.poisson_ratio;

        let element = Q4::new(config.poisson_ratio, stress.element_size);
        let mesh = Mesh::new(config.nelx, config.nely);
        let stress_model = StressModel::new(mesh, &element, &material, stress)?;
        info!(
            "Stress-constrained run with {} (E = {:.3e} Pa)",
            material.name, material.young_modulus
        );
        Self::build(config, element, Some(stress_model), forces, fixed_dofs)
    }

    fn build(
        config: OptimizerConfig,
        element: Q4,
        stress: Option<StressModel>,
        forces: Vec<f64>,
        fixed_dofs: Vec<usize>,
    ) -> Result<Self> {
        config.validate()?;

        let mesh = Mesh::new(config.nelx, config.nely);
        Self::check_inputs(&mesh, &forces, &fixed_dofs)?;

        let filter = Filter::new(config.nelx, config.nely, config.rmin);
        filter.verify_weights()?;

        let analysis = StaticAnalysis::new(mesh, &element, &fixed_dofs, config.cg.clone());
        let oc = OcUpdate::new(config.oc.clone(), config.volfrac);
        let penalization = Penalization::from_config(&config);
        let elements = mesh.num_elements();

        info!(
            "Optimizer ready: {}x{} mesh, volume fraction {}, penal {}, rmin {}",
            config.nelx, config.nely, config.volfrac, config.penal, config.rmin
        );

        Ok(Self {
            densities: vec![config.volfrac; elements],
            strain_energy: vec![0.0; elements],
            sensitivities: vec![0.0; elements],
            filtered: vec![0.0; elements],
            next_densities: vec![0.0; elements],
            compliance: f64::INFINITY,
            volume: config.volfrac,
            iteration: 0,
            change: 1.0,
            converged: false,
            poisoned: false,
            forces: DVector::from_vec(forces),
            fixed_dofs: Self::normalize_fixed(fixed_dofs),
            config,
            mesh,
            penalization,
            filter,
            analysis,
            oc,
            stress,
        })
    }

    fn check_inputs(mesh: &Mesh, forces: &[f64], fixed_dofs: &[usize]) -> Result<()> {
        if forces.len() != mesh.num_dofs() {
            return Err(OryxError::InvalidInput(format!(
                "force vector has length {}, expected {}",
                forces.len(),
                mesh.num_dofs()
            )));
        }
        if forces.iter().any(|f| !f.is_finite()) {
            return Err(OryxError::InvalidInput(
                "force vector contains non-finite entries".to_string(),
            ));
        }
        if let Some(&dof) = fixed_dofs.iter().find(|&&dof| dof >= mesh.num_dofs()) {
            return Err(OryxError::InvalidInput(format!(
                "fixed DOF {} is out of range (ndof = {})",
                dof,
                mesh.num_dofs()
            )));
        }
        if fixed_dofs.is_empty() {
            warn!("no fixed DOFs: the stiffness operator will be singular");
        }
        if forces.iter().all(|&f| f == 0.0) {
            warn!("force vector is identically zero");
        }
        Ok(())
    }

    fn normalize_fixed(mut fixed_dofs: Vec<usize>) -> Vec<usize> {
        fixed_dofs.sort_unstable();
        fixed_dofs.dedup();
        fixed_dofs
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Replace the force vector; only valid before the first step after
    /// construction or reset
    pub fn set_forces(&mut self, forces: Vec<f64>) -> Result<()> {
        if self.iteration > 0 {
            return Err(OryxError::InvalidInput(
                "forces can only be replaced before the first step".to_string(),
            ));
        }
        Self::check_inputs(&self.mesh, &forces, &self.fixed_dofs)?;
        self.forces = DVector::from_vec(forces);
        Ok(())
    }

    /// Replace the fixed DOF set; only valid before the first step after
    /// construction or reset
    pub fn set_fixed_dofs(&mut self, fixed_dofs: Vec<usize>) -> Result<()> {
        if self.iteration > 0 {
            return Err(OryxError::InvalidInput(
                "fixed DOFs can only be replaced before the first step".to_string(),
            ));
        }
        Self::check_inputs(&self.mesh, self.forces.as_slice(), &fixed_dofs)?;
        self.fixed_dofs = Self::normalize_fixed(fixed_dofs);
        self.analysis.model_mut().set_fixed_dofs(&self.fixed_dofs);
        Ok(())
    }

    /// Advance one outer iteration and return the resulting state.
    ///
    /// Idempotent after convergence. A `Nonfinite` failure poisons the state
    /// until `reset()` is called.
    pub fn step(&mut self) -> Result<Snapshot> {
        if self.poisoned {
            return Err(OryxError::Nonfinite(
                "optimizer state is invalid; call reset()".to_string(),
            ));
        }
        if self.converged {
            return Ok(self.state());
        }

        let outcome = match self.analysis.run(
            &self.densities,
            &self.penalization,
            &self.forces,
            &mut self.strain_energy,
            &mut self.sensitivities,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                if matches!(err, OryxError::Nonfinite(_)) {
                    self.poisoned = true;
                }
                return Err(err);
            }
        };

        if let Some(stress) = &mut self.stress {
            stress.evaluate(
                self.analysis.displacements(),
                &self.densities,
                &self.penalization,
            );
            stress.augment_sensitivities(
                &self.densities,
                &self.penalization,
                &mut self.sensitivities,
            );
        }

        match self.config.filter {
            FilterScheme::Sensitivity => {
                self.filter.smooth_sensitivities(
                    &self.densities,
                    &self.sensitivities,
                    &mut self.filtered,
                );
            }
            FilterScheme::Density => {
                // The density filter enters through its chain rule on the
                // gradients, so the OC update always runs last and its
                // bisected output is what gets published
                self.filter
                    .backproject_sensitivities(&self.sensitivities, &mut self.filtered);
            }
        }
        let change = self
            .oc
            .update(&self.densities, &self.filtered, &mut self.next_densities);

        std::mem::swap(&mut self.densities, &mut self.next_densities);

        if let Some(stress) = &self.stress {
            stress.enforce_wall_thickness(
                &mut self.densities,
                &mut self.next_densities,
                &self.config.oc,
            );
        }

        self.compliance = outcome.compliance;
        self.volume = self.densities.iter().sum::<f64>() / self.densities.len() as f64;
        self.change = change;
        self.iteration += 1;
        self.converged = self.change < self.config.tolx || self.iteration >= self.config.max_iterations;

        debug!(
            "iteration {}: compliance {:.6e}, change {:.4}, volume {:.4}, CG {} its",
            self.iteration, self.compliance, self.change, self.volume, outcome.cg.iterations
        );
        if self.converged {
            info!(
                "converged after {} iterations (change {:.4}, compliance {:.6e})",
                self.iteration, self.change, self.compliance
            );
        }

        Ok(self.state())
    }

    /// Current state without stepping
    pub fn state(&self) -> Snapshot {
        Snapshot {
            densities: self.densities.clone(),
            strain_energy: self.strain_energy.clone(),
            compliance: self.compliance,
            volume: self.volume,
            iteration: self.iteration,
            change: self.change,
            converged: self.converged,
        }
    }

    /// History point for the current state, if it is a valid post-step state
    pub fn last_history(&self) -> Option<HistoryPoint> {
        HistoryPoint::from_snapshot(&self.state())
    }

    /// Return to the initialized state, keeping config, forces, and fixed
    /// DOFs intact
    pub fn reset(&mut self) {
        self.densities
            .iter_mut()
            .for_each(|rho| *rho = self.config.volfrac);
        self.strain_energy.iter_mut().for_each(|e| *e = 0.0);
        self.sensitivities.iter_mut().for_each(|s| *s = 0.0);
        self.compliance = f64::INFINITY;
        self.volume = self.config.volfrac;
        self.iteration = 0;
        self.change = 1.0;
        self.converged = false;
        self.poisoned = false;
        if let Some(stress) = &mut self.stress {
            stress.clear();
        }
        info!("optimizer reset to the initialized state");
    }

    /// Per-element von Mises stresses (stress-constrained runs only)
    pub fn von_mises(&self) -> Option<&[f64]> {
        self.stress.as_ref().map(|s| s.von_mises())
    }

    /// Per-element rupture risk in [0, 1] (stress-constrained runs only)
    pub fn rupture_risk(&self) -> Option<&[f64]> {
        self.stress.as_ref().map(|s| s.rupture_risk())
    }

    /// Stress diagnostics of the last step (stress-constrained runs only)
    pub fn stress_summary(&self) -> Option<StressSummary> {
        self.stress.as_ref().and_then(|s| s.summary())
    }
}
