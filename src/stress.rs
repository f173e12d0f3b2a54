//! Von Mises stress evaluation and the stress-constrained sensitivity path

use crate::core::{OcSettings, Penalization};
use crate::element::{Q4, StrainMatrix};
use crate::error::{OryxError, Result, Validate};
use crate::filter::Filter;
use crate::materials::SoftMaterial;
use crate::mesh::Mesh;
use log::info;
use nalgebra::{DVector, Matrix3, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Settings for the stress constraint of the soft-material variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressSettings {
    /// Multiplier applied to the working stress before comparing against the
    /// material ceiling
    pub safety_factor: f64,
    /// Exponent of the P-norm stress aggregate (typically 8 to 12)
    pub pnorm_exponent: f64,
    /// Coefficient scaling the stress-aggregate gradient added to the
    /// compliance sensitivities
    pub stress_weight: f64,
    /// Compare against the fatigue limit instead of the ultimate strength
    pub use_fatigue_limit: bool,
    /// Rupture-risk level above which an element counts as at risk
    pub risk_threshold: f64,
    /// Physical side length of one element; sets the strain scale and the
    /// wall-filter radius
    pub element_size: f64,
    /// Minimum printable wall thickness in physical units; enables the
    /// wall-thickness density filter when set
    pub min_wall_thickness: Option<f64>,
}

impl Default for StressSettings {
    fn default() -> Self {
        Self {
            safety_factor: 2.0,
            pnorm_exponent: 10.0,
            stress_weight: 0.1,
            use_fatigue_limit: false,
            risk_threshold: 0.8,
            element_size: 1.0,
            min_wall_thickness: None,
        }
    }
}

impl Validate for StressSettings {
    fn validate(&self) -> Result<()> {
        if self.safety_factor < 1.0 {
            return Err(OryxError::InvalidConfig(
                "safety factor must be at least 1".to_string(),
            ));
        }
        if self.pnorm_exponent < 1.0 {
            return Err(OryxError::InvalidConfig(
                "P-norm exponent must be at least 1".to_string(),
            ));
        }
        if self.stress_weight < 0.0 {
            return Err(OryxError::InvalidConfig(
                "stress weight must be non-negative".to_string(),
            ));
        }
        if !(self.risk_threshold > 0.0 && self.risk_threshold <= 1.0) {
            return Err(OryxError::InvalidConfig(
                "risk threshold must lie in (0, 1]".to_string(),
            ));
        }
        if self.element_size <= 0.0 {
            return Err(OryxError::InvalidConfig(
                "element size must be positive".to_string(),
            ));
        }
        if let Some(thickness) = self.min_wall_thickness {
            if thickness <= 0.0 {
                return Err(OryxError::InvalidConfig(
                    "wall thickness must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-iteration stress diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressSummary {
    pub max_von_mises: f64,
    pub min_safety_margin: f64,
    pub elements_at_risk: usize,
    pub passes_constraint: bool,
}

/// Center-point stress recovery and stress-constrained sensitivity
/// augmentation for soft materials.
///
/// Stresses are evaluated at the element center from the converged
/// displacements; the rupture risk and safety margin compare the von Mises
/// stress (scaled by the safety factor) against the material ceiling.
#[derive(Debug, Clone)]
pub struct StressModel {
    mesh: Mesh,
    settings: StressSettings,
    ceiling: f64,
    b: StrainMatrix,
    d_unit: Matrix3<f64>,
    von_mises: Vec<f64>,
    risk: Vec<f64>,
    wall_filter: Option<Filter>,
    summary: Option<StressSummary>,
}

impl StressModel {
    pub fn new(
        mesh: Mesh,
        element: &Q4,
        material: &SoftMaterial,
        settings: StressSettings,
    ) -> Result<Self> {
        material.validate()?;
        settings.validate()?;

        let ceiling = material.stress_ceiling(settings.use_fatigue_limit);
        let wall_filter = settings.min_wall_thickness.map(|thickness| {
            // Radius in element units; walls thinner than one element are
            // already unrepresentable, so the radius is floored at 1
            let radius = (thickness / element.size).max(1.0);
            info!(
                "Wall-thickness filter enabled: radius {:.2} elements",
                radius
            );
            Filter::new(mesh.nelx, mesh.nely, radius)
        });

        Ok(Self {
            mesh,
            settings,
            ceiling,
            b: element.strain_displacement_center(),
            d_unit: element.elasticity(),
            von_mises: vec![0.0; mesh.num_elements()],
            risk: vec![0.0; mesh.num_elements()],
            wall_filter,
            summary: None,
        })
    }

    pub fn settings(&self) -> &StressSettings {
        &self.settings
    }

    /// Raw per-element von Mises stresses from the last evaluation
    pub fn von_mises(&self) -> &[f64] {
        &self.von_mises
    }

    /// Rupture risk per element, clamped to [0, 1]
    pub fn rupture_risk(&self) -> &[f64] {
        &self.risk
    }

    pub fn summary(&self) -> Option<StressSummary> {
        self.summary
    }

    /// Forget the previous evaluation (used by `Optimizer::reset`)
    pub fn clear(&mut self) {
        self.von_mises.iter_mut().for_each(|v| *v = 0.0);
        self.risk.iter_mut().for_each(|v| *v = 0.0);
        self.summary = None;
    }

    /// Recover center-point stresses from the converged displacements and
    /// refresh the rupture-risk field and the summary
    pub fn evaluate(
        &mut self,
        displacements: &DVector<f64>,
        densities: &[f64],
        penalization: &Penalization,
    ) -> StressSummary {
        let sf = self.settings.safety_factor;
        let mut max_vm = 0.0_f64;
        let mut min_margin = f64::INFINITY;
        let mut at_risk = 0;

        for element in 0..self.mesh.num_elements() {
            let dofs = self.mesh.element_dofs_of(element);
            let mut local = SVector::<f64, 8>::zeros();
            for (a, &dof) in dofs.iter().enumerate() {
                local[a] = displacements[dof];
            }

            let strain: Vector3<f64> = self.b * local;
            let young = penalization.modulus(densities[element]);
            let stress = self.d_unit * strain * young;
            let vm = (stress[0] * stress[0] - stress[0] * stress[1]
                + stress[1] * stress[1]
                + 3.0 * stress[2] * stress[2])
                .max(0.0)
                .sqrt();

            self.von_mises[element] = vm;
            let risk = vm * sf / self.ceiling;
            self.risk[element] = risk.clamp(0.0, 1.0);

            max_vm = max_vm.max(vm);
            if risk > self.settings.risk_threshold {
                at_risk += 1;
            }
            // The margin only considers structural (mostly solid) elements
            if densities[element] > 0.5 && vm > 0.0 {
                min_margin = min_margin.min(self.ceiling / (vm * sf));
            }
        }

        let summary = StressSummary {
            max_von_mises: max_vm,
            min_safety_margin: min_margin,
            elements_at_risk: at_risk,
            passes_constraint: min_margin >= 1.0,
        };
        self.summary = Some(summary);
        summary
    }

    /// Add the P-norm stress-aggregate gradient to the compliance
    /// sensitivities.
    ///
    /// The gradient is the heuristic local derivative of
    /// `(sum sigma_vm^P)^(1/P)` through the penalized modulus; it is
    /// subtracted so the augmented sensitivities stay non-positive and the
    /// update draws material toward overstressed regions.
    pub fn augment_sensitivities(
        &self,
        densities: &[f64],
        penalization: &Penalization,
        sensitivities: &mut [f64],
    ) {
        if self.settings.stress_weight == 0.0 {
            return;
        }
        let p = self.settings.pnorm_exponent;
        let pnorm = self
            .von_mises
            .iter()
            .map(|vm| vm.powf(p))
            .sum::<f64>()
            .powf(1.0 / p);
        if !(pnorm > 0.0) || !pnorm.is_finite() {
            return;
        }

        for element in 0..self.von_mises.len() {
            let vm = self.von_mises[element];
            if vm <= 0.0 {
                continue;
            }
            let rho = densities[element];
            let dvm = vm * penalization.gradient(rho) / penalization.modulus(rho);
            let gradient = (vm / pnorm).powf(p - 1.0) * dvm;
            sensitivities[element] -= self.settings.stress_weight * gradient;
        }
    }

    /// Smooth the updated densities with the wall-thickness filter, keeping
    /// the field inside the density bounds
    pub fn enforce_wall_thickness(
        &self,
        densities: &mut [f64],
        scratch: &mut [f64],
        bounds: &OcSettings,
    ) {
        let Some(filter) = &self.wall_filter else {
            return;
        };
        filter.smooth_densities(densities, scratch);
        for (rho, &smoothed) in densities.iter_mut().zip(scratch.iter()) {
            *rho = smoothed.clamp(bounds.rho_min, bounds.rho_max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn uniaxial_setup() -> (StressModel, DVector<f64>) {
        let mesh = Mesh::new(1, 1);
        let element = Q4::new(0.45, 1.0);
        let model = StressModel::new(
            mesh,
            &element,
            &SoftMaterial::ecoflex_0030(),
            StressSettings::default(),
        )
        .unwrap();

        // Unit x-stretch of the single element: u_x = x
        let mut u = DVector::zeros(mesh.num_dofs());
        for j in 0..=mesh.nely {
            let node = mesh.node_index(1, j);
            u[2 * node] = 1.0;
        }
        (model, u)
    }

    #[test]
    fn uniaxial_strain_gives_the_plane_stress_von_mises() {
        let (mut model, u) = uniaxial_setup();
        let penalization = Penalization::new(3.0, 1e-9, 125e3);
        let densities = vec![1.0];

        let summary = model.evaluate(&u, &densities, &penalization);

        // sigma = E/(1-nu^2) * [1, nu, 0] for eps_x = 1
        let factor: f64 = 125e3 / (1.0 - 0.45 * 0.45);
        let (sx, sy) = (factor, factor * 0.45);
        let expected = (sx * sx - sx * sy + sy * sy).sqrt();
        assert_relative_eq!(summary.max_von_mises, expected, max_relative = 1e-9);
        assert_relative_eq!(model.von_mises()[0], expected, max_relative = 1e-9);
    }

    #[test]
    fn risk_and_margin_are_consistent() {
        let (mut model, u) = uniaxial_setup();
        let penalization = Penalization::new(3.0, 1e-9, 125e3);
        let densities = vec![1.0];

        let summary = model.evaluate(&u, &densities, &penalization);
        let vm = model.von_mises()[0];
        let ceiling = SoftMaterial::ecoflex_0030().ultimate_strength;

        assert_abs_diff_eq!(
            model.rupture_risk()[0],
            (vm * 2.0 / ceiling).clamp(0.0, 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            summary.min_safety_margin,
            ceiling / (vm * 2.0),
            max_relative = 1e-12
        );
        assert_eq!(summary.passes_constraint, summary.min_safety_margin >= 1.0);
    }

    #[test]
    fn augmentation_keeps_sensitivities_non_positive() {
        let (mut model, u) = uniaxial_setup();
        let penalization = Penalization::new(3.0, 1e-9, 125e3);
        let densities = vec![0.8];
        model.evaluate(&u, &densities, &penalization);

        let mut sensitivities = vec![-0.5];
        model.augment_sensitivities(&densities, &penalization, &mut sensitivities);
        assert!(sensitivities[0] < -0.5);
        assert!(sensitivities[0].is_finite());
    }

    #[test]
    fn zero_displacements_produce_a_clean_summary() {
        let (mut model, _) = uniaxial_setup();
        let penalization = Penalization::new(3.0, 1e-9, 125e3);
        let densities = vec![1.0];
        let u = DVector::zeros(8);

        let summary = model.evaluate(&u, &densities, &penalization);
        assert_eq!(summary.max_von_mises, 0.0);
        assert_eq!(summary.elements_at_risk, 0);
        // No stressed structural elements: the margin is unbounded
        assert!(summary.min_safety_margin.is_infinite());
        assert!(summary.passes_constraint);
    }

    #[test]
    fn wall_filter_smooths_an_isolated_spike() {
        let mesh = Mesh::new(5, 5);
        let element = Q4::new(0.45, 1.0);
        let settings = StressSettings {
            min_wall_thickness: Some(2.0),
            ..StressSettings::default()
        };
        let model =
            StressModel::new(mesh, &element, &SoftMaterial::ecoflex_0030(), settings).unwrap();

        let mut densities = vec![0.001; mesh.num_elements()];
        densities[12] = 1.0; // single-element spike in the center
        let mut scratch = vec![0.0; mesh.num_elements()];
        model.enforce_wall_thickness(&mut densities, &mut scratch, &OcSettings::default());

        assert!(densities[12] < 1.0);
        assert!(densities[12] > densities[0]);
    }
}
