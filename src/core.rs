//! Core configuration, state snapshots, and SIMP interpolation

use crate::error::{OryxError, Result, Validate};
use serde::{Deserialize, Serialize};

/// Smoothing scheme applied once per iteration before the density update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterScheme {
    /// Classical Sigmund sensitivity filter (density-weighted average of
    /// sensitivities). This is the default.
    Sensitivity,
    /// Plain weighted average of the updated density field
    Density,
}

impl Default for FilterScheme {
    fn default() -> Self {
        FilterScheme::Sensitivity
    }
}

/// Settings for the Optimality Criteria update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcSettings {
    /// Per-iteration move limit on each element density
    pub move_limit: f64,
    /// Lower density bound (the numerical void floor)
    pub rho_min: f64,
    /// Upper density bound
    pub rho_max: f64,
    /// Lower end of the Lagrange multiplier bracket
    pub lambda_min: f64,
    /// Upper end of the Lagrange multiplier bracket
    pub lambda_max: f64,
    /// Bisection tolerance on the multiplier bracket (absolute and relative)
    pub bisection_tol: f64,
    /// Hard cap on bisection iterations; the closest bracket is kept
    pub max_bisections: usize,
}

impl Default for OcSettings {
    fn default() -> Self {
        Self {
            move_limit: 0.2,
            rho_min: 1e-3,
            rho_max: 1.0,
            lambda_min: 0.0,
            lambda_max: 1e9,
            bisection_tol: 1e-3,
            max_bisections: 100,
        }
    }
}

impl Validate for OcSettings {
    fn validate(&self) -> Result<()> {
        if self.move_limit <= 0.0 {
            return Err(OryxError::InvalidConfig(
                "OC move limit must be positive".to_string(),
            ));
        }
        if self.rho_min <= 0.0 || self.rho_min >= self.rho_max || self.rho_max > 1.0 {
            return Err(OryxError::InvalidConfig(format!(
                "density bounds [{}, {}] must satisfy 0 < rho_min < rho_max <= 1",
                self.rho_min, self.rho_max
            )));
        }
        if self.lambda_min < 0.0 || self.lambda_max <= self.lambda_min {
            return Err(OryxError::InvalidConfig(
                "Lagrange multiplier bracket must satisfy 0 <= lambda_min < lambda_max".to_string(),
            ));
        }
        if self.bisection_tol <= 0.0 {
            return Err(OryxError::InvalidConfig(
                "bisection tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the conjugate-gradient equilibrium solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgSettings {
    /// Relative residual tolerance `||r|| < tolerance * ||b||`
    pub tolerance: f64,
    /// Absolute residual floor below which the solve always terminates
    pub min_residual: f64,
    /// Iteration cap; `None` selects `10 * ndof`
    pub max_iterations: Option<usize>,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            min_residual: 1e-12,
            max_iterations: None,
        }
    }
}

impl Validate for CgSettings {
    fn validate(&self) -> Result<()> {
        if self.tolerance <= 0.0 || self.min_residual < 0.0 {
            return Err(OryxError::InvalidConfig(
                "CG tolerances must be positive".to_string(),
            ));
        }
        if let Some(cap) = self.max_iterations {
            if cap == 0 {
                return Err(OryxError::InvalidConfig(
                    "CG iteration cap must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable per-run configuration of the optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Number of elements along x
    pub nelx: usize,
    /// Number of elements along y
    pub nely: usize,
    /// Target volume fraction, in (0, 1)
    pub volfrac: f64,
    /// SIMP penalization exponent
    pub penal: f64,
    /// Filter radius in element units
    pub rmin: f64,
    /// Modulus floor assigned to void material
    pub e_min: f64,
    /// Modulus of fully solid material
    pub e_solid: f64,
    /// Poisson's ratio of the base material
    pub poisson_ratio: f64,
    /// Maximum number of outer iterations
    pub max_iterations: u32,
    /// Convergence threshold on the max density change
    pub tolx: f64,
    /// Which smoothing filter runs each iteration
    pub filter: FilterScheme,
    pub oc: OcSettings,
    pub cg: CgSettings,
}

impl OptimizerConfig {
    /// Create a configuration with standard SIMP defaults
    /// (penal = 3, rmin = 1.5, nu = 0.3, 200 iterations, tolx = 0.01)
    pub fn new(nelx: usize, nely: usize, volfrac: f64) -> Self {
        Self {
            nelx,
            nely,
            volfrac,
            penal: 3.0,
            rmin: 1.5,
            e_min: 1e-9,
            e_solid: 1.0,
            poisson_ratio: 0.3,
            max_iterations: 200,
            tolx: 0.01,
            filter: FilterScheme::default(),
            oc: OcSettings::default(),
            cg: CgSettings::default(),
        }
    }

    pub fn with_penalization(mut self, penal: f64) -> Self {
        self.penal = penal;
        self
    }

    pub fn with_filter_radius(mut self, rmin: f64) -> Self {
        self.rmin = rmin;
        self
    }

    pub fn with_filter_scheme(mut self, filter: FilterScheme) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_poisson_ratio(mut self, poisson_ratio: f64) -> Self {
        self.poisson_ratio = poisson_ratio;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolx: f64) -> Self {
        self.tolx = tolx;
        self
    }

    /// Number of elements in the design field
    pub fn num_elements(&self) -> usize {
        self.nelx * self.nely
    }
}

impl Validate for OptimizerConfig {
    fn validate(&self) -> Result<()> {
        if self.nelx < 1 || self.nely < 1 {
            return Err(OryxError::InvalidConfig(format!(
                "mesh must have at least one element per direction, got {}x{}",
                self.nelx, self.nely
            )));
        }
        if !(self.volfrac > 0.0 && self.volfrac < 1.0) {
            return Err(OryxError::InvalidConfig(format!(
                "volume fraction {} must lie in (0, 1)",
                self.volfrac
            )));
        }
        if self.penal < 1.0 {
            return Err(OryxError::InvalidConfig(format!(
                "penalization exponent {} must be at least 1",
                self.penal
            )));
        }
        if self.rmin <= 0.0 {
            return Err(OryxError::InvalidConfig(format!(
                "filter radius {} must be positive",
                self.rmin
            )));
        }
        if self.e_min <= 0.0 || self.e_solid <= self.e_min {
            return Err(OryxError::InvalidConfig(
                "moduli must satisfy 0 < e_min < e_solid".to_string(),
            ));
        }
        if self.poisson_ratio <= -1.0 || self.poisson_ratio >= 0.5 {
            return Err(OryxError::InvalidConfig(format!(
                "Poisson's ratio {} must lie in (-1, 0.5)",
                self.poisson_ratio
            )));
        }
        if self.max_iterations < 1 {
            return Err(OryxError::InvalidConfig(
                "iteration limit must be at least 1".to_string(),
            ));
        }
        if self.tolx <= 0.0 {
            return Err(OryxError::InvalidConfig(
                "convergence tolerance must be positive".to_string(),
            ));
        }
        self.oc.validate()?;
        self.cg.validate()?;
        Ok(())
    }
}

/// SIMP material interpolation `E(rho) = e_min + rho^penal * (e_solid - e_min)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Penalization {
    pub penal: f64,
    pub e_min: f64,
    pub e_solid: f64,
}

impl Penalization {
    pub fn new(penal: f64, e_min: f64, e_solid: f64) -> Self {
        Self {
            penal,
            e_min,
            e_solid,
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.penal, config.e_min, config.e_solid)
    }

    /// Penalized Young's modulus at the given density
    pub fn modulus(&self, rho: f64) -> f64 {
        self.e_min + rho.powf(self.penal) * (self.e_solid - self.e_min)
    }

    /// Derivative of the penalized modulus with respect to density
    pub fn gradient(&self, rho: f64) -> f64 {
        self.penal * rho.powf(self.penal - 1.0) * (self.e_solid - self.e_min)
    }
}

/// State snapshot returned from every `step()` and `state()` call.
///
/// The density and strain-energy arrays are defensive copies owned by the
/// caller; the optimizer keeps reusing its internal buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub densities: Vec<f64>,
    pub strain_energy: Vec<f64>,
    pub compliance: f64,
    pub volume: f64,
    pub iteration: u32,
    pub change: f64,
    pub converged: bool,
}

impl Snapshot {
    /// Export the snapshot as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(OryxError::Serialization)
    }
}

/// Compact per-iteration record for convergence charts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub iteration: u32,
    pub compliance: f64,
    pub change: f64,
    pub volume: f64,
}

impl HistoryPoint {
    /// Build a history point from a snapshot, rejecting pre-step states and
    /// non-finite values
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        if snapshot.iteration == 0 {
            return None;
        }
        if !snapshot.compliance.is_finite()
            || !snapshot.change.is_finite()
            || !snapshot.volume.is_finite()
        {
            return None;
        }
        Some(Self {
            iteration: snapshot.iteration,
            compliance: snapshot.compliance,
            change: snapshot.change,
            volume: snapshot.volume,
        })
    }
}

/// Host-side collector of valid history points
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    points: Vec<HistoryPoint>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot if it yields a valid history point; returns
    /// whether a point was appended
    pub fn record(&mut self, snapshot: &Snapshot) -> bool {
        match HistoryPoint::from_snapshot(snapshot) {
            Some(point) => {
                self.points.push(point);
                true
            }
            None => false,
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_config_validates() {
        let config = OptimizerConfig::new(60, 20, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_bad_parameters() {
        assert!(OptimizerConfig::new(0, 20, 0.5).validate().is_err());
        assert!(OptimizerConfig::new(60, 20, 0.0).validate().is_err());
        assert!(OptimizerConfig::new(60, 20, 1.0).validate().is_err());
        assert!(OptimizerConfig::new(60, 20, 0.5)
            .with_penalization(0.5)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new(60, 20, 0.5)
            .with_filter_radius(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn penalization_endpoints() {
        let simp = Penalization::new(3.0, 1e-9, 1.0);
        assert_abs_diff_eq!(simp.modulus(1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(simp.modulus(0.0), 1e-9, epsilon = 1e-15);
        // gradient of rho^3 at rho = 0.5 is 3 * 0.25
        assert_abs_diff_eq!(simp.gradient(0.5), 0.75, epsilon = 1e-9);
    }

    #[test]
    fn history_rejects_invalid_points() {
        let mut snapshot = Snapshot {
            densities: vec![0.5; 4],
            strain_energy: vec![0.0; 4],
            compliance: f64::INFINITY,
            volume: 0.5,
            iteration: 0,
            change: 1.0,
            converged: false,
        };

        let mut history = History::new();
        assert!(!history.record(&snapshot));

        snapshot.iteration = 1;
        assert!(!history.record(&snapshot)); // compliance still infinite

        snapshot.compliance = 12.5;
        assert!(history.record(&snapshot));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().iteration, 1);
    }
}
