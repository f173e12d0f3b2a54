//! Soft material library for stress-constrained optimization

use crate::error::{OryxError, Result, Validate};
use serde::{Deserialize, Serialize};

/// Elastomer property set used by the stress-constrained variant.
///
/// Moduli and strengths are in pascals, density in kg/m^3. Poisson's ratio
/// is capped below the incompressible limit so the plane-stress constitutive
/// matrix stays well conditioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftMaterial {
    pub name: String,
    pub young_modulus: f64,
    pub poisson_ratio: f64,
    pub ultimate_strength: f64,
    pub fatigue_limit: Option<f64>,
    pub density: f64,
}

impl SoftMaterial {
    pub fn new(name: &str, young_modulus: f64, poisson_ratio: f64, ultimate_strength: f64) -> Self {
        Self {
            name: name.to_string(),
            young_modulus,
            poisson_ratio,
            ultimate_strength,
            fatigue_limit: None,
            density: 1000.0,
        }
    }

    /// Smooth-On Ecoflex 00-30 platinum silicone
    pub fn ecoflex_0030() -> Self {
        Self::new("Ecoflex 00-30", 125e3, 0.45, 1.38e6)
            .with_fatigue_limit(0.45e6)
            .with_density(1070.0)
    }

    /// Smooth-On Ecoflex 00-50 platinum silicone
    pub fn ecoflex_0050() -> Self {
        Self::new("Ecoflex 00-50", 83e3, 0.45, 2.17e6).with_density(1070.0)
    }

    /// Smooth-On Dragon Skin 10 (medium)
    pub fn dragon_skin_10() -> Self {
        Self::new("Dragon Skin 10", 152e3, 0.45, 3.28e6).with_density(1070.0)
    }

    /// Smooth-On Dragon Skin 30
    pub fn dragon_skin_30() -> Self {
        Self::new("Dragon Skin 30", 593e3, 0.45, 3.45e6)
            .with_fatigue_limit(1.2e6)
            .with_density(1080.0)
    }

    /// Dow Sylgard 184 PDMS at the standard 10:1 mix
    pub fn sylgard_184() -> Self {
        Self::new("Sylgard 184", 2.0e6, 0.45, 6.7e6).with_density(1030.0)
    }

    pub fn with_fatigue_limit(mut self, fatigue_limit: f64) -> Self {
        self.fatigue_limit = Some(fatigue_limit);
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Stress ceiling used by the constraint: the fatigue limit when enabled
    /// and available, otherwise the ultimate strength
    pub fn stress_ceiling(&self, use_fatigue_limit: bool) -> f64 {
        if use_fatigue_limit {
            self.fatigue_limit.unwrap_or(self.ultimate_strength)
        } else {
            self.ultimate_strength
        }
    }
}

impl Validate for SoftMaterial {
    fn validate(&self) -> Result<()> {
        if self.young_modulus <= 0.0 {
            return Err(OryxError::InvalidConfig(format!(
                "material {}: Young's modulus must be positive",
                self.name
            )));
        }
        if self.poisson_ratio <= -1.0 || self.poisson_ratio >= 0.5 {
            return Err(OryxError::InvalidConfig(format!(
                "material {}: Poisson's ratio must lie in (-1, 0.5)",
                self.name
            )));
        }
        if self.ultimate_strength <= 0.0 {
            return Err(OryxError::InvalidConfig(format!(
                "material {}: ultimate strength must be positive",
                self.name
            )));
        }
        if let Some(fatigue) = self.fatigue_limit {
            if fatigue <= 0.0 || fatigue > self.ultimate_strength {
                return Err(OryxError::InvalidConfig(format!(
                    "material {}: fatigue limit must lie in (0, ultimate strength]",
                    self.name
                )));
            }
        }
        if self.density <= 0.0 {
            return Err(OryxError::InvalidConfig(format!(
                "material {}: density must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for material in [
            SoftMaterial::ecoflex_0030(),
            SoftMaterial::ecoflex_0050(),
            SoftMaterial::dragon_skin_10(),
            SoftMaterial::dragon_skin_30(),
            SoftMaterial::sylgard_184(),
        ] {
            assert!(material.validate().is_ok(), "{} failed", material.name);
        }
    }

    #[test]
    fn stress_ceiling_prefers_fatigue_when_enabled() {
        let material = SoftMaterial::ecoflex_0030();
        assert_eq!(material.stress_ceiling(false), 1.38e6);
        assert_eq!(material.stress_ceiling(true), 0.45e6);

        let no_fatigue = SoftMaterial::ecoflex_0050();
        assert_eq!(no_fatigue.stress_ceiling(true), no_fatigue.ultimate_strength);
    }

    #[test]
    fn invalid_materials_are_rejected() {
        let mut material = SoftMaterial::ecoflex_0030();
        material.poisson_ratio = 0.5;
        assert!(material.validate().is_err());

        let mut material = SoftMaterial::ecoflex_0030();
        material.fatigue_limit = Some(material.ultimate_strength * 2.0);
        assert!(material.validate().is_err());
    }
}
