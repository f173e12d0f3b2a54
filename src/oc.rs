//! Optimality Criteria density update

use crate::core::OcSettings;
use log::debug;

/// Volume error below which the bisection stops early
const VOLUME_EPS: f64 = 1e-6;

/// Move-limited multiplicative density update with a bisected Lagrange
/// multiplier enforcing the volume constraint.
///
/// The mean of the updated field is non-increasing in the multiplier, so a
/// plain bisection over `[lambda_min, lambda_max]` brackets the volume
/// target. The bracket search never fails: if the tolerance or the iteration
/// cap is reached, the field from the closest bracket is kept.
#[derive(Debug, Clone)]
pub struct OcUpdate {
    settings: OcSettings,
    volfrac: f64,
}

impl OcUpdate {
    pub fn new(settings: OcSettings, volfrac: f64) -> Self {
        Self { settings, volfrac }
    }

    pub fn settings(&self) -> &OcSettings {
        &self.settings
    }

    /// Compute the updated density field into `next` and return the maximum
    /// absolute density change.
    ///
    /// `sensitivities` are the filtered objective gradients and must be
    /// non-positive; positive entries are treated as zero.
    pub fn update(&self, densities: &[f64], sensitivities: &[f64], next: &mut [f64]) -> f64 {
        debug_assert_eq!(densities.len(), sensitivities.len());
        debug_assert_eq!(densities.len(), next.len());

        let mut lo = self.settings.lambda_min;
        let mut hi = self.settings.lambda_max;
        let mut bisections = 0;

        loop {
            let lambda = 0.5 * (lo + hi);
            let mean = self.trial(densities, sensitivities, lambda, next);

            if (mean - self.volfrac).abs() < VOLUME_EPS {
                break;
            }
            if mean > self.volfrac {
                lo = lambda;
            } else {
                hi = lambda;
            }

            bisections += 1;
            let width = hi - lo;
            if width < self.settings.bisection_tol {
                break;
            }
            if width / (hi + lo).max(f64::MIN_POSITIVE) < self.settings.bisection_tol {
                break;
            }
            if bisections >= self.settings.max_bisections {
                debug!(
                    "OC bisection hit the cap of {} iterations; keeping the closest bracket",
                    self.settings.max_bisections
                );
                break;
            }
        }

        densities
            .iter()
            .zip(next.iter())
            .map(|(old, new)| (new - old).abs())
            .fold(0.0, f64::max)
    }

    /// Evaluate the move-limited update for a fixed multiplier and return the
    /// resulting mean density
    fn trial(&self, densities: &[f64], sensitivities: &[f64], lambda: f64, next: &mut [f64]) -> f64 {
        let s = &self.settings;
        let mut sum = 0.0;
        for ((&rho, &sens), out) in densities.iter().zip(sensitivities.iter()).zip(next.iter_mut()) {
            let scaled = ((-sens).max(0.0) / lambda).sqrt();
            let mut value = rho * scaled;
            value = value.min(rho + s.move_limit).max(rho - s.move_limit);
            value = value.min(s.rho_max).max(s.rho_min);
            *out = value;
            sum += value;
        }
        sum / densities.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn synthetic_sensitivities(n: usize) -> Vec<f64> {
        // Deterministic, uneven, strictly negative field
        (0..n)
            .map(|i| -1.0 - 0.7 * ((i * 37 % 11) as f64))
            .collect()
    }

    #[test]
    fn update_enforces_the_volume_constraint() {
        let n = 200;
        let volfrac = 0.4;
        let oc = OcUpdate::new(OcSettings::default(), volfrac);
        let densities = vec![volfrac; n];
        let sensitivities = synthetic_sensitivities(n);
        let mut next = vec![0.0; n];

        oc.update(&densities, &sensitivities, &mut next);
        let mean = next.iter().sum::<f64>() / n as f64;
        assert_abs_diff_eq!(mean, volfrac, epsilon = 1e-3);
    }

    #[test]
    fn update_respects_bounds_and_move_limit() {
        let n = 64;
        let oc = OcUpdate::new(OcSettings::default(), 0.5);
        let densities: Vec<f64> = (0..n).map(|i| 0.1 + 0.8 * (i as f64) / n as f64).collect();
        let sensitivities = synthetic_sensitivities(n);
        let mut next = vec![0.0; n];

        let change = oc.update(&densities, &sensitivities, &mut next);
        let settings = oc.settings();
        for (&old, &new) in densities.iter().zip(next.iter()) {
            assert!(new >= settings.rho_min && new <= settings.rho_max);
            assert!((new - old).abs() <= settings.move_limit + 1e-12);
        }
        assert!(change <= settings.move_limit + 1e-12);
        assert!(change > 0.0);
    }

    #[test]
    fn zero_sensitivities_drive_densities_down() {
        let n = 16;
        let oc = OcUpdate::new(OcSettings::default(), 0.5);
        let densities = vec![0.5; n];
        let sensitivities = vec![0.0; n];
        let mut next = vec![0.0; n];

        oc.update(&densities, &sensitivities, &mut next);
        // With no strain energy anywhere, every element moves toward void
        for &value in &next {
            assert_abs_diff_eq!(value, 0.3, epsilon = 1e-12);
        }
    }
}
