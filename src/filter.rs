//! Cone-weight smoothing filters over the element grid

use crate::error::{OryxError, Result};
use log::info;

/// Density floor used when normalizing the sensitivity filter
const DENSITY_FLOOR: f64 = 1e-3;

/// Precomputed neighbor lists and cone weights for mesh-regularization
/// filters.
///
/// For each element the filter stores the indices of all elements whose
/// center lies strictly within `rmin` (in element units), with weight
/// `rmin - dist`. Weights are left unnormalized; each application divides by
/// the weight sum. Every element is its own neighbor, so the sums are
/// strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    nelx: usize,
    nely: usize,
    rmin: f64,
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
    weights: Vec<f64>,
    weight_sums: Vec<f64>,
}

impl Filter {
    /// Scan the `+-ceil(rmin)` window around every element and record the
    /// neighbors inside the filter radius
    pub fn new(nelx: usize, nely: usize, rmin: f64) -> Self {
        debug_assert!(rmin > 0.0);
        let reach = rmin.ceil() as usize;
        let count = nelx * nely;

        let mut offsets = Vec::with_capacity(count + 1);
        let mut neighbors = Vec::new();
        let mut weights = Vec::new();

        for elx in 0..nelx {
            for ely in 0..nely {
                offsets.push(neighbors.len());
                let x_lo = elx.saturating_sub(reach);
                let x_hi = (elx + reach).min(nelx - 1);
                let y_lo = ely.saturating_sub(reach);
                let y_hi = (ely + reach).min(nely - 1);

                for jx in x_lo..=x_hi {
                    for jy in y_lo..=y_hi {
                        let dx = jx as f64 - elx as f64;
                        let dy = jy as f64 - ely as f64;
                        let dist = (dx * dx + dy * dy).sqrt();
                        if dist < rmin {
                            neighbors.push(jx * nely + jy);
                            weights.push(rmin - dist);
                        }
                    }
                }
            }
        }
        offsets.push(neighbors.len());

        let weight_sums = (0..count)
            .map(|e| weights[offsets[e]..offsets[e + 1]].iter().sum())
            .collect();

        info!(
            "Prepared filter for {}x{} mesh, rmin {}: {} neighbor pairs",
            nelx,
            nely,
            rmin,
            neighbors.len()
        );

        Self {
            nelx,
            nely,
            rmin,
            offsets,
            neighbors,
            weights,
            weight_sums,
        }
    }

    /// Number of elements covered by the filter
    pub fn len(&self) -> usize {
        self.nelx * self.nely
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rmin(&self) -> f64 {
        self.rmin
    }

    /// Neighbor indices and weights of the given element
    pub fn neighbors(&self, element: usize) -> (&[usize], &[f64]) {
        let lo = self.offsets[element];
        let hi = self.offsets[element + 1];
        (&self.neighbors[lo..hi], &self.weights[lo..hi])
    }

    pub fn neighbor_count(&self, element: usize) -> usize {
        self.offsets[element + 1] - self.offsets[element]
    }

    /// Check that every element has a strictly positive weight sum
    pub fn verify_weights(&self) -> Result<()> {
        for (e, &sum) in self.weight_sums.iter().enumerate() {
            if !(sum > 0.0) {
                return Err(OryxError::InvalidConfig(format!(
                    "element {} has non-positive filter weight sum {}",
                    e, sum
                )));
            }
        }
        Ok(())
    }

    /// Classical sensitivity filter: density-weighted average of the
    /// sensitivities, normalized by the element's own density (floored to
    /// keep the quotient finite in near-void regions)
    pub fn smooth_sensitivities(&self, densities: &[f64], sensitivities: &[f64], out: &mut [f64]) {
        debug_assert_eq!(densities.len(), self.len());
        debug_assert_eq!(sensitivities.len(), self.len());
        debug_assert_eq!(out.len(), self.len());

        for e in 0..self.len() {
            let (indices, weights) = self.neighbors(e);
            let mut numerator = 0.0;
            for (k, &j) in indices.iter().enumerate() {
                numerator += weights[k] * densities[j] * sensitivities[j];
            }
            out[e] = numerator / (densities[e].max(DENSITY_FLOOR) * self.weight_sums[e]);
        }
    }

    /// Density filter: plain weighted average of the density field
    pub fn smooth_densities(&self, densities: &[f64], out: &mut [f64]) {
        debug_assert_eq!(densities.len(), self.len());
        debug_assert_eq!(out.len(), self.len());

        for e in 0..self.len() {
            let (indices, weights) = self.neighbors(e);
            let mut numerator = 0.0;
            for (k, &j) in indices.iter().enumerate() {
                numerator += weights[k] * densities[j];
            }
            out[e] = numerator / self.weight_sums[e];
        }
    }

    /// Chain rule of the density filter: map gradients taken with respect to
    /// the smoothed field back onto the design field.
    ///
    /// This is the transpose of the normalized weight operator,
    /// `out_j = sum_e w_ej * s_e / W_e`. The row sums of the forward filter
    /// are one, so the total of the mapped gradients equals the total of the
    /// input exactly, and non-positive input stays non-positive.
    pub fn backproject_sensitivities(&self, sensitivities: &[f64], out: &mut [f64]) {
        debug_assert_eq!(sensitivities.len(), self.len());
        debug_assert_eq!(out.len(), self.len());

        // Neighbor lists are symmetric, so the transpose product can walk
        // each element's own neighborhood
        for j in 0..self.len() {
            let (indices, weights) = self.neighbors(j);
            let mut value = 0.0;
            for (k, &e) in indices.iter().enumerate() {
                value += weights[k] * sensitivities[e] / self.weight_sums[e];
            }
            out[j] = value;
        }
    }
}
