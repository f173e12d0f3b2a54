//! Bilinear quadrilateral element: stiffness, elasticity, and strain matrices

use nalgebra::{Matrix3, SMatrix};
use serde::{Deserialize, Serialize};

/// 8x8 element stiffness matrix type
pub type ElementMatrix = SMatrix<f64, 8, 8>;

/// 3x8 strain-displacement matrix type
pub type StrainMatrix = SMatrix<f64, 3, 8>;

/// Natural coordinates of the four corners, counterclockwise from the lower
/// left, matching the mesh connectivity order
const XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

/// Four-node plane-stress quadrilateral on a square of the given side length.
///
/// The stiffness matrix is computed for a unit Young's modulus; the SIMP
/// modulus scales it per element during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Q4 {
    pub poisson_ratio: f64,
    /// Physical side length of the (square) element
    pub size: f64,
}

impl Q4 {
    pub fn new(poisson_ratio: f64, size: f64) -> Self {
        Self {
            poisson_ratio,
            size,
        }
    }

    /// Plane-stress constitutive matrix for a unit Young's modulus
    pub fn elasticity(&self) -> Matrix3<f64> {
        let nu = self.poisson_ratio;
        let factor = 1.0 / (1.0 - nu * nu);
        let mut d = Matrix3::zeros();
        d[(0, 0)] = factor;
        d[(1, 1)] = factor;
        d[(0, 1)] = factor * nu;
        d[(1, 0)] = factor * nu;
        d[(2, 2)] = factor * (1.0 - nu) / 2.0;
        d
    }

    /// Strain-displacement matrix at natural coordinates `(xi, eta)`
    pub fn strain_displacement(&self, xi: f64, eta: f64) -> StrainMatrix {
        let mut b = StrainMatrix::zeros();
        for i in 0..4 {
            let dn_dxi = 0.25 * XI[i] * (1.0 + eta * ETA[i]);
            let dn_deta = 0.25 * ETA[i] * (1.0 + xi * XI[i]);
            // The Jacobian of a square element is diagonal with entries size/2
            let dn_dx = dn_dxi * 2.0 / self.size;
            let dn_dy = dn_deta * 2.0 / self.size;
            b[(0, 2 * i)] = dn_dx;
            b[(1, 2 * i + 1)] = dn_dy;
            b[(2, 2 * i)] = dn_dy;
            b[(2, 2 * i + 1)] = dn_dx;
        }
        b
    }

    /// Strain-displacement matrix at the element center, used for
    /// center-point stress recovery
    pub fn strain_displacement_center(&self) -> StrainMatrix {
        self.strain_displacement(0.0, 0.0)
    }

    /// Unit-modulus stiffness matrix, integrated with 2x2 Gauss quadrature.
    ///
    /// For a square plane-stress element the result is independent of the
    /// element size; it is computed once per run and cached by the caller.
    pub fn stiffness(&self) -> ElementMatrix {
        let d = self.elasticity();
        let det_j = self.size * self.size / 4.0;
        let g = 1.0 / 3.0_f64.sqrt();

        let mut ke = ElementMatrix::zeros();
        for &xi in &[-g, g] {
            for &eta in &[-g, g] {
                let b = self.strain_displacement(xi, eta);
                ke += b.transpose() * d * b * det_j;
            }
        }
        ke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::SVector;

    #[test]
    fn stiffness_is_symmetric() {
        let ke = Q4::new(0.3, 1.0).stiffness();
        for i in 0..8 {
            for j in 0..8 {
                assert_abs_diff_eq!(ke[(i, j)], ke[(j, i)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn stiffness_matches_closed_form_leading_entry() {
        // Analytic value for nu = 0.3: (12 - 4*nu) / (24 * (1 - nu^2))
        let ke = Q4::new(0.3, 1.0).stiffness();
        assert_abs_diff_eq!(ke[(0, 0)], 10.8 / (24.0 * 0.91), epsilon = 1e-12);
    }

    #[test]
    fn stiffness_is_size_independent() {
        let coarse = Q4::new(0.3, 1.0).stiffness();
        let fine = Q4::new(0.3, 1e-3).stiffness();
        for i in 0..8 {
            for j in 0..8 {
                assert_abs_diff_eq!(coarse[(i, j)], fine[(i, j)], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rigid_body_translations_produce_no_force() {
        let ke = Q4::new(0.3, 1.0).stiffness();
        let shift_x =
            SVector::<f64, 8>::from_column_slice(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let shift_y =
            SVector::<f64, 8>::from_column_slice(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert!((ke * shift_x).norm() < 1e-12);
        assert!((ke * shift_y).norm() < 1e-12);
    }

    #[test]
    fn center_strain_of_uniform_extension() {
        // Corner displacements of a unit x-stretch: u_x = x
        let q4 = Q4::new(0.3, 1.0);
        let b = q4.strain_displacement_center();
        let u = SVector::<f64, 8>::from_column_slice(&[
            0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0,
        ]);
        let strain = b * u;
        assert_abs_diff_eq!(strain[0], 1.0, epsilon = 1e-12); // eps_x
        assert_abs_diff_eq!(strain[1], 0.0, epsilon = 1e-12); // eps_y
        assert_abs_diff_eq!(strain[2], 0.0, epsilon = 1e-12); // gamma_xy
    }
}
