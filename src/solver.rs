//! Preconditioned conjugate-gradient solver for the equilibrium equations

use crate::core::CgSettings;
use crate::error::{OryxError, Result};
use log::warn;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Symmetric positive-definite operator solved by the CG iteration.
///
/// Implementations apply the operator matrix-free and expose the Jacobi
/// preconditioner diagonal plus the set of DOFs held at zero. Fixed DOFs
/// carry an implicit unit diagonal (zero row/column elsewhere), so the
/// operator stays symmetric positive definite.
pub trait LinearOperator {
    fn dimension(&self) -> usize;

    /// `y = A * x`
    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>);

    /// Write the operator diagonal into `out` (unit entries at fixed DOFs)
    fn diagonal(&self, out: &mut DVector<f64>);

    /// Mask of DOFs with prescribed zero displacement
    fn fixed(&self) -> &[bool];
}

/// Outcome of a CG solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgSummary {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

impl CgSummary {
    /// Treat non-convergence as an error; `solve` itself only warns
    pub fn ensure_converged(&self) -> Result<()> {
        if self.converged {
            Ok(())
        } else {
            Err(OryxError::NotConverged {
                iterations: self.iterations,
                residual: self.residual,
            })
        }
    }
}

/// Jacobi-preconditioned conjugate-gradient solver with reusable work
/// vectors.
///
/// The right-hand side is zeroed at fixed DOFs before the iteration starts,
/// and the residual is re-pinned there after every update, which keeps the
/// whole Krylov sequence in the free-DOF subspace.
#[derive(Debug, Clone)]
pub struct PcgSolver {
    settings: CgSettings,
    diag: DVector<f64>,
    r: DVector<f64>,
    z: DVector<f64>,
    p: DVector<f64>,
    q: DVector<f64>,
}

impl PcgSolver {
    pub fn new(dimension: usize, settings: CgSettings) -> Self {
        Self {
            settings,
            diag: DVector::zeros(dimension),
            r: DVector::zeros(dimension),
            z: DVector::zeros(dimension),
            p: DVector::zeros(dimension),
            q: DVector::zeros(dimension),
        }
    }

    pub fn settings(&self) -> &CgSettings {
        &self.settings
    }

    /// Solve `A x = b` from a zero initial guess, writing the solution into
    /// `x`.
    ///
    /// Reaching the iteration cap is not an error: the best iterate is kept
    /// and the summary reports `converged = false`. Non-finite arithmetic is
    /// fatal.
    pub fn solve(
        &mut self,
        operator: &impl LinearOperator,
        b: &DVector<f64>,
        x: &mut DVector<f64>,
    ) -> Result<CgSummary> {
        let n = operator.dimension();
        debug_assert_eq!(b.len(), n);
        debug_assert_eq!(x.len(), n);
        let fixed = operator.fixed();

        operator.diagonal(&mut self.diag);

        // Prescribed-zero DOFs get a zero right-hand side
        self.r.copy_from(b);
        for (i, &is_fixed) in fixed.iter().enumerate() {
            if is_fixed {
                self.r[i] = 0.0;
            }
        }

        x.fill(0.0);
        let b_norm = self.r.norm();
        if b_norm == 0.0 {
            return Ok(CgSummary {
                iterations: 0,
                residual: 0.0,
                converged: true,
            });
        }
        let target = (self.settings.tolerance * b_norm).max(self.settings.min_residual);
        let max_iterations = self.settings.max_iterations.unwrap_or(10 * n);

        for i in 0..n {
            self.z[i] = self.r[i] / self.diag[i];
        }
        self.p.copy_from(&self.z);
        let mut rho = self.r.dot(&self.z);

        let mut iterations = 0;
        let mut residual = b_norm;
        let mut converged = false;

        while iterations < max_iterations {
            iterations += 1;

            operator.apply(&self.p, &mut self.q);
            let pq = self.p.dot(&self.q);
            if !pq.is_finite() {
                return Err(OryxError::Nonfinite(format!(
                    "conjugate-gradient curvature at iteration {}",
                    iterations
                )));
            }
            if pq <= 0.0 {
                warn!(
                    "CG breakdown at iteration {}: non-positive curvature {:.3e}",
                    iterations, pq
                );
                break;
            }

            let alpha = rho / pq;
            x.axpy(alpha, &self.p, 1.0);
            self.r.axpy(-alpha, &self.q, 1.0);
            for (i, &is_fixed) in fixed.iter().enumerate() {
                if is_fixed {
                    self.r[i] = 0.0;
                }
            }

            residual = self.r.norm();
            if !residual.is_finite() {
                return Err(OryxError::Nonfinite(format!(
                    "conjugate-gradient residual at iteration {}",
                    iterations
                )));
            }
            if residual < target {
                converged = true;
                break;
            }

            for i in 0..n {
                self.z[i] = self.r[i] / self.diag[i];
            }
            let rho_next = self.r.dot(&self.z);
            let beta = rho_next / rho;
            self.p.axpy(1.0, &self.z, beta);
            rho = rho_next;
        }

        if !converged {
            warn!(
                "CG stopped after {} iterations with residual {:.3e} (target {:.3e})",
                iterations, residual, target
            );
        }

        Ok(CgSummary {
            iterations,
            residual,
            converged,
        })
    }
}
