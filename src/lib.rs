//! # Oryx Topology Optimization Engine
//!
//! Oryx is a SIMP (Solid Isotropic Material with Penalization) topology
//! optimizer for 2D continuum structures, written in Rust. It minimizes
//! compliance over a rectangular mesh of bilinear quadrilateral elements
//! subject to a volume constraint, with an optional stress-constrained
//! variant for soft materials.
//!
//! ## Features
//!
//! - Matrix-free finite-element analysis with a preconditioned
//!   conjugate-gradient solver
//! - Sensitivity and density smoothing filters with precomputed cone weights
//! - Optimality Criteria update with a bisected Lagrange multiplier
//! - Pure stepping API: one `step()` per outer iteration, host-controlled
//!   scheduling
//! - Von Mises stress, rupture risk, and safety margins for elastomers
//!
//! ## Example
//!
//! ```rust
//! use oryx::prelude::*;
//!
//! // Short cantilever: left edge clamped, downward load at the free corner
//! let mesh = Mesh::new(12, 6);
//! let mut forces = vec![0.0; mesh.num_dofs()];
//! forces[2 * mesh.node_index(12, 3) + 1] = -1.0;
//!
//! let mut fixed = Vec::new();
//! for j in 0..=6 {
//!     fixed.push(2 * mesh.node_index(0, j));
//!     fixed.push(2 * mesh.node_index(0, j) + 1);
//! }
//!
//! let config = OptimizerConfig::new(12, 6, 0.5);
//! let mut optimizer = Optimizer::new(config, forces, fixed)?;
//!
//! let snapshot = optimizer.step()?;
//! assert_eq!(snapshot.iteration, 1);
//! assert!(snapshot.compliance.is_finite());
//! # Ok::<(), oryx::OryxError>(())
//! ```

pub mod prelude;
pub mod core;
pub mod mesh;
pub mod element;
pub mod filter;
pub mod solver;
pub mod analysis;
pub mod oc;
pub mod optimizer;
pub mod materials;
pub mod stress;
pub mod error;

pub use error::{OryxError, Result};
pub use optimizer::Optimizer;

// Re-export common types for convenience
pub use nalgebra as na;
