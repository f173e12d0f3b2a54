//! Error types for Oryx

use thiserror::Error;

/// Main error type for Oryx operations
#[derive(Error, Debug)]
pub enum OryxError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Non-finite value encountered in {0}")]
    Nonfinite(String),

    #[error("Solver failed to converge after {iterations} iterations (residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for Oryx operations
pub type Result<T> = std::result::Result<T, OryxError>;

/// Validation trait for configuration and problem inputs
pub trait Validate {
    fn validate(&self) -> Result<()>;
}
