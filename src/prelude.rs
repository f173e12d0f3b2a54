//! Convenient re-exports of the common Oryx surface

pub use crate::core::{
    CgSettings, FilterScheme, History, HistoryPoint, OcSettings, OptimizerConfig, Penalization,
    Snapshot,
};
pub use crate::error::{OryxError, Result, Validate};
pub use crate::filter::Filter;
pub use crate::materials::SoftMaterial;
pub use crate::mesh::Mesh;
pub use crate::optimizer::Optimizer;
pub use crate::solver::CgSummary;
pub use crate::stress::{StressSettings, StressSummary};
