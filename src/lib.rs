//! # SchedOpt - Schedule Tree Optimizer
//!
//! Post-scheduling optimization of polyhedral schedule trees:
//! - Multi-level cache tiling and register tiling of permutable bands
//! - Prevectorization with full/partial tile isolation
//! - BLIS-style blocking of matrix-multiply kernels
//! - A profitability gate that keeps the input schedule when nothing changed
//!
//! ## Architecture
//!
//! ```text
//! Scop + ScheduleTree → classify bands → tile / prevectorize / matmul → compact → profitability
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use schedopt::prelude::*;
//!
//! let scop: Scop = serde_json::from_str(&std::fs::read_to_string("gemm.json")?)?;
//! let result = schedopt::optimize(&scop, &PipelineConfig::default(), Some(&TargetInfo::avx2()))?;
//! println!("{}", NamedTree::new(&result.schedule, &scop).pretty());
//! ```

#![warn(clippy::all)]

pub mod ir;
pub mod polyhedral;
pub mod analysis;
pub mod transform;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ir::scop::*;
    pub use crate::ir::tree::*;
    pub use crate::ir::flatten::{FlatSchedule, Instance};
    pub use crate::polyhedral::{
        AffineExpr, AffineMap, Constraint, IntegerSet, QuasiAffine,
    };
    pub use crate::analysis::{is_matr_mult_pattern, is_profitable_schedule, is_tileable_band_node};
    pub use crate::transform::{
        BandAction, BandDecision, OptimizationResult, PipelineConfig, TargetInfo, TilingLevel,
        Transform,
    };
    pub use crate::utils::errors::*;
    pub use crate::utils::pretty::{NamedTree, PrettyPrint};
}

use anyhow::{Context, Result};
use transform::{OptimizationResult, PipelineConfig, TargetInfo};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the full optimization pipeline on one scop.
pub fn optimize(
    scop: &ir::Scop,
    config: &PipelineConfig,
    target: Option<&TargetInfo>,
) -> Result<OptimizationResult> {
    transform::optimize_scop(scop, config, target)
        .with_context(|| format!("failed to optimize scop `{}`", scop.name))
}

/// Read a scop from its JSON form.
pub fn load_scop(json: &str) -> Result<ir::Scop> {
    let scop: ir::Scop = serde_json::from_str(json).context("malformed scop JSON")?;
    scop.validate().with_context(|| format!("invalid scop `{}`", scop.name))?;
    Ok(scop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_load_scop_rejects_garbage() {
        let err = load_scop("{ \"name\": 3 }").unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
