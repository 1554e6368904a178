//! Schedule tree transformations.

pub mod target;
pub mod tiling;
pub mod prevect;
pub mod matmul;
pub mod pipeline;

pub use target::TargetInfo;
pub use tiling::{apply_register_tiling, tile_node, Tiling, REGISTER_TILING};
pub use prevect::{is_isolation_sequence, isolate_full_partial_tiles, prevect_sched_band};
pub use matmul::{
    macro_kernel_params, micro_kernel_params, optimize_matmul_pattern, MacroKernelParams,
    MicroKernelParams, MACRO_KERNEL,
};
pub use pipeline::{
    optimize_scop, BandAction, BandDecision, OptimizationResult, PipelineConfig,
    ScheduleTreeOptimizer, TilingLevel,
};

use crate::ir::tree::ScheduleNode;
use crate::utils::errors::TransformResult;

/// A transformation of the band at a schedule node.
pub trait Transform {
    /// Apply the transformation. The returned handle points at the node
    /// further transformations of the same band should start from.
    fn apply(&self, node: ScheduleNode) -> TransformResult<ScheduleNode>;

    /// Get transformation name.
    fn name(&self) -> &str;
}
