//! BLIS-style optimization of matrix-multiply bands.
//!
//! The band is reordered to `[k, i, j]`, blocked for the caches (macro
//! kernel, `Kc x Mc x Nc`) and then blocked for registers (micro kernel,
//! `1 x Mr x Nr`, fully unrolled). Block sizes follow the analytical model
//! of Low et al., "Analytical Modeling Is Enough for High-Performance BLIS".

use crate::analysis::classify::{matr_mult_shape, MatMulShape};
use crate::ir::scop::Scop;
use crate::ir::tree::ScheduleNode;
use crate::transform::target::TargetInfo;
use crate::transform::tiling::{apply_register_tiling, tile_node};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};
use log::debug;
use num_integer::Integer;
use num_rational::Rational64;
use serde::{Serialize, Deserialize};

/// Identifier of the cache blocking stage.
pub const MACRO_KERNEL: &str = "Macro kernel";

/// Bytes per matrix element (double precision).
const ELEMENT_SIZE: i64 = 8;

/// Register block of the micro kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroKernelParams {
    pub mr: i64,
    pub nr: i64,
}

/// Cache blocks of the macro kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroKernelParams {
    pub kc: i64,
    pub mc: i64,
    pub nc: i64,
}

/// Register block that keeps every FMA unit busy:
/// `Nr = ceil(sqrt(Nvec * L * T) / Nvec) * Nvec`, `Mr = ceil(Nvec * L * T / Nr)`.
pub fn micro_kernel_params(target: &TargetInfo) -> MicroKernelParams {
    let nvec = (target.vector_register_bits / 64).max(2);
    let in_flight = (nvec * target.fma_latency * target.fma_throughput).max(1);
    let nr = ((in_flight as f64).sqrt() / nvec as f64).ceil() as i64 * nvec;
    let nr = nr.max(1);
    let mr = Integer::div_ceil(&in_flight, &nr);
    MicroKernelParams { mr, nr }
}

/// Cache blocks: a `Kc x Nr` panel of B stays in L1 next to the streamed
/// `Mr x Kc` panel of A, and the `Mc x Kc` block of A stays in L2.
pub fn macro_kernel_params(target: &TargetInfo, micro: &MicroKernelParams) -> MacroKernelParams {
    let fallback = MacroKernelParams { kc: 1, mc: micro.mr, nc: micro.nr };
    let (a1, s1) = (target.l1_associativity, target.l1_size);
    let (a2, s2) = (target.l2_associativity, target.l2_size);
    if a1 < 2 || a2 < 3 || s1 < 1 || s2 < 1 {
        return fallback;
    }

    let car = (Rational64::from_integer(a1 - 1)
        / (Rational64::from_integer(1) + Rational64::new(micro.nr, micro.mr)))
        .floor()
        .to_integer();
    let kc = Rational64::new(car * s1, micro.mr * a1 * ELEMENT_SIZE).floor().to_integer();
    if kc < 1 {
        return fallback;
    }

    let cac = Rational64::new(kc * ELEMENT_SIZE * a2, s2);
    let mc = (Rational64::from_integer(a2 - 2) / cac).floor().to_integer();
    let mc = (mc - mc % micro.mr).max(micro.mr);
    let nc = 256 * micro.nr;
    MacroKernelParams { kc, mc, nc }
}

/// Reorder, cache-block and register-block a matrix-multiply band. Returns
/// the handle at the unrolled register point band.
pub fn optimize_matmul_pattern(
    node: ScheduleNode,
    scop: &Scop,
    target: Option<&TargetInfo>,
) -> TransformResult<ScheduleNode> {
    let shape: MatMulShape = matr_mult_shape(&node, scop).ok_or_else(|| {
        TransformError::new(
            format!("band {} is not a matrix multiplication", node.id()),
            TransformErrorKind::PatternMismatch,
            "optimize_matmul_pattern",
        )
    })?;
    if !node.band().map_or(false, |b| b.is_permutable()) {
        return Err(TransformError::new(
            format!("band {} is not permutable", node.id()),
            TransformErrorKind::NotPermutable,
            "optimize_matmul_pattern",
        ));
    }

    let generic = TargetInfo::generic();
    let target = target.unwrap_or(&generic);
    let micro = micro_kernel_params(target);
    let macro_ = macro_kernel_params(target, &micro);
    debug!(
        "matmul band {} on {}: micro {}x{}, macro {}x{}x{}",
        node.id(), target.name, micro.mr, micro.nr, macro_.kc, macro_.mc, macro_.nc
    );

    let mut node = node;
    let id = node.id();
    node.tree_mut().band_permute(id, &shape.permutation())?;
    let node = tile_node(node, MACRO_KERNEL, &[macro_.kc, macro_.mc, macro_.nc], 1)?;
    apply_register_tiling(node, &[1, micro.mr, micro.nr], 1)
}
