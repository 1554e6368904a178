//! The schedule tree optimization driver.
//!
//! The driver walks the tree once, bottom-up. Every innermost permutable
//! band is either optimized as a matrix multiplication or gets the standard
//! treatment: cache tiling (up to two levels), optional register tiling and
//! prevectorization of its innermost coincident member.

use crate::analysis::classify::{is_tileable_band_node, matr_mult_shape, MatMulShape};
use crate::analysis::profitability::is_profitable_schedule;
use crate::ir::scop::{Scop, StmtId};
use crate::ir::tree::{NodeId, ScheduleNode, ScheduleTree};
use crate::transform::matmul::{
    macro_kernel_params, micro_kernel_params, optimize_matmul_pattern, MacroKernelParams,
    MicroKernelParams,
};
use crate::transform::prevect::prevect_sched_band;
use crate::transform::target::TargetInfo;
use crate::transform::tiling::Tiling;
use crate::transform::Transform;
use crate::utils::errors::{SchedResult, TransformResult};
use log::{debug, info};
use serde::{Serialize, Deserialize};
use std::path::Path;

/// One level of tiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingLevel {
    pub enabled: bool,
    /// Per-member sizes, outermost first
    pub tile_sizes: Vec<i64>,
    /// Size for members without an entry in `tile_sizes`
    pub default_tile_size: i64,
}

impl TilingLevel {
    pub fn new(enabled: bool, default_tile_size: i64) -> Self {
        Self { enabled, tile_sizes: Vec::new(), default_tile_size }
    }
}

impl Default for TilingLevel {
    fn default() -> Self {
        Self::new(true, 32)
    }
}

/// Optimization pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Global switch; when off the schedule is left untouched
    pub enable_tiling: bool,
    pub first_level: TilingLevel,
    pub second_level: TilingLevel,
    pub register_tiling: TilingLevel,
    pub enable_vectorization: bool,
    /// Vector width when no target is given
    pub prevector_width: i64,
    pub enable_pattern_matching: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_tiling: true,
            first_level: TilingLevel::new(true, 32),
            second_level: TilingLevel::new(false, 16),
            register_tiling: TilingLevel::new(false, 2),
            enable_vectorization: true,
            prevector_width: 4,
            enable_pattern_matching: true,
        }
    }
}

impl PipelineConfig {
    /// Create configuration that leaves every schedule untouched.
    pub fn no_tiling() -> Self {
        Self { enable_tiling: false, ..Default::default() }
    }

    /// Create configuration with two cache levels and register tiling.
    pub fn for_locality() -> Self {
        let mut config = Self::default();
        config.second_level.enabled = true;
        config.register_tiling.enabled = true;
        config
    }

    pub fn from_json_str(json: &str) -> SchedResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> SchedResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Enabled tiling stages, outermost first.
    fn tiling_stages(&self) -> Vec<Tiling> {
        let mut stages = Vec::new();
        if self.first_level.enabled {
            stages.push(Tiling::new(
                "1st level tiling",
                self.first_level.tile_sizes.clone(),
                self.first_level.default_tile_size,
            ));
        }
        if self.second_level.enabled {
            stages.push(Tiling::new(
                "2nd level tiling",
                self.second_level.tile_sizes.clone(),
                self.second_level.default_tile_size,
            ));
        }
        if self.register_tiling.enabled {
            stages.push(Tiling::register(
                self.register_tiling.tile_sizes.clone(),
                self.register_tiling.default_tile_size,
            ));
        }
        stages
    }
}

/// What the driver did with one band of the input tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandAction {
    /// Not permutable, or not innermost
    NotTileable,
    /// Tileable but with a single member and no matrix-multiply shape
    SingleMember,
    MatMul {
        shape: MatMulShape,
        micro: MicroKernelParams,
        macro_kernel: MacroKernelParams,
    },
    Standard {
        /// Identifiers of the tiling stages applied
        tiling: Vec<String>,
        /// Member of the innermost band that was prevectorized
        vectorized_member: Option<usize>,
        vector_width: Option<i64>,
    },
}

/// Decision for one band, identified by its id in the input tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandDecision {
    pub node: NodeId,
    pub members: usize,
    pub statements: Vec<StmtId>,
    pub action: BandAction,
}

/// Result of optimizing one scop.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// The optimized schedule, or the original one if it was not profitable
    pub schedule: ScheduleTree,
    pub decisions: Vec<BandDecision>,
    /// Whether the optimized schedule was kept
    pub profitable: bool,
}

/// Bottom-up band optimizer for one scop.
pub struct ScheduleTreeOptimizer<'a> {
    scop: &'a Scop,
    config: &'a PipelineConfig,
    target: Option<&'a TargetInfo>,
    decisions: Vec<BandDecision>,
}

impl<'a> ScheduleTreeOptimizer<'a> {
    pub fn new(scop: &'a Scop, config: &'a PipelineConfig, target: Option<&'a TargetInfo>) -> Self {
        Self { scop, config, target, decisions: Vec::new() }
    }

    pub fn decisions(&self) -> &[BandDecision] {
        &self.decisions
    }

    pub fn into_decisions(self) -> Vec<BandDecision> {
        self.decisions
    }

    fn vector_width(&self) -> i64 {
        self.target.map_or(self.config.prevector_width, |t| t.simd_width)
    }

    /// Optimize every band of `tree` and compact the result.
    pub fn optimize_schedule(&mut self, tree: ScheduleTree) -> TransformResult<ScheduleTree> {
        if !self.config.enable_tiling {
            debug!("tiling disabled, schedule of {} left unchanged", self.scop.name);
            return Ok(tree);
        }
        let node = self.optimize_schedule_node(ScheduleNode::root(tree))?;
        Ok(node.into_tree().compact())
    }

    /// Optimize the subtree at `node`, children first. The returned handle
    /// is positioned at the same node id.
    pub fn optimize_schedule_node(&mut self, node: ScheduleNode) -> TransformResult<ScheduleNode> {
        let id = node.id();
        let children = node.children().to_vec();
        let mut node = node;
        for child in children {
            node = self.optimize_schedule_node(node.at(child))?.at(id);
        }
        if node.band().is_some() {
            node = self.optimize_band(node)?.at(id);
        }
        Ok(node)
    }

    fn optimize_band(&mut self, node: ScheduleNode) -> TransformResult<ScheduleNode> {
        let id = node.id();
        let members = node.band().map_or(0, |b| b.n_members());
        let statements: Vec<StmtId> = node.tree().reaching_statements(id).into_iter().collect();
        let (node, action) = self.transform_band(node)?;
        debug!("band {} ({} members, {:?}): {:?}", id, members, statements, action);
        self.decisions.push(BandDecision { node: id, members, statements, action });
        Ok(node)
    }

    fn transform_band(&self, node: ScheduleNode) -> TransformResult<(ScheduleNode, BandAction)> {
        if !is_tileable_band_node(&node) {
            return Ok((node, BandAction::NotTileable));
        }
        if self.config.enable_pattern_matching {
            if let Some(shape) = matr_mult_shape(&node, self.scop) {
                let generic = TargetInfo::generic();
                let target = self.target.unwrap_or(&generic);
                let micro = micro_kernel_params(target);
                let macro_kernel = macro_kernel_params(target, &micro);
                let node = optimize_matmul_pattern(node, self.scop, self.target)?;
                return Ok((node, BandAction::MatMul { shape, micro, macro_kernel }));
            }
        }
        if node.band().map_or(0, |b| b.n_members()) <= 1 {
            return Ok((node, BandAction::SingleMember));
        }
        self.standard_band_opts(node)
    }

    fn standard_band_opts(&self, node: ScheduleNode) -> TransformResult<(ScheduleNode, BandAction)> {
        let mut node = node;
        let mut tiling = Vec::new();
        for stage in self.config.tiling_stages() {
            node = stage.apply(node)?;
            tiling.push(stage.name().to_string());
        }

        let mut vectorized_member = None;
        let mut vector_width = None;
        if self.config.enable_vectorization {
            let innermost_coincident = node.band()
                .and_then(|b| b.members.iter().rposition(|m| m.coincident));
            if let Some(dim) = innermost_coincident {
                let width = self.vector_width();
                node = prevect_sched_band(node, dim, width)?;
                vectorized_member = Some(dim);
                vector_width = Some(width);
            }
        }
        Ok((node, BandAction::Standard { tiling, vectorized_member, vector_width }))
    }
}

/// Optimize the schedule of `scop` and keep the result only if it is
/// profitable.
pub fn optimize_scop(
    scop: &Scop,
    config: &PipelineConfig,
    target: Option<&TargetInfo>,
) -> SchedResult<OptimizationResult> {
    scop.validate()?;
    let mut optimizer = ScheduleTreeOptimizer::new(scop, config, target);
    let candidate = optimizer.optimize_schedule(scop.schedule.clone())?;
    let profitable = is_profitable_schedule(scop, &candidate);
    let schedule = if profitable {
        info!("{}: optimized schedule accepted", scop.name);
        candidate
    } else {
        info!("{}: optimized schedule not profitable, keeping the original", scop.name);
        scop.schedule.clone()
    };
    Ok(OptimizationResult {
        schedule,
        decisions: optimizer.into_decisions(),
        profitable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::scop::{ScopBuilder, StatementBuilder};
    use crate::ir::tree::{BandMember, LoopOption, Mark};
    use crate::polyhedral::{AffineMap, IntegerSet};

    fn stencil(members: Vec<BandMember>) -> Scop {
        let stmt = StatementBuilder::new(StmtId(0), "S")
            .iterators(&["i", "j"])
            .domain(IntegerSet::rectangular(&[64, 64]))
            .read("A", AffineMap::identity(2, 0))
            .write("B", AffineMap::identity(2, 0))
            .build()
            .unwrap();
        let builder = ScopBuilder::new("copy2d").statement(stmt);
        let tree = ScheduleTree::single_band(builder.domains(), members);
        builder.build(tree).unwrap()
    }

    #[test]
    fn test_config_from_json() {
        let config = PipelineConfig::from_json_str(r#"{ "second_level": { "enabled": true } }"#).unwrap();
        assert!(config.second_level.enabled);
        assert_eq!(config.second_level.default_tile_size, 32);
        assert_eq!(config.first_level, PipelineConfig::default().first_level);
        assert!(PipelineConfig::from_json_str("{ nope").is_err());
    }

    #[test]
    fn test_standard_opts() {
        let scop = stencil(vec![BandMember::permutable(true); 2]);
        let config = PipelineConfig::default();
        let mut optimizer = ScheduleTreeOptimizer::new(&scop, &config, None);
        let tree = optimizer.optimize_schedule(scop.schedule.clone()).unwrap();
        let decisions = optimizer.into_decisions();
        assert_eq!(decisions.len(), 1);
        assert_eq!(
            decisions[0].action,
            BandAction::Standard {
                tiling: vec!["1st level tiling".to_string()],
                vectorized_member: Some(1),
                vector_width: Some(4),
            }
        );
        let simd: Vec<_> = tree.bands().into_iter()
            .filter(|&b| tree.band(b).unwrap().has_mark(&Mark::Simd))
            .collect();
        assert!(!simd.is_empty());
        assert!(simd.iter().all(|&b| tree.band(b).unwrap().loop_option == LoopOption::NoUnroll));
    }

    #[test]
    fn test_target_width_wins() {
        let scop = stencil(vec![BandMember::permutable(true); 2]);
        let config = PipelineConfig::default();
        let target = TargetInfo::avx2();
        let mut optimizer = ScheduleTreeOptimizer::new(&scop, &config, Some(&target));
        optimizer.optimize_schedule(scop.schedule.clone()).unwrap();
        match &optimizer.decisions()[0].action {
            BandAction::Standard { vector_width, .. } => assert_eq!(*vector_width, Some(8)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_permutable_untouched() {
        let scop = stencil(vec![BandMember::new(false, false); 2]);
        let result = optimize_scop(&scop, &PipelineConfig::default(), None).unwrap();
        assert!(!result.profitable);
        assert_eq!(result.schedule, scop.schedule);
        assert_eq!(result.decisions[0].action, BandAction::NotTileable);
    }

    #[test]
    fn test_tiling_disabled() {
        let scop = stencil(vec![BandMember::permutable(true); 2]);
        let result = optimize_scop(&scop, &PipelineConfig::no_tiling(), None).unwrap();
        assert!(result.decisions.is_empty());
        assert_eq!(result.schedule, scop.schedule);
    }

    #[test]
    fn test_locality_preset_stages() {
        let names: Vec<String> = PipelineConfig::for_locality()
            .tiling_stages()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["1st level tiling", "2nd level tiling", "Register tiling"]);
    }
}
