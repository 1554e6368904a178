//! Band tiling.
//!
//! Tiling (also called blocking) splits every member `e` of a band into a
//! tile member `floor(e / T)` and a point member `e mod T`:
//! ```text
//! for i = 0 to N:
//!   for j = 0 to M:
//!     A[i][j] = ...
//! ```
//! becomes:
//! ```text
//! for ii = 0 to N step Ti:        <- tile band   "id - Tiles"
//!   for jj = 0 to M step Tj:
//!     for i = ii to min(ii + Ti, N):   <- point band  "id - Points"
//!       for j = jj to min(jj + Tj, M):
//!         A[i][j] = ...
//! ```

use crate::ir::tree::{LoopOption, Mark, ScheduleNode};
use crate::transform::Transform;
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};
use log::trace;
use serde::{Serialize, Deserialize};

/// Identifier of the register tiling stage.
pub const REGISTER_TILING: &str = "Register tiling";

/// Tile the band at `node`. Member `d` is tiled by `tile_sizes[d]`, or by
/// `default_tile_size` when no size is given for it. Returns the handle at
/// the new point band.
pub fn tile_node(
    node: ScheduleNode,
    identifier: &str,
    tile_sizes: &[i64],
    default_tile_size: i64,
) -> TransformResult<ScheduleNode> {
    let id = node.id();
    let band = node.band().ok_or_else(|| {
        TransformError::new(
            format!("{} applied to a non-band node {}", identifier, id),
            TransformErrorKind::NotABand,
            "tile_node",
        )
    })?;
    let n = band.n_members();
    if n > 1 && !band.is_permutable() {
        return Err(TransformError::new(
            format!("{}: band {} is not permutable", identifier, id),
            TransformErrorKind::NotPermutable,
            "tile_node",
        ));
    }
    let sizes: Vec<i64> = (0..n)
        .map(|d| tile_sizes.get(d).copied().unwrap_or(default_tile_size))
        .collect();
    if let Some(bad) = sizes.iter().find(|&&s| s < 1) {
        return Err(TransformError::new(
            format!("{}: tile size {} is not positive", identifier, bad),
            TransformErrorKind::InvalidTileSize,
            "tile_node",
        ));
    }

    let mut node = node;
    let tree = node.tree_mut();
    let point = tree.band_tile(id, &sizes)?;
    if let Some(tile) = tree.band_mut(id) {
        tile.marks.push(Mark::Tiles(identifier.to_string()));
    }
    if let Some(points) = tree.band_mut(point) {
        points.marks.push(Mark::Points(identifier.to_string()));
    }
    trace!("{}: band {} tiled by {:?}, points at {}", identifier, id, sizes, point);
    Ok(node.at(point))
}

/// Tile for registers and fully unroll the point band.
pub fn apply_register_tiling(
    node: ScheduleNode,
    tile_sizes: &[i64],
    default_tile_size: i64,
) -> TransformResult<ScheduleNode> {
    let mut node = tile_node(node, REGISTER_TILING, tile_sizes, default_tile_size)?;
    let id = node.id();
    if let Some(band) = node.tree_mut().band_mut(id) {
        band.loop_option = LoopOption::Unroll;
    }
    Ok(node)
}

/// A tiling stage as a reusable transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tiling {
    pub identifier: String,
    pub tile_sizes: Vec<i64>,
    pub default_tile_size: i64,
    /// Unroll the point band
    pub register: bool,
}

impl Tiling {
    pub fn new(identifier: impl Into<String>, tile_sizes: Vec<i64>, default_tile_size: i64) -> Self {
        Self {
            identifier: identifier.into(),
            tile_sizes,
            default_tile_size,
            register: false,
        }
    }

    pub fn register(tile_sizes: Vec<i64>, default_tile_size: i64) -> Self {
        Self {
            register: true,
            ..Self::new(REGISTER_TILING, tile_sizes, default_tile_size)
        }
    }
}

impl Transform for Tiling {
    fn apply(&self, node: ScheduleNode) -> TransformResult<ScheduleNode> {
        if self.register {
            apply_register_tiling(node, &self.tile_sizes, self.default_tile_size)
        } else {
            tile_node(node, &self.identifier, &self.tile_sizes, self.default_tile_size)
        }
    }

    fn name(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::scop::StmtId;
    use crate::ir::tree::{BandMember, ScheduleTree};
    use crate::polyhedral::IntegerSet;
    use std::collections::BTreeMap;

    fn band_node(members: Vec<BandMember>) -> ScheduleNode {
        let n = members.len();
        let domains: BTreeMap<_, _> = [(StmtId(0), IntegerSet::rectangular(&vec![12; n]))]
            .into_iter()
            .collect();
        ScheduleNode::root(ScheduleTree::single_band(domains, members)).child(0).unwrap()
    }

    #[test]
    fn test_tile_marks_and_flags() {
        let node = band_node(vec![BandMember::permutable(true), BandMember::permutable(false)]);
        let tile_id = node.id();
        let point = tile_node(node, "1st level tiling", &[4], 8).unwrap();
        let tree = point.tree();
        let tile = tree.band(tile_id).unwrap();
        let pts = point.band().unwrap();
        assert!(tile.has_mark(&Mark::Tiles("1st level tiling".to_string())));
        assert!(pts.has_mark(&Mark::Points("1st level tiling".to_string())));
        assert_eq!(tile.members, pts.members);
        // second member uses the default size
        let e = pts.member_expr(StmtId(0), 1).unwrap();
        assert_eq!(e.evaluate(&[0, 11], &[]), 3);
    }

    #[test]
    fn test_register_tiling_unrolls() {
        let node = band_node(vec![BandMember::permutable(true); 2]);
        let point = apply_register_tiling(node, &[], 2).unwrap();
        assert_eq!(point.band().unwrap().loop_option, LoopOption::Unroll);
        assert!(point.band().unwrap().has_mark(&Mark::Points(REGISTER_TILING.to_string())));
    }

    #[test]
    fn test_preconditions() {
        let node = band_node(vec![BandMember::permutable(true)]);
        let err = tile_node(node, "t", &[0], 32).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::InvalidTileSize);

        let node = band_node(vec![BandMember::new(false, true); 2]);
        let err = tile_node(node, "t", &[], 32).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::NotPermutable);

        let leaf = band_node(vec![BandMember::permutable(true)]).child(0).unwrap();
        let err = tile_node(leaf, "t", &[], 32).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::NotABand);
    }

    #[test]
    fn test_transform_trait() {
        let stage = Tiling::register(vec![2], 2);
        assert_eq!(stage.name(), REGISTER_TILING);
        let point = stage.apply(band_node(vec![BandMember::permutable(true)])).unwrap();
        assert_eq!(point.band().unwrap().loop_option, LoopOption::Unroll);
    }
}
