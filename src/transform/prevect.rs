//! Prevectorization.
//!
//! One member of a band is strip-mined by the vector width. The resulting
//! point loop has a constant trip count, is moved innermost and marked for
//! SIMD code generation. Vector groups that lie entirely inside the
//! iteration domain (full tiles) are separated from the boundary remainder
//! (partial tiles) so that the full part needs no bound checks:
//!
//! ```text
//! band [floor(e/V)]                 <- returned handle
//!   sequence
//!     filter full    -> ... band [e mod V] SIMD, no-unroll
//!     filter partial -> ... band [e mod V] SIMD, no-unroll
//! ```

use crate::ir::scop::StmtId;
use crate::ir::tree::{
    Filter, LoopOption, Mark, NodeId, NodeKind, ScheduleNode, ScheduleTree, TileFilter, TileKind,
};
use crate::polyhedral::{IntegerSet, QuasiAffine};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

const PREVECT: &str = "prevect_sched_band";
const ISOLATE: &str = "isolate_full_partial_tiles";

/// Strip-mine member `dim` of the band at `node` by `vector_width`,
/// isolate full vector tiles and sink the vector loop innermost. Returns the
/// handle at the vector tile band.
pub fn prevect_sched_band(node: ScheduleNode, dim: usize, vector_width: i64) -> TransformResult<ScheduleNode> {
    let band = node.band().ok_or_else(|| {
        TransformError::new(
            format!("node {} is not a band", node.id()),
            TransformErrorKind::NotABand,
            PREVECT,
        )
    })?;
    let n = band.n_members();
    if dim >= n {
        return Err(TransformError::new(
            format!("member {} out of range for a band of {} members", dim, n),
            TransformErrorKind::DimensionOutOfRange,
            PREVECT,
        ));
    }
    if vector_width < 1 {
        return Err(TransformError::new(
            format!("vector width {} is not positive", vector_width),
            TransformErrorKind::InvalidTileSize,
            PREVECT,
        ));
    }
    if n > 1 && !band.is_permutable() {
        return Err(TransformError::new(
            format!("band {} is not permutable", node.id()),
            TransformErrorKind::NotPermutable,
            PREVECT,
        ));
    }

    let mut node = node;
    let mut id = node.id();
    let tree = node.tree_mut();
    if dim > 0 {
        id = tree.band_split(id, dim)?;
    }
    if dim + 1 < n {
        tree.band_split(id, 1)?;
    }
    tree.band_tile(id, &[vector_width])?;

    for point in isolate_at(tree, id, vector_width)? {
        for sunk in tree.band_sink(point)? {
            if let Some(band) = tree.band_mut(sunk) {
                band.marks.push(Mark::Simd);
                band.loop_option = LoopOption::NoUnroll;
            }
        }
    }
    trace!("prevectorized member {} by {}, vector tile band at {}", dim, vector_width, id);
    Ok(node.at(id))
}

/// Separate full vector tiles from partial ones below the one-member tile
/// band at `node`, whose child must be the matching point band. Returns the
/// handle at the tile band.
pub fn isolate_full_partial_tiles(node: ScheduleNode, vector_width: i64) -> TransformResult<ScheduleNode> {
    let mut node = node;
    let id = node.id();
    isolate_at(node.tree_mut(), id, vector_width)?;
    Ok(node)
}

/// Returns the roots of the branches that hold the point band, or the
/// point band alone when nothing was isolated.
fn isolate_at(tree: &mut ScheduleTree, id: NodeId, vector_width: i64) -> TransformResult<Vec<NodeId>> {
    let mismatch = |message: String| {
        TransformError::new(message, TransformErrorKind::PatternMismatch, ISOLATE)
    };
    let tile = tree.band(id).ok_or_else(|| {
        TransformError::new(
            format!("node {} is not a band", id),
            TransformErrorKind::NotABand,
            ISOLATE,
        )
    })?;
    let point_id = match tree.children(id) {
        [child] => *child,
        other => return Err(mismatch(format!("tile band {} has {} children", id, other.len()))),
    };
    let point = tree.band(point_id)
        .ok_or_else(|| mismatch(format!("child {} of tile band {} is not a band", point_id, id)))?;
    if tile.n_members() != 1 || point.n_members() != 1 {
        return Err(mismatch(format!(
            "expected one-member tile and point bands, found {} and {}",
            tile.n_members(),
            point.n_members()
        )));
    }
    if vector_width < 1 {
        return Err(TransformError::new(
            format!("vector width {} is not positive", vector_width),
            TransformErrorKind::InvalidTileSize,
            ISOLATE,
        ));
    }

    let stmts = tree.reaching_statements(id);
    if stmts.len() != 1 {
        debug!("band {} is shared by {} statements, full tiles not isolated", id, stmts.len());
        return Ok(vec![point_id]);
    }
    let path = tree.path_to(id)
        .ok_or_else(|| mismatch(format!("band {} is not reachable from the root", id)))?;
    let guards: BTreeMap<StmtId, Option<Vec<QuasiAffine>>> = stmts.iter()
        .map(|&stmt| (stmt, full_tile_guard(tree, &path, point_id, stmt, vector_width)))
        .collect();
    if guards.values().all(Option::is_none) {
        debug!("no full vector tiles of width {} below band {}", vector_width, id);
        return Ok(vec![point_id]);
    }

    let filters = [TileKind::Full, TileKind::Partial]
        .into_iter()
        .map(|kind| Filter::Tiles(TileFilter { kind, width: vector_width, guards: guards.clone() }))
        .collect();
    let branches = tree.insert_sequence(point_id, filters)?;
    trace!("isolated full vector tiles of width {} below band {}", vector_width, id);
    Ok(branches)
}

/// Iterators the band expressions of `stmt` depend on, over the given nodes.
fn band_iterators(tree: &ScheduleTree, nodes: &[NodeId], stmt: StmtId, n_dim: usize) -> BTreeSet<usize> {
    let mut iterators = BTreeSet::new();
    for &id in nodes {
        if let Some(exprs) = tree.band(id).and_then(|b| b.schedule.get(&stmt)) {
            iterators.extend((0..n_dim).filter(|&d| exprs.iter().any(|e| e.depends_on(d))));
        }
    }
    iterators
}

/// Iterators that share a band expression of `stmt` with another iterator,
/// over the given nodes.
fn coupled_iterators(tree: &ScheduleTree, nodes: &[NodeId], stmt: StmtId, n_dim: usize) -> BTreeSet<usize> {
    let mut coupled = BTreeSet::new();
    let exprs = nodes.iter()
        .filter_map(|&id| tree.band(id).and_then(|b| b.schedule.get(&stmt)))
        .flatten();
    for expr in exprs {
        let used: Vec<usize> = (0..n_dim).filter(|&d| expr.depends_on(d)).collect();
        if used.len() > 1 {
            coupled.extend(used);
        }
    }
    coupled
}

/// Guard selecting the instances of `stmt` whose vector group lies entirely
/// inside the domain, or `None` if the statement never forms full groups.
///
/// The vector expression `e` must advance with an iterator `x_k` of unit
/// coefficient while everything else in `e` is a multiple of the width, so
/// that the group of an instance is `x_k` ranging over the aligned block
/// `[x_k - x_k mod V, x_k - x_k mod V + V - 1]`. Every domain constraint on
/// `x_k` is checked at both ends of the block. Other iterators involved must
/// be fixed by the bands above the group and unused by the bands below it,
/// so the guard only depends on the schedule prefix. An iterator only counts
/// as fixed when no band above combines it with another iterator: a skewed
/// outer member such as `i + j` pins the sum, not `i`.
fn full_tile_guard(
    tree: &ScheduleTree,
    path: &[NodeId],
    point_id: NodeId,
    stmt: StmtId,
    width: i64,
) -> Option<Vec<QuasiAffine>> {
    let domain: &IntegerSet = tree.domains()?.get(&stmt)?;
    let (n_dim, n_param) = (domain.n_dim, domain.n_param);
    let tile_id = *path.last()?;
    let tile_expr = tree.band(tile_id)?.member_expr(stmt, 0)?;
    let point_expr = tree.band(point_id)?.member_expr(stmt, 0)?;
    let e = tile_expr.scale(width) + point_expr.clone();

    let k = (0..n_dim).rev().find(|&d| e.affine.coeff(d) == 1)?;
    let aligned = |c: i64| c % width == 0;
    let rest = e.affine.without_dim(k);
    if !aligned(rest.constant) || !rest.coeffs.iter().all(|&c| aligned(c))
        || !rest.param_coeffs.iter().all(|&c| aligned(c))
    {
        return None;
    }
    for term in &e.divs {
        if !aligned(term.coeff) {
            return None;
        }
        if term.numerator.depends_on(k) {
            let num = term.numerator.as_affine()?;
            let offset = num.without_dim(k);
            if num.coeff(k) != 1 || !offset.is_constant() || !aligned(offset.constant)
                || !aligned(term.denominator)
            {
                return None;
            }
        }
    }

    let below: Vec<NodeId> = tree.subtree(point_id).into_iter().skip(1).collect();
    let above = band_iterators(tree, path, stmt, n_dim);
    let coupled = coupled_iterators(tree, path, stmt, n_dim);
    let below = band_iterators(tree, &below, stmt, n_dim);
    let fixed = |d: usize| {
        d == k || (above.contains(&d) && !coupled.contains(&d) && !below.contains(&d))
    };
    if !(0..n_dim).filter(|&d| e.depends_on(d)).all(fixed) {
        return None;
    }

    let x_k = QuasiAffine::var(k, n_dim, n_param);
    let start = x_k.clone() - x_k.modulo(width);
    let mut guard = Vec::new();
    for constraint in domain.inequalities() {
        if !constraint.depends_on(k) {
            continue;
        }
        if !(0..n_dim).filter(|&d| constraint.depends_on(d)).all(fixed) {
            return None;
        }
        let constraint = QuasiAffine::from_affine(constraint);
        for delta in [0, width - 1] {
            let end = start.clone() + QuasiAffine::constant(delta, n_dim, n_param);
            guard.push(constraint.substitute_dim(k, &end));
        }
    }
    Some(guard)
}

/// True if `id` is a sequence produced by isolation.
pub fn is_isolation_sequence(tree: &ScheduleTree, id: NodeId) -> bool {
    matches!(tree.kind(id), Some(NodeKind::Sequence))
        && tree.children(id).iter().all(|&c| {
            matches!(tree.kind(c), Some(NodeKind::Filter(Filter::Tiles(_))))
        })
}
