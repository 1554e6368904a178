//! Evaluation of schedule trees.
//!
//! `timestamp` and `execution_order` interpret a tree for concrete
//! parameter values. `flatten` gives the symbolic per-statement view used to
//! decide whether a candidate tree differs from the original.

use crate::ir::scop::StmtId;
use crate::ir::tree::{Filter, NodeId, NodeKind, ScheduleTree, TileKind};
use crate::polyhedral::QuasiAffine;
use crate::utils::errors::{EvaluationError, EvaluationErrorKind};
use std::collections::BTreeMap;

/// One statement instance together with its schedule timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instance {
    pub timestamp: Vec<i64>,
    pub stmt: StmtId,
    pub point: Vec<i64>,
}

/// One dimension of a flattened schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDim {
    /// Band member expression
    Expr(QuasiAffine),
    /// Child position in a sequence or set
    Position(usize),
}

/// Condition from a full/partial tile filter on the way to a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceCondition {
    pub kind: TileKind,
    pub width: i64,
    pub guard: Option<Vec<QuasiAffine>>,
}

/// The schedule of a statement along one root-to-leaf path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulePiece {
    pub conditions: Vec<PieceCondition>,
    pub dims: Vec<ScheduleDim>,
}

/// Per-statement schedule pieces.
pub type FlatSchedule = BTreeMap<StmtId, Vec<SchedulePiece>>;

fn unscheduled(stmt: StmtId, point: &[i64], reason: &str) -> EvaluationError {
    EvaluationError::new(
        format!("instance {}{:?} is not scheduled: {}", stmt, point, reason),
        EvaluationErrorKind::Unscheduled,
    )
}

impl ScheduleTree {
    /// Schedule vector of one instance: band members evaluated in order, with
    /// the child position inserted at every sequence or set.
    pub fn timestamp(&self, stmt: StmtId, point: &[i64], params: &[i64]) -> Result<Vec<i64>, EvaluationError> {
        let domains = self.domains()
            .ok_or_else(|| unscheduled(stmt, point, "tree has no domain root"))?;
        let domain = domains.get(&stmt).ok_or_else(|| {
            EvaluationError::new(
                format!("statement {} is not in the tree's domain", stmt),
                EvaluationErrorKind::UnknownStatement,
            )
        })?;
        if params.len() < domain.n_param {
            return Err(EvaluationError::new(
                format!("expected {} parameter values, got {}", domain.n_param, params.len()),
                EvaluationErrorKind::MissingParameter,
            ));
        }

        let mut stamp = Vec::new();
        let mut current = self.root();
        loop {
            let node = self.node(current)
                .ok_or_else(|| unscheduled(stmt, point, "dangling node"))?;
            let next = match &node.kind {
                NodeKind::Domain(_) => node.children.first().copied(),
                NodeKind::Band(band) => {
                    let exprs = band.schedule.get(&stmt)
                        .ok_or_else(|| unscheduled(stmt, point, "band does not schedule the statement"))?;
                    stamp.extend(exprs.iter().map(|e| e.evaluate(point, params)));
                    node.children.first().copied()
                }
                NodeKind::Sequence | NodeKind::Set => {
                    let pos = node.children.iter()
                        .position(|&c| self.passes(c, stmt, point, params))
                        .ok_or_else(|| unscheduled(stmt, point, "no branch admits the instance"))?;
                    stamp.push(pos as i64);
                    Some(node.children[pos])
                }
                NodeKind::Filter(filter) => {
                    if !filter.admits(stmt, point, params) {
                        return Err(unscheduled(stmt, point, "filtered out"));
                    }
                    node.children.first().copied()
                }
                NodeKind::Leaf => None,
            };
            match next {
                Some(child) => current = child,
                None => return Ok(stamp),
            }
        }
    }

    fn passes(&self, id: NodeId, stmt: StmtId, point: &[i64], params: &[i64]) -> bool {
        match self.kind(id) {
            Some(NodeKind::Filter(filter)) => filter.admits(stmt, point, params),
            Some(_) => true,
            None => false,
        }
    }

    /// Every instance of every statement, in execution order. Ties are broken
    /// by statement id, then by iteration point.
    pub fn execution_order(&self, params: &[i64]) -> Result<Vec<Instance>, EvaluationError> {
        let domains = match self.domains() {
            Some(domains) => domains,
            None => return Ok(Vec::new()),
        };
        let mut instances = Vec::new();
        for (&stmt, domain) in domains {
            for point in domain.enumerate(params)? {
                let timestamp = self.timestamp(stmt, &point, params)?;
                instances.push(Instance { timestamp, stmt, point });
            }
        }
        instances.sort();
        Ok(instances)
    }

    /// Per statement, the schedule along every root-to-leaf path it may
    /// reach. Marks and loop options are not part of the result.
    pub fn flatten(&self) -> FlatSchedule {
        let mut flat = FlatSchedule::new();
        let stmts: Vec<StmtId> = self.domains()
            .map(|d| d.keys().copied().collect())
            .unwrap_or_default();
        for stmt in stmts {
            let mut pieces = Vec::new();
            self.flatten_from(self.root(), stmt, SchedulePiece::default(), &mut pieces);
            flat.insert(stmt, pieces);
        }
        flat
    }

    fn flatten_from(&self, id: NodeId, stmt: StmtId, mut piece: SchedulePiece, pieces: &mut Vec<SchedulePiece>) {
        let node = match self.node(id) {
            Some(node) => node,
            None => return,
        };
        match &node.kind {
            NodeKind::Leaf => {
                pieces.push(piece);
                return;
            }
            NodeKind::Band(band) => {
                if let Some(exprs) = band.schedule.get(&stmt) {
                    piece.dims.extend(exprs.iter().cloned().map(ScheduleDim::Expr));
                }
            }
            NodeKind::Filter(filter) => {
                if !filter.may_admit(stmt) {
                    return;
                }
                if let Filter::Tiles(tiles) = filter {
                    piece.conditions.push(PieceCondition {
                        kind: tiles.kind,
                        width: tiles.width,
                        guard: tiles.guards.get(&stmt).cloned().flatten(),
                    });
                }
            }
            NodeKind::Sequence | NodeKind::Set => {
                for (pos, &child) in node.children.iter().enumerate() {
                    let mut branch = piece.clone();
                    branch.dims.push(ScheduleDim::Position(pos));
                    self.flatten_from(child, stmt, branch, pieces);
                }
                return;
            }
            NodeKind::Domain(_) => {}
        }
        for &child in &node.children {
            self.flatten_from(child, stmt, piece.clone(), pieces);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::tree::{Band, BandMember, Filter};
    use crate::polyhedral::IntegerSet;

    fn two_statement_tree() -> ScheduleTree {
        let domains: BTreeMap<StmtId, IntegerSet> = [
            (StmtId(0), IntegerSet::rectangular(&[3])),
            (StmtId(1), IntegerSet::rectangular(&[3])),
        ].into_iter().collect();
        let mut tree = ScheduleTree::single_band(domains.clone(), vec![BandMember::permutable(true)]);
        let band = tree.children(tree.root())[0];
        let leaf = tree.children(band)[0];
        tree.insert_sequence(leaf, vec![
            Filter::Statements([StmtId(1)].into_iter().collect()),
            Filter::Statements([StmtId(0)].into_iter().collect()),
        ]).unwrap();
        tree
    }

    #[test]
    fn test_timestamp() {
        let tree = two_statement_tree();
        assert_eq!(tree.timestamp(StmtId(0), &[2], &[]).unwrap(), vec![2, 1]);
        assert_eq!(tree.timestamp(StmtId(1), &[2], &[]).unwrap(), vec![2, 0]);
        let err = tree.timestamp(StmtId(7), &[0], &[]).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::UnknownStatement);
    }

    #[test]
    fn test_execution_order_interleaves() {
        let tree = two_statement_tree();
        let order = tree.execution_order(&[]).unwrap();
        let stmts: Vec<u64> = order.iter().map(|i| i.stmt.0).collect();
        assert_eq!(stmts, vec![1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_flatten_pieces() {
        let tree = two_statement_tree();
        let flat = tree.flatten();
        assert_eq!(flat[&StmtId(0)].len(), 1);
        let piece = &flat[&StmtId(0)][0];
        assert_eq!(piece.dims.len(), 2);
        assert_eq!(piece.dims[1], ScheduleDim::Position(1));
    }

    #[test]
    fn test_flatten_ignores_marks() {
        let tree = two_statement_tree();
        let mut marked = tree.clone();
        let band = marked.children(marked.root())[0];
        let b: &mut Band = marked.band_mut(band).unwrap();
        b.marks.push(crate::ir::tree::Mark::Simd);
        assert_ne!(tree, marked);
        assert_eq!(tree.flatten(), marked.flatten());
    }
}
