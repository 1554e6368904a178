//! Band classification: which bands may be tiled, and which ones have the
//! shape of a matrix multiplication.

use crate::ir::scop::{Scop, StmtId};
use crate::ir::tree::ScheduleNode;
use serde::{Serialize, Deserialize};

/// Roles of the three members of a matrix-multiply band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatMulShape {
    /// The single statement of the band
    pub stmt: StmtId,
    /// Member the written element does not depend on (`k` in `C[i][j] += A[i][k] * B[k][j]`)
    pub reduction: usize,
    /// Remaining member (`i`)
    pub other: usize,
    /// Member along which the written array is contiguous (`j`)
    pub contiguous: usize,
}

impl MatMulShape {
    /// Member order that puts the reduction outermost and the contiguous
    /// member innermost.
    pub fn permutation(&self) -> [usize; 3] {
        [self.reduction, self.other, self.contiguous]
    }
}

/// A band is tileable if all its members are permutable and no band lies
/// below it.
pub fn is_tileable_band_node(node: &ScheduleNode) -> bool {
    match node.band() {
        Some(band) => band.is_permutable() && !node.tree().has_band_below(node.id()),
        None => false,
    }
}

/// True if the band computes a matrix multiplication.
pub fn is_matr_mult_pattern(node: &ScheduleNode, scop: &Scop) -> bool {
    matr_mult_shape(node, scop).is_some()
}

/// Zero everywhere, or a single 1 and zeros elsewhere.
fn is_zero_or_unit_step(step: &[i64]) -> bool {
    let nonzero: Vec<i64> = step.iter().copied().filter(|&s| s != 0).collect();
    matches!(nonzero.as_slice(), [] | [1])
}

/// Detect the matrix-multiply shape of a band and the roles of its members.
///
/// Members are tried as the innermost (reduction) candidate from the
/// innermost outwards; the first one that satisfies every condition wins.
pub fn matr_mult_shape(node: &ScheduleNode, scop: &Scop) -> Option<MatMulShape> {
    let band = node.band()?;
    if band.n_members() != 3 {
        return None;
    }
    let stmts = node.tree().reaching_statements(node.id());
    let stmt_id = match stmts.iter().collect::<Vec<_>>().as_slice() {
        [only] => **only,
        _ => return None,
    };
    let stmt = scop.get_stmt(stmt_id)?;

    let iterators = band.schedule.get(&stmt_id)?
        .iter()
        .map(|e| e.as_affine().and_then(|a| a.as_single_var()))
        .collect::<Option<Vec<usize>>>()?;
    if iterators[0] == iterators[1] || iterators[1] == iterators[2] || iterators[0] == iterators[2] {
        return None;
    }

    let (write, reads) = stmt.accesses.split_last()?;
    if !write.is_write() || reads.is_empty() || !reads.iter().all(|a| a.is_read()) {
        return None;
    }

    for candidate in (0..3).rev() {
        let it = iterators[candidate];
        let unit = stmt.accesses.iter().all(|a| is_zero_or_unit_step(&a.relation.step_along(it)));
        if !unit || write.relation.depends_on(it) {
            continue;
        }
        let others: Vec<usize> = (0..3).filter(|&m| m != candidate).collect();
        let contiguous = others.iter().rev().copied()
            .find(|&m| write.relation.outputs.last().map_or(false, |e| e.depends_on(iterators[m])))
            .unwrap_or(others[1]);
        let other = if contiguous == others[0] { others[1] } else { others[0] };
        return Some(MatMulShape { stmt: stmt_id, reduction: candidate, other, contiguous });
    }
    None
}
