//! Profitability of a candidate schedule.

use crate::ir::scop::Scop;
use crate::ir::tree::ScheduleTree;
use log::trace;

/// A candidate is kept only if it schedules some statement differently from
/// the original. Marks and loop options alone do not count.
pub fn is_profitable_schedule(scop: &Scop, new_schedule: &ScheduleTree) -> bool {
    let original = scop.schedule.flatten();
    let candidate = new_schedule.flatten();
    let changed = original != candidate;
    trace!(
        "profitability of {}: {} piece(s) before, {} after, changed = {}",
        scop.name,
        original.values().map(Vec::len).sum::<usize>(),
        candidate.values().map(Vec::len).sum::<usize>(),
        changed
    );
    changed
}
