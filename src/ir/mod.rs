//! Intermediate representation consumed and produced by the optimizer.
//!
//! - `scop`: statements, domains and accesses of a static control part
//! - `tree`: the schedule tree and its editing primitives
//! - `flatten`: evaluation of schedule trees

pub mod scop;
pub mod tree;
pub mod flatten;

pub use scop::*;
pub use tree::*;
pub use flatten::{FlatSchedule, Instance, PieceCondition, ScheduleDim, SchedulePiece};
