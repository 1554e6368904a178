//! Polyhedral data structures.
//!
//! This module provides the affine substrate the schedule optimizer composes:
//! - Affine and quasi-affine expressions
//! - Constraints and integer sets (iteration domains)
//! - Affine maps (access relations)

pub mod expr;
pub mod quasi;
pub mod constraint;
pub mod set;
pub mod map;

pub use expr::AffineExpr;
pub use quasi::{FloorTerm, QuasiAffine};
pub use constraint::{Constraint, ConstraintKind};
pub use set::IntegerSet;
pub use map::AffineMap;
