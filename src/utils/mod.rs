//! Utility modules for the schedule optimizer.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types
//! - Schedule tree printing

pub mod errors;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use pretty::{PrettyPrint, NamedTree};
