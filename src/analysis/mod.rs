//! Analyses over schedule trees.

pub mod classify;
pub mod profitability;

pub use classify::{is_matr_mult_pattern, is_tileable_band_node, matr_mult_shape, MatMulShape};
pub use profitability::is_profitable_schedule;
