//! Affine maps for access relations.
//!
//! `{ [i, j] -> A[i][j + 1] }` is a map with two inputs (the statement
//! iterators) and two outputs (the array subscripts).

use crate::polyhedral::expr::AffineExpr;
use serde::{Serialize, Deserialize};
use std::fmt;

/// An affine map from `n_in` iterators (and `n_param` parameters) to one
/// output per expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    pub n_in: usize,
    pub n_param: usize,
    /// Output expressions (one per output dimension)
    pub outputs: Vec<AffineExpr>,
}

impl AffineMap {
    /// Create an identity map of given dimension.
    pub fn identity(n_dim: usize, n_param: usize) -> Self {
        let outputs = (0..n_dim)
            .map(|i| AffineExpr::var(i, n_dim, n_param))
            .collect();
        Self { n_in: n_dim, n_param, outputs }
    }

    /// Create from output expressions.
    pub fn from_outputs(n_in: usize, n_param: usize, outputs: Vec<AffineExpr>) -> Self {
        Self { n_in, n_param, outputs }
    }

    /// `[x0, ..] -> [x_{dims[0]}, x_{dims[1]}, ..]`
    pub fn projection(n_in: usize, n_param: usize, dims: &[usize]) -> Self {
        let outputs = dims.iter()
            .map(|&d| AffineExpr::var(d, n_in, n_param))
            .collect();
        Self { n_in, n_param, outputs }
    }

    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    /// Apply the map to a point.
    pub fn apply(&self, input: &[i64], params: &[i64]) -> Vec<i64> {
        self.outputs.iter()
            .map(|expr| expr.evaluate(input, params))
            .collect()
    }

    /// Change of every output when iterator `dim` grows by one.
    pub fn step_along(&self, dim: usize) -> Vec<i64> {
        self.outputs.iter().map(|e| e.coeff(dim)).collect()
    }

    /// True if any output depends on iterator `dim`.
    pub fn depends_on(&self, dim: usize) -> bool {
        self.outputs.iter().any(|e| e.depends_on(dim))
    }

    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let outs: Vec<String> = self.outputs.iter()
            .map(|e| e.to_string_with_names(dim_names, param_names))
            .collect();
        outs.iter().map(|o| format!("[{}]", o)).collect()
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ins: Vec<String> = (0..self.n_in).map(|i| format!("i{}", i)).collect();
        write!(f, "{{ [{}] -> {} }}", ins.join(", "), self.to_string_with_names(&ins, &[]))
    }
}
