//! Linear constraints for iteration domains.
//!
//! A constraint is a linear inequality or equality:
//! - Inequality: expr >= 0
//! - Equality: expr = 0

use crate::polyhedral::expr::AffineExpr;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (constraint is: expr >= 0 or expr = 0)
    pub expr: AffineExpr,
    /// Kind of constraint
    pub kind: ConstraintKind,
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Greater than or equal: expr >= 0
    Inequality,
    /// Equal: expr = 0
    Equality,
}

impl Constraint {
    pub fn new(expr: AffineExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    /// expr >= 0
    pub fn ge_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Inequality)
    }

    /// expr = 0
    pub fn eq_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Equality)
    }

    /// lhs >= rhs
    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(lhs - rhs)
    }

    /// lhs <= rhs
    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(rhs - lhs)
    }

    /// x_dim >= lower
    pub fn lower_bound(dim: usize, lower: i64, n_dim: usize, n_param: usize) -> Self {
        Self::ge(
            AffineExpr::var(dim, n_dim, n_param),
            AffineExpr::constant(lower, n_dim, n_param),
        )
    }

    /// x_dim < upper
    pub fn strict_upper_bound(dim: usize, upper: i64, n_dim: usize, n_param: usize) -> Self {
        Self::le(
            AffineExpr::var(dim, n_dim, n_param),
            AffineExpr::constant(upper - 1, n_dim, n_param),
        )
    }

    /// x_dim < p_param
    pub fn below_param(dim: usize, param: usize, n_dim: usize, n_param: usize) -> Self {
        let mut bound = AffineExpr::param(param, n_dim, n_param);
        bound.constant = -1;
        Self::le(AffineExpr::var(dim, n_dim, n_param), bound)
    }

    pub fn is_equality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Equality)
    }

    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        let value = self.expr.evaluate(dim_values, param_values);
        match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
        }
    }

    /// The constraint as a list of `>= 0` expressions (an equality yields two).
    pub fn as_inequalities(&self) -> Vec<AffineExpr> {
        match self.kind {
            ConstraintKind::Inequality => vec![self.expr.clone()],
            ConstraintKind::Equality => vec![self.expr.clone(), -self.expr.clone()],
        }
    }

    /// Highest iterator index with a non-zero coefficient.
    pub fn last_dim(&self) -> Option<usize> {
        self.expr.coeffs.iter().rposition(|&c| c != 0)
    }

    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let op = match self.kind {
            ConstraintKind::Inequality => ">=",
            ConstraintKind::Equality => "=",
        };
        format!("{} {} 0", self.expr.to_string_with_names(dim_names, param_names), op)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let lb = Constraint::lower_bound(0, 2, 1, 0);
        assert!(lb.is_satisfied(&[2], &[]));
        assert!(!lb.is_satisfied(&[1], &[]));

        let ub = Constraint::below_param(0, 0, 1, 1);
        assert!(ub.is_satisfied(&[9], &[10]));
        assert!(!ub.is_satisfied(&[10], &[10]));
    }

    #[test]
    fn test_equality_split() {
        let eq = Constraint::eq_zero(AffineExpr::var(0, 2, 0) - AffineExpr::var(1, 2, 0));
        assert_eq!(eq.as_inequalities().len(), 2);
        assert_eq!(eq.last_dim(), Some(1));
    }
}
