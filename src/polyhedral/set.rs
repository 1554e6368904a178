//! Integer sets (iteration domains) defined by affine constraints.

use crate::polyhedral::constraint::{Constraint, ConstraintKind};
use crate::polyhedral::expr::AffineExpr;
use crate::utils::errors::{EvaluationError, EvaluationErrorKind};
use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A conjunction of affine constraints over `n_dim` iterators and `n_param`
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerSet {
    pub n_dim: usize,
    pub n_param: usize,
    pub constraints: Vec<Constraint>,
}

impl IntegerSet {
    pub fn universe(n_dim: usize, n_param: usize) -> Self {
        Self { n_dim, n_param, constraints: Vec::new() }
    }

    /// `{ [x0, ..] : 0 <= x_d < bounds[d] }`
    pub fn rectangular(bounds: &[i64]) -> Self {
        let n_dim = bounds.len();
        let mut set = Self::universe(n_dim, 0);
        for (d, &bound) in bounds.iter().enumerate() {
            set.add_constraint(Constraint::lower_bound(d, 0, n_dim, 0));
            set.add_constraint(Constraint::strict_upper_bound(d, bound, n_dim, 0));
        }
        set
    }

    /// `{ [x0, ..] : 0 <= x_d < p_{params[d]} }`
    pub fn parametric_box(params: &[usize], n_param: usize) -> Self {
        let n_dim = params.len();
        let mut set = Self::universe(n_dim, n_param);
        for (d, &p) in params.iter().enumerate() {
            set.add_constraint(Constraint::lower_bound(d, 0, n_dim, n_param));
            set.add_constraint(Constraint::below_param(d, p, n_dim, n_param));
        }
        set
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.add_constraint(constraint);
        self
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        point.len() == self.n_dim && self.constraints.iter().all(|c| c.is_satisfied(point, params))
    }

    /// All constraints as `>= 0` expressions.
    pub fn inequalities(&self) -> Vec<AffineExpr> {
        self.constraints.iter().flat_map(|c| c.as_inequalities()).collect()
    }

    /// Bounds on iterator `dim` implied by the constraints whose last iterator
    /// is `dim`, given values for the iterators before it.
    pub fn bounds_at(&self, dim: usize, prefix: &[i64], params: &[i64]) -> (Option<i64>, Option<i64>) {
        let mut lower: Option<i64> = None;
        let mut upper: Option<i64> = None;
        for c in &self.constraints {
            if c.last_dim() != Some(dim) {
                continue;
            }
            let coeff = c.expr.coeff(dim);
            let rest = c.expr.without_dim(dim).evaluate(prefix, params);
            let mut tighten_lower = |v: i64| lower = Some(lower.map_or(v, |l| l.max(v)));
            if coeff > 0 || c.kind == ConstraintKind::Equality {
                // |coeff| * x >= -rest  (sign-normalized)
                let (a, b) = if coeff > 0 { (coeff, -rest) } else { (-coeff, rest) };
                tighten_lower(Integer::div_ceil(&b, &a));
            }
            if coeff < 0 || c.kind == ConstraintKind::Equality {
                let (a, b) = if coeff < 0 { (-coeff, rest) } else { (coeff, -rest) };
                let v = Integer::div_floor(&b, &a);
                upper = Some(upper.map_or(v, |u| u.min(v)));
            }
        }
        (lower, upper)
    }

    /// Enumerate all integer points in lexicographic order for the given
    /// parameter values.
    pub fn enumerate(&self, params: &[i64]) -> Result<Vec<Vec<i64>>, EvaluationError> {
        if params.len() < self.n_param {
            return Err(EvaluationError::new(
                format!("expected {} parameter values, got {}", self.n_param, params.len()),
                EvaluationErrorKind::MissingParameter,
            ));
        }
        let mut points = Vec::new();
        let mut prefix = Vec::with_capacity(self.n_dim);
        self.enumerate_from(&mut prefix, params, &mut points)?;
        Ok(points)
    }

    fn enumerate_from(
        &self,
        prefix: &mut Vec<i64>,
        params: &[i64],
        points: &mut Vec<Vec<i64>>,
    ) -> Result<(), EvaluationError> {
        let dim = prefix.len();
        if dim == self.n_dim {
            if self.contains(prefix, params) {
                points.push(prefix.clone());
            }
            return Ok(());
        }
        let (lower, upper) = self.bounds_at(dim, prefix, params);
        let (lower, upper) = match (lower, upper) {
            (Some(l), Some(u)) => (l, u),
            _ => {
                return Err(EvaluationError::new(
                    format!("domain is unbounded along dimension {}", dim),
                    EvaluationErrorKind::UnboundedDomain,
                ))
            }
        };
        for value in lower..=upper {
            prefix.push(value);
            self.enumerate_from(prefix, params, points)?;
            prefix.pop();
        }
        Ok(())
    }

    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let dims: Vec<String> = (0..self.n_dim)
            .map(|d| dim_names.get(d).cloned().unwrap_or_else(|| format!("i{}", d)))
            .collect();
        let mut out = format!("[{}]", dims.join(", "));
        if !self.constraints.is_empty() {
            let cs: Vec<String> = self.constraints.iter()
                .map(|c| c.to_string_with_names(&dims, param_names))
                .collect();
            out.push_str(" : ");
            out.push_str(&cs.join(" and "));
        }
        out
    }
}

impl fmt::Display for IntegerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {} }}", self.to_string_with_names(&[], &[]))
    }
}
