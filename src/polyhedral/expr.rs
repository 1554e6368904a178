//! Affine expressions over statement iterators and parameters.
//!
//! An affine expression is a linear combination of variables plus a constant:
//! `aff(x, p) = c0 + c1*x1 + ... + cn*xn + d1*p1 + ... + dm*pm`

use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub, Neg};

/// An affine expression: constant + sum(coeff[i] * x[i]) + sum(param_coeff[j] * p[j])
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each iterator (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: 0,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: value,
            ..Self::zero(n_dim, n_param)
        }
    }

    /// Create an expression for a single iterator.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        if dim < n_dim {
            expr.coeffs[dim] = 1;
        }
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        if param_idx < n_param {
            expr.param_coeffs[param_idx] = 1;
        }
        expr
    }

    /// Number of iterators this expression is defined over.
    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    /// Number of parameters this expression is defined over.
    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Coefficient of an iterator (zero when out of range).
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Coefficient of a parameter (zero when out of range).
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    /// True if no iterator or parameter appears.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0) && self.param_coeffs.iter().all(|&c| c == 0)
    }

    /// True if the expression is identically zero.
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.is_constant()
    }

    /// True if the iterator `dim` appears with a non-zero coefficient.
    pub fn depends_on(&self, dim: usize) -> bool {
        self.coeff(dim) != 0
    }

    /// True if any parameter appears.
    pub fn involves_params(&self) -> bool {
        self.param_coeffs.iter().any(|&c| c != 0)
    }

    /// If the expression is exactly one iterator with coefficient one, return it.
    pub fn as_single_var(&self) -> Option<usize> {
        if self.constant != 0 || self.involves_params() {
            return None;
        }
        let mut found = None;
        for (i, &c) in self.coeffs.iter().enumerate() {
            match c {
                0 => {}
                1 if found.is_none() => found = Some(i),
                _ => return None,
            }
        }
        found
    }

    /// Evaluate the expression at concrete iterator and parameter values.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        let dims: i64 = self.coeffs.iter()
            .zip(dim_values)
            .map(|(&c, &v)| c * v)
            .sum();
        let params: i64 = self.param_coeffs.iter()
            .zip(param_values)
            .map(|(&c, &v)| c * v)
            .sum();
        self.constant + dims + params
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        Self {
            constant: self.constant * factor,
            coeffs: self.coeffs.iter().map(|&c| c * factor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c * factor).collect(),
        }
    }

    /// Exact division by a constant, if every coefficient is divisible.
    pub fn exact_div(&self, divisor: i64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        let divisible = self.constant % divisor == 0
            && self.coeffs.iter().all(|c| c % divisor == 0)
            && self.param_coeffs.iter().all(|c| c % divisor == 0);
        if !divisible {
            return None;
        }
        Some(Self {
            constant: self.constant / divisor,
            coeffs: self.coeffs.iter().map(|c| c / divisor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|c| c / divisor).collect(),
        })
    }

    /// Return a copy with the coefficient of `dim` set to zero.
    pub fn without_dim(&self, dim: usize) -> Self {
        let mut expr = self.clone();
        if dim < expr.coeffs.len() {
            expr.coeffs[dim] = 0;
        }
        expr
    }

    /// Render with the given iterator and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut parts: Vec<(i64, String)> = Vec::new();

        for (i, &c) in self.coeffs.iter().enumerate() {
            if c != 0 {
                let name = dim_names.get(i).cloned().unwrap_or_else(|| format!("i{}", i));
                parts.push((c, name));
            }
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                let name = param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i));
                parts.push((c, name));
            }
        }

        let mut out = String::new();
        for (idx, (c, name)) in parts.iter().enumerate() {
            let term = match c.abs() {
                1 => name.clone(),
                a => format!("{}*{}", a, name),
            };
            if idx == 0 {
                if *c < 0 {
                    out.push('-');
                }
            } else if *c < 0 {
                out.push_str(" - ");
            } else {
                out.push_str(" + ");
            }
            out.push_str(&term);
        }

        if out.is_empty() {
            return self.constant.to_string();
        }
        if self.constant > 0 {
            out.push_str(&format!(" + {}", self.constant));
        } else if self.constant < 0 {
            out.push_str(&format!(" - {}", -self.constant));
        }
        out
    }
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let n_dim = self.n_dim().max(other.n_dim());
        let n_param = self.n_param().max(other.n_param());
        Self {
            constant: self.constant + other.constant,
            coeffs: (0..n_dim).map(|i| self.coeff(i) + other.coeff(i)).collect(),
            param_coeffs: (0..n_param)
                .map(|i| self.param_coeff(i) + other.param_coeff(i))
                .collect(),
        }
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}
