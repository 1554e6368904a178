//! Quasi-affine expressions: affine expressions extended with integer
//! division by constants.
//!
//! Tiling turns a schedule dimension `e` into a tile dimension `floor(e/T)`
//! and a point dimension `e mod T = e - T*floor(e/T)`. Both are quasi-affine:
//! an affine part plus integer multiples of floor terms whose numerators are
//! again quasi-affine.

use crate::polyhedral::expr::AffineExpr;
use num_integer::Integer;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Add, Sub};

/// `coeff * floor(numerator / denominator)` with `denominator > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloorTerm {
    pub coeff: i64,
    pub numerator: QuasiAffine,
    pub denominator: i64,
}

/// An affine expression plus a sum of floor terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuasiAffine {
    pub affine: AffineExpr,
    pub divs: Vec<FloorTerm>,
}

impl QuasiAffine {
    pub fn from_affine(affine: AffineExpr) -> Self {
        Self { affine, divs: Vec::new() }
    }

    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        Self::from_affine(AffineExpr::var(dim, n_dim, n_param))
    }

    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self::from_affine(AffineExpr::constant(value, n_dim, n_param))
    }

    pub fn n_dim(&self) -> usize {
        self.affine.n_dim()
    }

    pub fn n_param(&self) -> usize {
        self.affine.n_param()
    }

    /// True if there are no floor terms.
    pub fn is_affine(&self) -> bool {
        self.divs.is_empty()
    }

    pub fn as_affine(&self) -> Option<&AffineExpr> {
        if self.is_affine() { Some(&self.affine) } else { None }
    }

    /// `floor(self / divisor)`. The divisor must be positive.
    pub fn floor_div(&self, divisor: i64) -> Self {
        debug_assert!(divisor > 0, "floor division by non-positive {}", divisor);
        if divisor == 1 {
            return self.clone();
        }
        if let Some(exact) = self.as_affine().and_then(|a| a.exact_div(divisor)) {
            return Self::from_affine(exact);
        }
        Self {
            affine: AffineExpr::zero(self.n_dim(), self.n_param()),
            divs: vec![FloorTerm {
                coeff: 1,
                numerator: self.clone(),
                denominator: divisor,
            }],
        }
    }

    /// `self mod divisor`, always in `[0, divisor)`.
    pub fn modulo(&self, divisor: i64) -> Self {
        if divisor == 1 {
            return Self::constant(0, self.n_dim(), self.n_param());
        }
        self.clone() - self.floor_div(divisor).scale(divisor)
    }

    pub fn scale(&self, factor: i64) -> Self {
        if factor == 0 {
            return Self::constant(0, self.n_dim(), self.n_param());
        }
        Self {
            affine: self.affine.scale(factor),
            divs: self.divs.iter()
                .map(|t| FloorTerm { coeff: t.coeff * factor, ..t.clone() })
                .collect(),
        }
    }

    /// True if iterator `dim` appears anywhere, including inside floor terms.
    pub fn depends_on(&self, dim: usize) -> bool {
        self.affine.depends_on(dim) || self.divs.iter().any(|t| t.numerator.depends_on(dim))
    }

    pub fn involves_params(&self) -> bool {
        self.affine.involves_params() || self.divs.iter().any(|t| t.numerator.involves_params())
    }

    /// Replace iterator `dim` by `replacement` everywhere.
    pub fn substitute_dim(&self, dim: usize, replacement: &QuasiAffine) -> Self {
        let mut result = Self::from_affine(self.affine.without_dim(dim));
        for term in &self.divs {
            result.push_div(FloorTerm {
                coeff: term.coeff,
                numerator: term.numerator.substitute_dim(dim, replacement),
                denominator: term.denominator,
            });
        }
        result + replacement.scale(self.affine.coeff(dim))
    }

    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        let divs: i64 = self.divs.iter()
            .map(|t| {
                let num = t.numerator.evaluate(dim_values, param_values);
                t.coeff * Integer::div_floor(&num, &t.denominator)
            })
            .sum();
        self.affine.evaluate(dim_values, param_values) + divs
    }

    /// Add a floor term, merging it with an identical one.
    fn push_div(&mut self, term: FloorTerm) {
        if term.coeff == 0 {
            return;
        }
        if let Some(existing) = self.divs.iter_mut()
            .find(|t| t.denominator == term.denominator && t.numerator == term.numerator)
        {
            existing.coeff += term.coeff;
        } else {
            self.divs.push(term);
        }
        self.divs.retain(|t| t.coeff != 0);
    }

    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut out = String::new();
        if !self.affine.is_zero() || self.divs.is_empty() {
            out.push_str(&self.affine.to_string_with_names(dim_names, param_names));
        }
        for term in &self.divs {
            let floor = format!(
                "floor(({})/{})",
                term.numerator.to_string_with_names(dim_names, param_names),
                term.denominator
            );
            let magnitude = match term.coeff.abs() {
                1 => floor,
                a => format!("{}*{}", a, floor),
            };
            if out.is_empty() {
                if term.coeff < 0 {
                    out.push('-');
                }
            } else if term.coeff < 0 {
                out.push_str(" - ");
            } else {
                out.push_str(" + ");
            }
            out.push_str(&magnitude);
        }
        out
    }
}

impl From<AffineExpr> for QuasiAffine {
    fn from(affine: AffineExpr) -> Self {
        Self::from_affine(affine)
    }
}

impl Add for QuasiAffine {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let mut result = Self::from_affine(self.affine + other.affine);
        for term in self.divs.into_iter().chain(other.divs) {
            result.push_div(term);
        }
        result
    }
}

impl Sub for QuasiAffine {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + other.scale(-1)
    }
}

impl fmt::Display for QuasiAffine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_and_mod_reconstruct() {
        let i = QuasiAffine::var(0, 1, 0);
        let tile = i.floor_div(4);
        let point = i.modulo(4);
        for v in -9..17 {
            let t = tile.evaluate(&[v], &[]);
            let p = point.evaluate(&[v], &[]);
            assert!((0..4).contains(&p));
            assert_eq!(t * 4 + p, v);
        }
    }

    #[test]
    fn test_exact_floor_stays_affine() {
        let e = QuasiAffine::from_affine(AffineExpr::var(0, 1, 0).scale(8));
        let q = e.floor_div(4);
        assert!(q.is_affine());
        assert_eq!(q.evaluate(&[3], &[]), 6);
    }

    #[test]
    fn test_substitute() {
        // (j mod 8) with j := j + 3
        let j = QuasiAffine::var(0, 1, 0);
        let e = j.modulo(8);
        let shifted = e.substitute_dim(0, &(j.clone() + QuasiAffine::constant(3, 1, 0)));
        for v in 0..20 {
            assert_eq!(shifted.evaluate(&[v], &[]), (v + 3) % 8);
        }
    }

    #[test]
    fn test_nested_mod() {
        let j = QuasiAffine::var(0, 1, 0);
        let e = j.modulo(32).modulo(4);
        for v in 0..100 {
            assert_eq!(e.evaluate(&[v], &[]), v % 4);
        }
        assert!(e.depends_on(0));
    }

    #[test]
    fn test_display() {
        let names = vec!["i".to_string()];
        let t = QuasiAffine::var(0, 1, 0).floor_div(32);
        assert_eq!(t.to_string_with_names(&names, &[]), "floor((i)/32)");
        let p = QuasiAffine::var(0, 1, 0).modulo(32);
        assert_eq!(p.to_string_with_names(&names, &[]), "i - 32*floor((i)/32)");
    }
}
