//! Error types for the schedule optimizer.
//!
//! Transformations are partial: calling one outside its precondition is a
//! hard failure reported as a [`TransformError`]. Evaluating a tree or a
//! domain for concrete parameter values can fail with an
//! [`EvaluationError`].

use thiserror::Error;
use std::fmt;

/// Top-level error type for the optimizer.
#[derive(Error, Debug)]
pub enum SchedOptError {
    /// Error during a schedule tree transformation
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// Error while evaluating a tree or domain
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Malformed input scop
    #[error("Invalid scop: {0}")]
    InvalidScop(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error during transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    /// The error message
    pub message: String,
    /// The kind of transformation error
    pub kind: TransformErrorKind,
    /// The transformation that failed
    pub transform: String,
}

impl TransformError {
    pub fn new(
        message: impl Into<String>,
        kind: TransformErrorKind,
        transform: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            transform: transform.into(),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.transform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// The node is not a band
    NotABand,
    /// A member index or position is out of range
    DimensionOutOfRange,
    /// Tile size or vector width below one
    InvalidTileSize,
    /// The band members are not permutable
    NotPermutable,
    /// The band does not have the required shape
    PatternMismatch,
    /// The node id is dangling or the tree shape is unexpected
    InvalidNode,
}

/// Error during evaluation of a tree or domain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    /// The error message
    pub message: String,
    /// The kind of evaluation error
    pub kind: EvaluationErrorKind,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>, kind: EvaluationErrorKind) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationErrorKind {
    /// A domain has no finite bound along some dimension
    UnboundedDomain,
    /// Fewer parameter values than parameters
    MissingParameter,
    /// The statement is not bound by the tree's domain
    UnknownStatement,
    /// No leaf of the tree executes the instance
    Unscheduled,
}

/// Result type using SchedOptError.
pub type SchedResult<T> = Result<T, SchedOptError>;

/// Result type of a single transformation.
pub type TransformResult<T> = Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransformError::new(
            "member 3 out of range for band with 2 members",
            TransformErrorKind::DimensionOutOfRange,
            "band_split",
        );
        let s = format!("{}", err);
        assert!(s.contains("out of range"));
        assert!(s.ends_with("in band_split"));
    }

    #[test]
    fn test_conversion() {
        let err: SchedOptError = EvaluationError::new(
            "domain is unbounded along dimension 0",
            EvaluationErrorKind::UnboundedDomain,
        ).into();
        assert!(matches!(err, SchedOptError::Evaluation(_)));
        assert!(err.to_string().starts_with("Evaluation error"));
    }
}
