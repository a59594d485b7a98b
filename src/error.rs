//! Error types for the NOISeq engine.

use thiserror::Error;

/// Errors raised by any stage of the differential-expression pipeline.
#[derive(Error, Debug)]
pub enum NoiseqError {
    #[error("{operation} requires feature annotation that is missing for feature '{feature}'")]
    MissingAnnotation { operation: String, feature: String },

    #[error("Cannot normalize sample '{sample}': {reason}")]
    DegenerateNormalization { sample: String, reason: String },

    #[error("Condition '{condition}' has {found} sample(s), at least {required} required")]
    InsufficientReplicates {
        condition: String,
        found: usize,
        required: usize,
    },

    #[error("Factor '{factor}' must resolve to exactly two levels, found {levels}")]
    InvalidFactorCardinality { factor: String, levels: usize },

    #[error("Mixture density fit failed: {0}")]
    DegenerateMixtureFit(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate {kind} identifier '{id}'")]
    DuplicateIdentifier { kind: String, id: String },

    #[error("Unknown factor '{0}'")]
    UnknownFactor(String),

    #[error("Factor '{factor}' has no level '{level}'")]
    UnknownLevel { factor: String, level: String },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error(transparent)]
    Numerical(#[from] anyhow::Error),
}

impl NoiseqError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        NoiseqError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, NoiseqError>;
