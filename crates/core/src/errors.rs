use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::PairKey;

/// Rejections raised while ingesting transaction records.
///
/// `line` is the 1-based data line (header excluded) of the offending record.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("line {line}: missing required field `{field}`")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: quantity must be non-negative, got `{value}`")]
    NegativeQuantity { line: usize, value: String },
    #[error("line {line}: unit price must be non-negative, got `{value}`")]
    NegativePrice { line: usize, value: String },
    #[error("line {line}: unit price `{value}` exceeds the maximum of {max}")]
    PriceOutOfRange { line: usize, value: String, max: Decimal },
    #[error("line {line}: could not parse `{field}` from `{value}`")]
    InvalidValue { line: usize, field: &'static str, value: String },
    #[error("could not read transaction snapshot: {0}")]
    Read(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("window must be a strictly positive number of days, got {window_days}")]
    InvalidWindow { window_days: i64 },
    #[error("unsupported prediction horizon of {window_days} days (expected 7 or 14)")]
    UnsupportedHorizon { window_days: i64 },
    #[error("label key {0} has no matching feature vector")]
    JoinMismatch(PairKey),
    #[error("feature set contains key {0} more than once")]
    DuplicateFeatureKey(PairKey),
    #[error("expected {expected} predictions for the candidate set, got {actual}")]
    PredictionLengthMismatch { expected: usize, actual: usize },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("feature schema mismatch: model expects `{expected}`, input has `{actual}`")]
    SchemaMismatch { expected: String, actual: String },
    #[error("model `{0}` has not been fitted")]
    NotFitted(&'static str),
    #[error("cannot fit on an empty training set: {0}")]
    EmptyTrainingSet(String),
    #[error("expected {expected} target values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("model persistence failure: {0}")]
    Persistence(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable, machine-readable class used by the operator surface.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "pipeline",
            Self::Schema(_) => "ingestion",
            Self::Model(ModelError::Persistence(_)) | Self::Persistence(_) => "persistence",
            Self::Model(_) => "model",
            Self::Configuration(_) => "config_validation",
        }
    }
}
