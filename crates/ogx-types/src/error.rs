use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id {value:?}: {reason}")]
    InvalidObjectId { value: String, reason: String },

    #[error("invalid type tag {value:?}: {reason}")]
    InvalidTypeTag { value: String, reason: String },

    #[error("invalid {kind} scalar: {value:?}")]
    InvalidScalar { kind: String, value: String },

    #[error("invalid format version: {0:?}")]
    InvalidVersion(String),
}
