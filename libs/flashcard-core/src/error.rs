//! Error types for flashcard-core.

use thiserror::Error;

/// Result type alias using ValidationError.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A record or configuration that cannot be persisted or synced as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{entity} {id}: missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        id: String,
        field: &'static str,
    },

    #[error("{entity} {id}: invalid `{field}`: {reason}")]
    InvalidValue {
        entity: &'static str,
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    /// Id of the offending record, if the error is about a record.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Self::MissingField { id, .. } | Self::InvalidValue { id, .. } => Some(id),
            Self::InvalidConfig(_) => None,
        }
    }
}
