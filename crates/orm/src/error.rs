//! Error types for the ORM
//!
//! `ModelError` is what every public operation returns. The narrower
//! `QueryError` and `PoolError` convert into it at the module boundary.

use std::fmt;

use crate::identity::RecordId;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Storage engine failure
    Database(String),
    /// Lookup by something other than a record id found nothing
    NotFound(String),
    /// No record exists at this id
    RecordNotFound(RecordId),
    /// Model validation failed
    Validation(String),
    /// Operation needs a persistent record id and the model has none
    MissingIdentity,
    /// Serialization/deserialization error
    Serialization(String),
    /// Handle acquisition error
    Connection(String),
    /// Transaction error
    Transaction(String),
    /// Query parsing, binding or execution error
    Query(String),
    /// Configuration error
    Configuration(String),
    /// Malformed record id
    InvalidKey(String),
    /// The record changed since the caller read it
    ConcurrentModification {
        rid: RecordId,
        expected: i32,
        actual: i32,
    },
    /// Operation attempted on a closed database handle
    DatabaseClosed,
}

impl ModelError {
    /// True for both not-found kinds
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_) | ModelError::RecordNotFound(_))
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Database(msg) => write!(f, "Database error: {}", msg),
            ModelError::NotFound(what) => write!(f, "Not found: {}", what),
            ModelError::RecordNotFound(rid) => write!(f, "Record {} not found", rid),
            ModelError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ModelError::MissingIdentity => write!(f, "Model has no persistent record id"),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ModelError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            ModelError::Query(msg) => write!(f, "Query error: {}", msg),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::InvalidKey(msg) => write!(f, "Invalid key error: {}", msg),
            ModelError::ConcurrentModification { rid, expected, actual } => write!(
                f,
                "Record {} was modified concurrently: expected version {}, found {}",
                rid, expected, actual
            ),
            ModelError::DatabaseClosed => write!(f, "Database handle is closed"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<orient_core::ConfigError> for ModelError {
    fn from(err: orient_core::ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

/// Errors raised while lexing, parsing or binding OSQL
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("missing value for parameter {0}")]
    MissingParameter(String),

    #[error("{supplied} positional parameters supplied but the query uses {used}")]
    UnusedParameters { supplied: usize, used: usize },

    #[error("invalid value for {clause}: {value}")]
    InvalidClauseValue { clause: &'static str, value: String },
}

impl From<QueryError> for ModelError {
    fn from(err: QueryError) -> Self {
        ModelError::Query(err.to_string())
    }
}

/// Handle acquisition errors raised by the database factory
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Factory is closed")]
    FactoryClosed,

    #[error("Handle limit reached: all {max_handles} handles in use")]
    PoolExhausted { max_handles: u32 },

    #[error("No default database factory installed")]
    NoDefaultFactory,

    #[error("Default database factory already installed")]
    AlreadyInstalled,
}

impl From<PoolError> for ModelError {
    fn from(err: PoolError) -> Self {
        ModelError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert!(ModelError::RecordNotFound(RecordId::new(9, 0)).is_not_found());
        assert!(ModelError::NotFound("Person".into()).is_not_found());
        assert!(!ModelError::DatabaseClosed.is_not_found());
    }

    #[test]
    fn test_display() {
        let err = ModelError::ConcurrentModification {
            rid: RecordId::new(10, 4),
            expected: 2,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Record #10:4 was modified concurrently: expected version 2, found 3"
        );
        assert_eq!(
            ModelError::RecordNotFound(RecordId::new(9, 1)).to_string(),
            "Record #9:1 not found"
        );
    }

    #[test]
    fn test_conversions() {
        let err: ModelError = QueryError::MissingParameter(":name".into()).into();
        assert!(matches!(err, ModelError::Query(msg) if msg.contains(":name")));

        let err: ModelError = PoolError::PoolExhausted { max_handles: 2 }.into();
        assert!(matches!(err, ModelError::Connection(_)));
    }
}
