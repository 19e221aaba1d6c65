//! Common error types for simannotator

use thiserror::Error;

/// Common result type for simannotator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across simannotator crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Submitted reference annotation id does not exist
    #[error("Reference annotation not found: {0}")]
    Reference(i64),

    /// Tier/sound ownership mismatch or a cyclic tier relation
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed submitted record
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
