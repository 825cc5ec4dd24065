//! Common error types for JAMR

use thiserror::Error;

/// Common result type for JAMR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across JAMR services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Nickname collision or optimistic version mismatch
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid user input or request parameter (validator output)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors the caller caused and may correct (not found, conflict, bad input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Conflict(_) | Error::InvalidInput(_)
        )
    }
}

/// True when a sqlx error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
