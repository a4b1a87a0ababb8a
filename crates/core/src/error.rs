//! Core error types.

use thiserror::Error;

/// Errors produced by core domain parsing and validation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("invalid upload variant: {0}")]
    InvalidVariant(String),

    #[error("invalid session status: {0}")]
    InvalidStatus(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
