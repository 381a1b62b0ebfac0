//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// An identifier failed validation (empty, whitespace, ...)
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

impl EnvError {
    /// Creates an invalid-identifier error.
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
