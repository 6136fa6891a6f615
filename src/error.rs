//! Error types for the JSON store.

use crate::types::MigrationId;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Exceeded transaction retries limit ({0})")]
    RetriesExceeded(u32),

    #[error("Migration {id} - '{title}' must produce a JSON object")]
    InvalidMigrationOutput { id: MigrationId, title: String },

    #[error("{0} is not available on an async-only store")]
    AsyncOnly(&'static str),

    #[error("Middleware '{name}' failed: {message}")]
    Middleware { name: String, message: String },
}

impl StoreError {
    /// Build an error for a failing hook.
    pub fn middleware(name: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Middleware {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
