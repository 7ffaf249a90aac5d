//! Error types for vokabel-core

use thiserror::Error;

/// Result type alias using vokabel-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vokabel-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry not found
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage refused a write because it is full
    #[error("Storage capacity exceeded: {0}")]
    CapacityExceeded(String),
}

impl Error {
    /// Whether this error signals storage capacity exhaustion.
    pub const fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded(_))
    }
}
