//! Error types for waypoint-core

use thiserror::Error;

/// Result type alias using waypoint-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waypoint-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(String),
}
