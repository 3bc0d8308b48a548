//! Error types for sr08-store.

use std::path::PathBuf;

/// Result type for sr08-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sr08-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored row holds a value the current code cannot interpret.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
