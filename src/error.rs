// Error types for the remote table and the cache

use thiserror::Error;

/// Failures reported by a remote table backend
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Unique constraint violated by the write
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No matching row")]
    NotFound,

    #[error("Invalid table or field name: {0}")]
    InvalidName(String),
}

/// Errors surfaced by `BuyerCache` operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote read failed: {0}")]
    RemoteRead(#[source] RemoteError),

    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    #[error("Remote write failed: {0}")]
    RemoteWrite(#[source] RemoteError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
