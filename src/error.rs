//! Error types for the bookshell crate.

use thiserror::Error;

/// Errors surfaced by the Drive client, the library cache and the reader.
#[derive(Error, Debug)]
pub enum BookshellError {
    /// Bad or expired credentials. The user has to reconfigure.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure. Not retried.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unsupported or corrupt book content: {0}")]
    FormatError(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("'{query}' matches {count} books, use the book ID instead")]
    Ambiguous { query: String, count: usize },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("Library cache {path} is unreadable: {reason}")]
    CacheError { path: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl BookshellError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BookshellError::NotFound(_))
    }
}

/// Result type alias for BookshellError.
pub type Result<T> = std::result::Result<T, BookshellError>;
