//! Error types for the sandboxed store.

use std::path::PathBuf;

/// Result type for sandboxed store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during sandboxed store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Name or path validation failed
    #[error("Path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// File not found
    #[error("File not found: {name}")]
    FileNotFound { name: String },

    /// Content is not one of the accepted types
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// Directory creation failed
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions error
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl StoreError {
    /// True when the underlying cause is a missing file.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
