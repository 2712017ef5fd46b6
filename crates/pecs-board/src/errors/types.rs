//! Error type definitions for the pecs-board application

use sandboxed_store::StoreError;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Keyword dataset errors
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Pictogram fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Asset cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Board export errors
    #[error("Export error: {message}")]
    Export { message: String },

    /// Text-to-speech errors
    #[error("Speech error: {message}")]
    Speech { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// File system errors outside the cache
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The bundled keyword dataset is unusable (`DatasetCorrupt`)
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The dataset file could not be read
    #[error("Failed to read dataset {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    /// No dataset was bundled and none was configured
    #[error("No keyword dataset available")]
    Missing,

    /// JSON did not match the dataset schema
    #[error("Malformed dataset: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Unknown dataset format version
    #[error("Unsupported dataset version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Declared entry count differs from the entries present
    #[error("Dataset declares {declared} entries but contains {actual}")]
    CountMismatch { declared: usize, actual: usize },

    /// An entry carries an identifier that cannot be a pictogram id
    #[error("Entry {index}: invalid pictogram id '{id}'")]
    InvalidId { index: usize, id: String },

    /// An entry has an empty term or locale
    #[error("Entry {index}: empty {field}")]
    EmptyField { index: usize, field: &'static str },

    /// Two entries normalize to the same (term, locale) pair
    #[error("Entry {index}: duplicate term '{term}' for locale '{locale}'")]
    DuplicateTerm {
        index: usize,
        term: String,
        locale: String,
    },
}

/// Remote pictogram retrieval failed (`FetchFailed`)
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Connection-level failure
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The response body is not an acceptable image
    #[error("Invalid content for pictogram {id}: {message}")]
    InvalidContent { id: String, message: String },

    /// Network access is disabled
    #[error("Offline: pictogram {id} is not cached")]
    Offline { id: String },
}

/// Local pictogram cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bytes read back after staging differ from the bytes that were fetched
    #[error("Checksum mismatch for {id}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// File system failure (`CacheIOError`)
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandboxed store failure (path validation, staging, permissions)
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    /// Sidecar metadata could not be encoded or decoded
    #[error("Cache metadata error for {id}: {message}")]
    Metadata { id: String, message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an export error
    pub fn export<S: Into<String>>(message: S) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create a speech error
    pub fn speech<S: Into<String>>(message: S) -> Self {
        Self::Speech {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl FetchError {
    /// Classify a `reqwest` failure for `url`.
    pub fn from_reqwest(url: &str, timeout_secs: u64, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                seconds: timeout_secs,
            }
        } else if let Some(status) = error.status() {
            Self::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub fn invalid_content<I: Into<String>, M: Into<String>>(id: I, message: M) -> Self {
        Self::InvalidContent {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl CacheError {
    pub fn metadata<I: Into<String>, M: Into<String>>(id: I, message: M) -> Self {
        Self::Metadata {
            id: id.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_into_app_error() {
        let err: AppError = DatasetError::CountMismatch {
            declared: 3,
            actual: 2,
        }
        .into();
        assert!(matches!(err, AppError::Dataset(_)));
        assert_eq!(
            err.to_string(),
            "Dataset error: Dataset declares 3 entries but contains 2"
        );

        let err: AppError = FetchError::Offline { id: "P001".into() }.into();
        assert!(err.to_string().contains("P001"));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(
            AppError::configuration("bad"),
            AppError::Configuration { .. }
        ));
        assert!(matches!(AppError::export("bad"), AppError::Export { .. }));
        assert!(matches!(
            FetchError::invalid_content("P1", "html"),
            FetchError::InvalidContent { .. }
        ));
    }
}
