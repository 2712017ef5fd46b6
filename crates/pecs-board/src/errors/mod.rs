//! Centralized error handling for the pecs-board application
//!
//! Each layer owns a `thiserror` enum; [`AppError`] wraps them at the top level.
//!
//! # Error Categories
//!
//! - **Dataset Errors**: the bundled keyword dataset could not be parsed or validated
//! - **Fetch Errors**: remote pictogram retrieval failed (timeout, HTTP status, content)
//! - **Cache Errors**: the local pictogram cache could not read, write or verify an asset
//! - **Export / Speech / Configuration**: outer surfaces of the board
//!
//! None of the core errors are fatal: a corrupt dataset degrades search to empty results,
//! a failed fetch degrades to a placeholder, and a cache I/O error is reported as a notice.
//!
//! # Usage
//!
//! ```rust
//! use pecs_board::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for keyword dataset Results
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Convenience type alias for pictogram fetch Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for asset cache Results
pub type CacheResult<T> = Result<T, CacheError>;
