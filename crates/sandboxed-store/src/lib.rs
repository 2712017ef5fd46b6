//! # Sandboxed Store
//!
//! A flat-file store confined to one base directory. Every name handed to the store is a
//! single path component; anything that could resolve outside the base directory is rejected
//! before the filesystem is touched.
//!
//! Writes are staged: bytes land in a hidden `.partial/` directory first and only become
//! visible under their final name when the [`StagedFile`] is committed (a rename on the same
//! filesystem). A staged file that is dropped without being committed is removed.
//!
//! ```rust
//! use sandboxed_store::SandboxedStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SandboxedStore::builder()
//!     .base_directory("/var/cache/pecs/pictograms")
//!     .build()
//!     .await?;
//!
//! let staged = store.stage("2349.png", b"\x89PNG...").await?;
//! let written = staged.read_back().await?;
//! assert_eq!(written, b"\x89PNG...");
//! staged.commit().await?;
//!
//! let bytes = store.read("2349.png").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file_types;
pub mod security;
pub mod store;

pub use error::{Result, StoreError};
pub use file_types::{FileTypeInfo, ImageSniffer};
pub use store::{SandboxedStore, SandboxedStoreBuilder, StagedFile, PARTIAL_DIR};
