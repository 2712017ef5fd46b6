//! Network retrieval of pictograms that are not cached yet.
//!
//! [`FetchCoordinator`] sits between callers and a [`PictogramSource`]: it answers from the
//! cache when it can, deduplicates concurrent requests for the same id, bounds the number of
//! network fetches, and degrades to a [`Placeholder`](crate::models::Placeholder) when the
//! network or the cache lets it down.

pub mod client;
pub mod coordinator;
pub mod placeholder;

pub use client::{ArasaacClient, FetchedPictogram, OfflineSource, PictogramSource};
pub use coordinator::{CacheNotice, FetchCoordinator, FetchHandle};
pub use placeholder::PlaceholderCatalog;

use std::sync::Arc;

use crate::config::FetchConfig;
use crate::errors::AppResult;

/// The source selected by `fetch.offline`.
pub fn source_from_config(config: &FetchConfig) -> AppResult<Arc<dyn PictogramSource>> {
    if config.offline {
        Ok(Arc::new(OfflineSource))
    } else {
        Ok(Arc::new(ArasaacClient::new(config)?))
    }
}
