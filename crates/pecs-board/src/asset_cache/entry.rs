use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::SystemTime;

use super::metadata::CachedPictogramMetadata;
use crate::models::PictogramId;

/// Image bytes on their way into the cache, already sniffed.
#[derive(Debug, Clone)]
pub struct IncomingAsset {
    pub bytes: Bytes,
    pub mime_type: String,
    /// Extension used for the cached file name
    pub extension: String,
    pub source_url: Option<String>,
}

/// Size and modification time of a cached file when it was last verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    pub(crate) fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// In-memory state of one cached pictogram.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub file_name: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub source_url: Option<String>,
    pub cached_at: DateTime<Utc>,
    /// `None` until the file has been hashed since load
    pub verified: Option<Fingerprint>,
}

impl CacheEntry {
    pub(crate) fn from_metadata(metadata: CachedPictogramMetadata) -> Self {
        Self {
            file_name: metadata.file_name,
            checksum: metadata.checksum,
            size_bytes: metadata.size_bytes,
            mime_type: metadata.mime_type,
            source_url: metadata.source_url,
            cached_at: metadata.cached_at,
            verified: None,
        }
    }

    pub(crate) fn to_metadata(
        &self,
        id: &PictogramId,
        last_accessed: DateTime<Utc>,
    ) -> CachedPictogramMetadata {
        CachedPictogramMetadata {
            pictogram_id: id.clone(),
            file_name: self.file_name.clone(),
            checksum: self.checksum.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
            source_url: self.source_url.clone(),
            cached_at: self.cached_at,
            last_accessed,
        }
    }
}

/// Recency bookkeeping for one entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Access {
    pub last_accessed: DateTime<Utc>,
    /// `last_accessed` has changed since the sidecar was written
    pub dirty: bool,
}
