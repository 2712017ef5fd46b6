//! Sidecar metadata stored next to cached pictograms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PictogramId;

/// Metadata stored in `<id>.json` next to `<id>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPictogramMetadata {
    pub pictogram_id: PictogramId,
    /// Name of the image file inside the cache directory
    pub file_name: String,
    /// SHA-256 of the image bytes, lowercase hex
    pub checksum: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// URL the image was downloaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// When this pictogram was first cached
    pub cached_at: DateTime<Utc>,
    /// Last time the pictogram was served from the cache
    pub last_accessed: DateTime<Utc>,
}

impl CachedPictogramMetadata {
    /// Sidecar file name for `id`.
    #[must_use]
    pub fn file_name_for(id: &PictogramId) -> String {
        format!("{id}.json")
    }

    /// Whether this sidecar describes the image file `file_name`.
    #[must_use]
    pub fn describes(&self, file_name: &str) -> bool {
        self.file_name == file_name
            && file_name
                .strip_prefix(self.pictogram_id.as_str())
                .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: &str, file_name: &str) -> CachedPictogramMetadata {
        let now = Utc::now();
        CachedPictogramMetadata {
            pictogram_id: PictogramId::new(id).unwrap(),
            file_name: file_name.to_string(),
            checksum: "00".repeat(32),
            size_bytes: 10,
            mime_type: "image/png".to_string(),
            source_url: None,
            cached_at: now,
            last_accessed: now,
        }
    }

    #[test]
    fn test_describes_matching_file_only() {
        let meta = metadata("2349", "2349.png");
        assert!(meta.describes("2349.png"));
        assert!(!meta.describes("2349.svg"));
        assert!(!metadata("2349", "23490.png").describes("23490.png"));
        assert!(!metadata("2349", "2349.").describes("2349."));
    }

    #[test]
    fn test_sidecar_json_shape() {
        let json = serde_json::to_value(metadata("P001", "P001.png")).unwrap();
        for field in [
            "pictogram_id",
            "file_name",
            "checksum",
            "size_bytes",
            "mime_type",
            "cached_at",
            "last_accessed",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(
            CachedPictogramMetadata::file_name_for(&PictogramId::new("P001").unwrap()),
            "P001.json"
        );
    }
}
