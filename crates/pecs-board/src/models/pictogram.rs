use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};
use strum::{Display, EnumString};
use thiserror::Error;

/// Longest accepted pictogram identifier.
pub const MAX_ID_LEN: usize = 64;

/// Glyph shown for pictograms without a known board card.
pub const GENERIC_PLACEHOLDER_GLYPH: &str = "🖼️";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pictogram id '{id}': {reason}")]
pub struct InvalidPictogramId {
    pub id: String,
    pub reason: &'static str,
}

/// Validated pictogram identifier.
///
/// Non-empty, at most 64 characters, ASCII letters, digits, `-` and `_` only. Identifiers
/// become cache file names, so anything else is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PictogramId(String);

impl PictogramId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidPictogramId> {
        let id = id.into();
        let reject = |reason| InvalidPictogramId {
            id: id.clone(),
            reason,
        };

        if id.is_empty() {
            return Err(reject("empty"));
        }
        if id.len() > MAX_ID_LEN {
            return Err(reject("longer than 64 characters"));
        }
        if !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(reject("only ASCII letters, digits, '-' and '_' are allowed"));
        }

        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PictogramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PictogramId {
    type Err = InvalidPictogramId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PictogramId {
    type Error = InvalidPictogramId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PictogramId> for String {
    fn from(id: PictogramId) -> Self {
        id.0
    }
}

impl AsRef<str> for PictogramId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchState {
    Unfetched,
    Fetching,
    Cached,
    Failed,
}

/// Offline stand-in for a pictogram that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub glyph: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Placeholder {
    pub fn new(glyph: impl Into<String>, label: Option<String>) -> Self {
        Self {
            glyph: glyph.into(),
            label,
        }
    }

    #[must_use]
    pub fn generic() -> Self {
        Self::new(GENERIC_PLACEHOLDER_GLYPH, None)
    }
}

/// A pictogram as seen by callers: where it is on disk, if anywhere, and how it got there.
///
/// Only the state-specific constructors create assets, so `local_path` is present exactly
/// when the state is `Cached` and `placeholder` exactly when it is `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictogramAsset {
    id: PictogramId,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    size_bytes: u64,
    fetch_state: FetchState,
    #[serde(skip_serializing_if = "Option::is_none")]
    placeholder: Option<Placeholder>,
}

impl PictogramAsset {
    #[must_use]
    pub fn unfetched(id: PictogramId) -> Self {
        Self::bare(id, FetchState::Unfetched)
    }

    #[must_use]
    pub fn cached(id: PictogramId, local_path: PathBuf, checksum: String, size_bytes: u64) -> Self {
        Self {
            id,
            local_path: Some(local_path),
            checksum: Some(checksum),
            size_bytes,
            fetch_state: FetchState::Cached,
            placeholder: None,
        }
    }

    #[must_use]
    pub fn failed(id: PictogramId, placeholder: Placeholder) -> Self {
        Self {
            placeholder: Some(placeholder),
            ..Self::bare(id, FetchState::Failed)
        }
    }

    fn bare(id: PictogramId, fetch_state: FetchState) -> Self {
        Self {
            id,
            local_path: None,
            checksum: None,
            size_bytes: 0,
            fetch_state,
            placeholder: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PictogramId {
        &self.id
    }

    #[must_use]
    pub fn local_path(&self) -> Option<&PathBuf> {
        self.local_path.as_ref()
    }

    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[must_use]
    pub fn fetch_state(&self) -> FetchState {
        self.fetch_state
    }

    #[must_use]
    pub fn placeholder(&self) -> Option<&Placeholder> {
        self.placeholder.as_ref()
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.fetch_state == FetchState::Cached
    }
}
