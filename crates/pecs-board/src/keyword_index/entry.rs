use serde::Deserialize;

use crate::models::PictogramId;

/// Dataset format version understood by this build.
pub const DATASET_VERSION: u32 = 1;

/// On-disk dataset document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DatasetDocument {
    pub version: u32,
    pub entry_count: usize,
    pub entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawEntry {
    pub term: String,
    pub pictogram_id: String,
    pub locale: String,
}

/// One validated index entry. `term` is normalized and `locale` is a primary subtag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    pub term: String,
    pub pictogram_id: PictogramId,
    pub locale: String,
}
