use rust_embed::RustEmbed;
use std::{borrow::Cow, path::PathBuf};

use crate::config::DatasetConfig;
use crate::errors::{DatasetError, DatasetResult};

/// File name of the bundled keyword dataset.
pub const DATASET_FILE: &str = "dataset.json";

/// Embedded keyword dataset
#[derive(RustEmbed)]
#[folder = "data/"]
pub struct BundledData;

/// Where the keyword dataset is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// The copy compiled into the binary
    Bundled,
    /// A dataset file on disk
    File(PathBuf),
}

impl DatasetSource {
    #[must_use]
    pub fn from_config(config: &DatasetConfig) -> Self {
        match &config.path {
            Some(path) => Self::File(path.clone()),
            None => Self::Bundled,
        }
    }

    /// Read the raw dataset bytes.
    pub fn load_bytes(&self) -> DatasetResult<Cow<'static, [u8]>> {
        match self {
            Self::Bundled => BundledData::get(DATASET_FILE)
                .map(|file| file.data)
                .ok_or(DatasetError::Missing),
            Self::File(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| DatasetError::Unreadable {
                    path: path.display().to_string(),
                    source,
                }),
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Bundled => format!("bundled {DATASET_FILE}"),
            Self::File(path) => path.display().to_string(),
        }
    }
}
