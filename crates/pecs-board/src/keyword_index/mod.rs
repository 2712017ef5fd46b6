//! Offline keyword → pictogram index.
//!
//! The index is built once at startup from the keyword dataset and never changes afterwards.
//! A dataset that fails validation does not stop the application: [`load_or_empty`] logs the
//! problem and hands back an empty index, so search degrades to empty results.

pub mod entry;
pub mod index;
pub mod learned;
pub mod normalize;

pub use entry::{DATASET_VERSION, KeywordEntry};
pub use index::KeywordIndex;
pub use learned::LearnedTerms;
pub use normalize::{normalize_term, primary_subtag};

use tracing::{info, warn};

use crate::dataset::DatasetSource;

/// Build the index from `source`, falling back to an empty index if the dataset is unusable.
pub fn load_or_empty(source: &DatasetSource) -> KeywordIndex {
    let built = source
        .load_bytes()
        .and_then(|bytes| KeywordIndex::build(&bytes));

    match built {
        Ok(index) => {
            info!(
                "Loaded keyword index from {}: {} entries in {} locale(s)",
                source.describe(),
                index.len(),
                index.locales().len()
            );
            index
        }
        Err(e) => {
            warn!(
                "Keyword dataset {} is unusable, offline search disabled: {}",
                source.describe(),
                e
            );
            KeywordIndex::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_bundled_dataset_builds() {
        let index = load_or_empty(&DatasetSource::Bundled);
        assert!(!index.is_empty());
        assert!(index.locales().contains(&"sv"));
        assert!(index.locales().contains(&"en"));
        assert!(!index.lookup("mjölk", "sv").is_empty());
    }

    #[traced_test]
    #[test]
    fn test_corrupt_dataset_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"version":1,"entry_count":5,"entries":[{"term":"mjölk","pictogram_id":"P001","locale":"sv"}]}"#,
        )
        .unwrap();

        let index = load_or_empty(&DatasetSource::File(path));
        assert!(index.is_empty());
        assert!(index.lookup("mjölk", "sv").is_empty());
        assert!(logs_contain("offline search disabled"));
    }

    #[test]
    fn test_missing_dataset_file_degrades_to_empty() {
        let index = load_or_empty(&DatasetSource::File("/nonexistent/dataset.json".into()));
        assert!(index.is_empty());
    }
}
