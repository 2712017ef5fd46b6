use std::collections::{HashMap, HashSet};

use crate::errors::{DatasetError, DatasetResult};
use crate::models::PictogramId;

use super::entry::{DATASET_VERSION, DatasetDocument, KeywordEntry};
use super::normalize::{normalize_term, primary_subtag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    Exact,
    Prefix,
    Substring,
}

/// In-memory keyword → pictogram index, immutable once built.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    entries: Vec<KeywordEntry>,
    /// Entry positions per locale, in dataset order.
    by_locale: HashMap<String, Vec<usize>>,
}

impl KeywordIndex {
    /// An index with no entries; every lookup returns nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and validate a dataset document.
    pub fn build(dataset: &[u8]) -> DatasetResult<Self> {
        let document: DatasetDocument = serde_json::from_slice(dataset)?;

        if document.version != DATASET_VERSION {
            return Err(DatasetError::UnsupportedVersion {
                found: document.version,
                expected: DATASET_VERSION,
            });
        }
        if document.entry_count != document.entries.len() {
            return Err(DatasetError::CountMismatch {
                declared: document.entry_count,
                actual: document.entries.len(),
            });
        }

        let mut entries = Vec::with_capacity(document.entries.len());
        let mut by_locale: HashMap<String, Vec<usize>> = HashMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::with_capacity(document.entries.len());

        for (index, raw) in document.entries.into_iter().enumerate() {
            let locale = primary_subtag(&raw.locale);
            if locale.is_empty() {
                return Err(DatasetError::EmptyField {
                    index,
                    field: "locale",
                });
            }

            let term = normalize_term(&raw.term, &locale);
            if term.is_empty() {
                return Err(DatasetError::EmptyField {
                    index,
                    field: "term",
                });
            }

            let pictogram_id =
                PictogramId::new(raw.pictogram_id).map_err(|e| DatasetError::InvalidId {
                    index,
                    id: e.id,
                })?;

            if !seen.insert((term.clone(), locale.clone())) {
                return Err(DatasetError::DuplicateTerm {
                    index,
                    term,
                    locale,
                });
            }

            by_locale.entry(locale.clone()).or_default().push(entries.len());
            entries.push(KeywordEntry {
                term,
                pictogram_id,
                locale,
            });
        }

        tracing::debug!(
            entries = entries.len(),
            locales = by_locale.len(),
            "Keyword index built"
        );

        Ok(Self { entries, by_locale })
    }

    /// Candidate pictograms for `query` in `locale`.
    ///
    /// Exact matches rank before prefix matches, which rank before substring matches; equal
    /// ranks keep dataset order. Each id appears once, at its best rank.
    #[must_use]
    pub fn lookup(&self, query: &str, locale: &str) -> Vec<PictogramId> {
        let query = normalize_term(query, locale);
        if query.is_empty() {
            return Vec::new();
        }
        let Some(positions) = self.by_locale.get(&primary_subtag(locale)) else {
            return Vec::new();
        };

        let mut ranked: Vec<(MatchRank, usize)> = positions
            .iter()
            .filter_map(|&pos| {
                let term = &self.entries[pos].term;
                let rank = if *term == query {
                    MatchRank::Exact
                } else if term.starts_with(&query) {
                    MatchRank::Prefix
                } else if term.contains(&query) {
                    MatchRank::Substring
                } else {
                    return None;
                };
                Some((rank, pos))
            })
            .collect();
        ranked.sort_unstable();

        let mut seen = HashSet::new();
        ranked
            .into_iter()
            .map(|(_, pos)| &self.entries[pos].pictogram_id)
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    /// The pictogram whose term equals `term` exactly, if any.
    #[must_use]
    pub fn exact(&self, term: &str, locale: &str) -> Option<&PictogramId> {
        let term = normalize_term(term, locale);
        self.by_locale
            .get(&primary_subtag(locale))?
            .iter()
            .map(|&pos| &self.entries[pos])
            .find(|entry| entry.term == term)
            .map(|entry| &entry.pictogram_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locales present in the index, sorted.
    #[must_use]
    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.by_locale.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    pub fn entries(&self) -> impl Iterator<Item = &KeywordEntry> {
        self.entries.iter()
    }
}
