use sandboxed_store::SandboxedStore;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{CacheError, CacheResult};
use crate::models::PictogramId;

use super::normalize::{normalize_term, primary_subtag};

/// Answers from the remote search endpoint, remembered across runs.
///
/// Keys are `"<locale>:<normalized term>"`. The file is rewritten atomically on every change.
pub struct LearnedTerms {
    store: Option<SandboxedStore>,
    terms: RwLock<BTreeMap<String, Vec<PictogramId>>>,
}

impl LearnedTerms {
    pub const FILE_NAME: &'static str = "search_cache.json";

    /// Learned terms that are never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: None,
            terms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load learned terms from `store`. An unreadable file starts an empty set.
    pub async fn load(store: SandboxedStore) -> Self {
        let terms = match store.read(Self::FILE_NAME).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, Vec<PictogramId>>>(&bytes)
            {
                Ok(terms) => terms,
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", Self::FILE_NAME, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.is_not_found() => BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", Self::FILE_NAME, e);
                BTreeMap::new()
            }
        };

        debug!("Loaded {} learned search term(s)", terms.len());
        Self {
            store: Some(store),
            terms: RwLock::new(terms),
        }
    }

    fn key(term: &str, locale: &str) -> String {
        format!("{}:{}", primary_subtag(locale), normalize_term(term, locale))
    }

    pub async fn get(&self, term: &str, locale: &str) -> Option<Vec<PictogramId>> {
        self.terms.read().await.get(&Self::key(term, locale)).cloned()
    }

    /// Remember `ids` for `term` and persist the whole set.
    pub async fn remember(
        &self,
        term: &str,
        locale: &str,
        ids: Vec<PictogramId>,
    ) -> CacheResult<()> {
        let key = Self::key(term, locale);
        let mut terms = self.terms.write().await;
        terms.insert(key, ids);

        if let Some(store) = &self.store {
            let encoded = serde_json::to_vec_pretty(&*terms)
                .map_err(|e| CacheError::metadata(Self::FILE_NAME, e.to_string()))?;
            store.write_atomic(Self::FILE_NAME, &encoded).await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.terms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.terms.read().await.is_empty()
    }
}
