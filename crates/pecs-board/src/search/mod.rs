//! Single query entry point over the keyword index, the asset cache and the fetch coordinator.
//!
//! A query is answered from the offline index, its candidates are looked up in the cache, and
//! a bounded number of misses is fetched with limited parallelism. Starting a new query
//! supersedes the previous one: it starts no further fetches and its caller gets
//! [`SearchOutcome::Superseded`]. Fetches that already started still complete and populate the
//! cache.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::fetch::FetchCoordinator;
use crate::keyword_index::{KeywordIndex, LearnedTerms};
use crate::models::{PictogramAsset, PictogramId, Placeholder};

/// One search result, in index ranking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchHit {
    /// The pictogram is cached and can be shown
    Asset(PictogramAsset),
    /// The pictogram failed to fetch or was not fetched for this query
    Placeholder {
        asset: PictogramAsset,
        placeholder: Placeholder,
    },
}

impl SearchHit {
    #[must_use]
    pub fn asset(&self) -> &PictogramAsset {
        match self {
            Self::Asset(asset) | Self::Placeholder { asset, .. } => asset,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PictogramId {
        self.asset().id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(Vec<SearchHit>),
    /// A newer query started before this one finished
    Superseded,
}

impl SearchOutcome {
    /// The hits, or `None` if the query was superseded.
    #[must_use]
    pub fn into_hits(self) -> Option<Vec<SearchHit>> {
        match self {
            Self::Results(hits) => Some(hits),
            Self::Superseded => None,
        }
    }
}

pub struct SearchFacade {
    index: Arc<KeywordIndex>,
    coordinator: FetchCoordinator,
    learned: Arc<LearnedTerms>,
    config: SearchConfig,
    current_token: StdMutex<Option<CancellationToken>>,
}

impl SearchFacade {
    pub fn new(
        index: Arc<KeywordIndex>,
        coordinator: FetchCoordinator,
        learned: Arc<LearnedTerms>,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            coordinator,
            learned,
            config,
            current_token: StdMutex::new(None),
        }
    }

    #[must_use]
    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    /// Search for `query` in `locale`. An empty locale means `search.default_locale`.
    ///
    /// Zero matches is an empty result, never an error.
    pub async fn search(&self, query: &str, locale: &str) -> SearchOutcome {
        let token = self.begin_query();
        let locale = if locale.trim().is_empty() {
            self.config.default_locale.as_str()
        } else {
            locale
        };

        let mut ids = self.index.lookup(query, locale);
        if ids.is_empty() && self.config.remote_fallback && !query.trim().is_empty() {
            ids = self.remote_candidates(query, locale).await;
        }
        ids.truncate(self.config.max_results);
        debug!(query, locale, candidates = ids.len(), "Search candidates");

        if token.is_cancelled() {
            return SearchOutcome::Superseded;
        }

        let cache = self.coordinator.cache();
        let mut hits: Vec<Option<SearchHit>> = Vec::with_capacity(ids.len());
        let mut misses: Vec<(usize, PictogramId)> = Vec::new();
        for (position, id) in ids.into_iter().enumerate() {
            match cache.get(&id).await {
                Ok(asset) if asset.is_cached() => hits.push(Some(SearchHit::Asset(asset))),
                Ok(_) => {
                    hits.push(None);
                    misses.push((position, id));
                }
                Err(e) => {
                    debug!(%id, "Cache lookup failed, handing over to fetch: {}", e);
                    hits.push(None);
                    misses.push((position, id));
                }
            }
        }

        let fetch_count = misses.len().min(self.config.max_fetches_per_query);
        let deferred = misses.split_off(fetch_count);

        let fetches = stream::iter(misses)
            .map(|(position, id)| {
                let coordinator = self.coordinator.clone();
                async move { (position, coordinator.ensure(&id).wait().await) }
            })
            .buffered(self.config.parallel_fetches.max(1))
            .collect::<Vec<_>>();

        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return SearchOutcome::Superseded,
            fetched = fetches => fetched,
        };

        for (position, asset) in fetched {
            hits[position] = Some(self.hit_for(asset));
        }
        for (position, id) in deferred {
            let placeholder = self.coordinator.placeholder_for(&id);
            hits[position] = Some(SearchHit::Placeholder {
                asset: PictogramAsset::unfetched(id),
                placeholder,
            });
        }

        if token.is_cancelled() {
            return SearchOutcome::Superseded;
        }
        SearchOutcome::Results(hits.into_iter().flatten().collect())
    }

    /// Cancel the running query, if any, and register a token for a new one.
    fn begin_query(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self
            .current_token
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    fn hit_for(&self, asset: PictogramAsset) -> SearchHit {
        if asset.is_cached() {
            return SearchHit::Asset(asset);
        }
        let placeholder = asset
            .placeholder()
            .cloned()
            .unwrap_or_else(|| self.coordinator.placeholder_for(asset.id()));
        SearchHit::Placeholder { asset, placeholder }
    }

    /// Learned terms first, then the source's remote search.
    async fn remote_candidates(&self, query: &str, locale: &str) -> Vec<PictogramId> {
        if let Some(ids) = self.learned.get(query, locale).await {
            return ids;
        }

        match self.coordinator.source().search(query, locale).await {
            Ok(ids) => {
                if !ids.is_empty()
                    && let Err(e) = self.learned.remember(query, locale, ids.clone()).await
                {
                    warn!("Failed to remember search term '{}': {}", query, e);
                }
                ids
            }
            Err(e) => {
                warn!("Remote search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_cache::CacheStore;
    use crate::config::FetchConfig;
    use crate::fetch::{OfflineSource, PlaceholderCatalog};
    use crate::models::FetchState;

    const DATASET: &str = r#"{
        "version": 1,
        "entry_count": 3,
        "entries": [
            {"term": "mjölk", "pictogram_id": "P001", "locale": "sv"},
            {"term": "mjölk kallt", "pictogram_id": "P002", "locale": "sv"},
            {"term": "milk", "pictogram_id": "P001", "locale": "en"}
        ]
    }"#;

    async fn facade(dir: &std::path::Path, config: SearchConfig) -> SearchFacade {
        let index = Arc::new(KeywordIndex::build(DATASET.as_bytes()).unwrap());
        let cache = Arc::new(CacheStore::open(dir.join("pictograms")).await.unwrap());
        let coordinator = FetchCoordinator::new(
            cache,
            Arc::new(OfflineSource),
            PlaceholderCatalog::new(),
            &FetchConfig::default(),
        );
        SearchFacade::new(index, coordinator, Arc::new(LearnedTerms::in_memory()), config)
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path(), SearchConfig::default()).await;

        assert_eq!(
            facade.search("giraff", "sv").await,
            SearchOutcome::Results(vec![])
        );
        assert_eq!(facade.search("   ", "sv").await, SearchOutcome::Results(vec![]));
    }

    #[tokio::test]
    async fn test_empty_locale_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(dir.path(), SearchConfig::default()).await;

        let hits = facade.search("mjölk", "").await.into_hits().unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id().as_str()).collect();
        assert_eq!(ids, vec!["P001", "P002"]);
        assert!(hits
            .iter()
            .all(|h| h.asset().fetch_state() == FetchState::Failed));
    }

    #[tokio::test]
    async fn test_fetch_cap_defers_remaining_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let config = SearchConfig {
            max_fetches_per_query: 1,
            ..SearchConfig::default()
        };
        let facade = facade(dir.path(), config).await;

        let hits = facade.search("mjölk", "sv").await.into_hits().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].asset().fetch_state(), FetchState::Failed);
        assert_eq!(hits[1].asset().fetch_state(), FetchState::Unfetched);
        assert!(matches!(hits[1], SearchHit::Placeholder { .. }));
    }
}
