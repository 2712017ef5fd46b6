use sandboxed_store::ImageSniffer;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast, watch};
use tracing::{debug, info, warn};

use super::client::PictogramSource;
use super::placeholder::PlaceholderCatalog;
use crate::asset_cache::{CacheStore, IncomingAsset, StoreOutcome};
use crate::config::FetchConfig;
use crate::errors::{CacheError, FetchError, FetchResult};
use crate::models::{FetchState, PictogramAsset, PictogramId, Placeholder};

/// Attempts at storing one pictogram when the staged bytes fail verification.
const MAX_STORE_ATTEMPTS: u32 = 2;

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// A cache problem the user should hear about. The board keeps working with what is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheNotice {
    pub pictogram_id: PictogramId,
    pub message: String,
}

type InFlightMap = StdMutex<HashMap<PictogramId, watch::Receiver<Option<PictogramAsset>>>>;

/// Pending result of [`FetchCoordinator::ensure`].
#[derive(Debug, Clone)]
pub struct FetchHandle {
    id: PictogramId,
    rx: watch::Receiver<Option<PictogramAsset>>,
}

impl FetchHandle {
    #[must_use]
    pub fn id(&self) -> &PictogramId {
        &self.id
    }

    /// `Fetching` until the fetch task has resolved.
    #[must_use]
    pub fn state(&self) -> FetchState {
        self.rx
            .borrow()
            .as_ref()
            .map_or(FetchState::Fetching, PictogramAsset::fetch_state)
    }

    /// Wait for the fetch task. A task that disappears without answering yields `Unfetched`.
    pub async fn wait(mut self) -> PictogramAsset {
        let resolved = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        resolved.unwrap_or_else(|| PictogramAsset::unfetched(self.id))
    }
}

/// Removes the in-flight entry when the fetch task ends, however it ends.
struct InFlightGuard {
    id: PictogramId,
    inner: Arc<Inner>,
    tx: watch::Sender<Option<PictogramAsset>>,
    finished: bool,
}

impl InFlightGuard {
    fn finish(mut self, asset: PictogramAsset) {
        // Send before removing so late subscribers still see the result
        let _ = self.tx.send(Some(asset));
        self.inner.lock_in_flight().remove(&self.id);
        self.finished = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.lock_in_flight().remove(&self.id);
        }
    }
}

struct Inner {
    cache: Arc<CacheStore>,
    source: Arc<dyn PictogramSource>,
    placeholders: PlaceholderCatalog,
    in_flight: InFlightMap,
    cooldowns: StdMutex<HashMap<PictogramId, Instant>>,
    permits: Semaphore,
    request_timeout: Duration,
    failure_cooldown: Duration,
    notices: broadcast::Sender<CacheNotice>,
    sniffer: ImageSniffer,
}

/// Gets missing pictograms into the cache.
///
/// At most one fetch per id runs at a time; concurrent callers share its result. Network
/// fetches across all ids are bounded by `fetch.max_concurrent`. Failed fetches put the id in a
/// cooldown during which callers get its placeholder without touching the network.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl FetchCoordinator {
    pub fn new(
        cache: Arc<CacheStore>,
        source: Arc<dyn PictogramSource>,
        placeholders: PlaceholderCatalog,
        config: &FetchConfig,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                cache,
                source,
                placeholders,
                in_flight: StdMutex::new(HashMap::new()),
                cooldowns: StdMutex::new(HashMap::new()),
                permits: Semaphore::new(config.max_concurrent.max(1)),
                request_timeout: config.request_timeout,
                failure_cooldown: config.failure_cooldown,
                notices,
                sniffer: ImageSniffer::new(),
            }),
        }
    }

    /// Start resolving `id` unless that is already under way, and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ensure(&self, id: &PictogramId) -> FetchHandle {
        let mut in_flight = self.inner.lock_in_flight();
        if let Some(rx) = in_flight.get(id) {
            debug!(%id, "Joining in-flight fetch");
            return FetchHandle {
                id: id.clone(),
                rx: rx.clone(),
            };
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(id.clone(), rx.clone());
        drop(in_flight);

        let guard = InFlightGuard {
            id: id.clone(),
            inner: Arc::clone(&self.inner),
            tx,
            finished: false,
        };
        tokio::spawn(async move {
            let asset = guard.inner.resolve(&guard.id).await;
            guard.finish(asset);
        });

        FetchHandle { id: id.clone(), rx }
    }

    /// Time left before a failed id may be fetched again.
    #[must_use]
    pub fn cooldown_remaining(&self, id: &PictogramId) -> Option<Duration> {
        self.inner.cooldown_remaining(id)
    }

    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<CacheNotice> {
        self.inner.notices.subscribe()
    }

    #[must_use]
    pub fn placeholder_for(&self, id: &PictogramId) -> Placeholder {
        self.inner.placeholders.for_id(id)
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn PictogramSource> {
        &self.inner.source
    }

    /// Number of ids currently being resolved.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock_in_flight().len()
    }
}

impl Inner {
    fn lock_in_flight(
        &self,
    ) -> MutexGuard<'_, HashMap<PictogramId, watch::Receiver<Option<PictogramAsset>>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cooldowns(&self) -> MutexGuard<'_, HashMap<PictogramId, Instant>> {
        self.cooldowns.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn resolve(&self, id: &PictogramId) -> PictogramAsset {
        let generation = self.cache.generation();

        match self.cache.get(id).await {
            Ok(asset) if asset.is_cached() => return asset,
            Ok(_) => {}
            Err(e) => return self.cache_failure(id, &e),
        }

        if let Some(remaining) = self.cooldown_remaining(id) {
            debug!(
                %id,
                remaining_ms = remaining.as_millis() as u64,
                "Pictogram in failure cooldown, using placeholder"
            );
            return self.failed(id);
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return PictogramAsset::unfetched(id.clone());
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let incoming = match self.download(id).await {
                Ok(incoming) => incoming,
                Err(e) => {
                    warn!(%id, "Pictogram fetch failed: {}", e);
                    self.start_cooldown(id);
                    return self.failed(id);
                }
            };

            match self.cache.store(id, &incoming, generation).await {
                Ok(StoreOutcome::Stored(asset)) => {
                    self.lock_cooldowns().remove(id);
                    return asset;
                }
                Ok(StoreOutcome::Discarded) => {
                    info!(%id, "Cache was cleared during fetch, result discarded");
                    return PictogramAsset::unfetched(id.clone());
                }
                Err(e @ CacheError::ChecksumMismatch { .. }) if attempt < MAX_STORE_ATTEMPTS => {
                    warn!(%id, "Refetching after failed verification: {}", e);
                }
                Err(e) => return self.cache_failure(id, &e),
            }
        }
    }

    async fn download(&self, id: &PictogramId) -> FetchResult<IncomingAsset> {
        let fetched = tokio::time::timeout(self.request_timeout, self.source.fetch(id))
            .await
            .map_err(|_| FetchError::Timeout {
                url: format!("{}/{}", self.source.describe(), id),
                seconds: self.request_timeout.as_secs(),
            })??;

        let file_type = self
            .sniffer
            .sniff(&fetched.bytes)
            .map_err(|e| FetchError::invalid_content(id.as_str(), e.to_string()))?;

        Ok(IncomingAsset {
            bytes: fetched.bytes,
            mime_type: file_type.mime_type,
            extension: file_type.extension,
            source_url: Some(fetched.source_url),
        })
    }

    fn cooldown_remaining(&self, id: &PictogramId) -> Option<Duration> {
        let mut cooldowns = self.lock_cooldowns();
        let failed_at = *cooldowns.get(id)?;
        let remaining = self.failure_cooldown.checked_sub(failed_at.elapsed());
        match remaining {
            Some(remaining) if !remaining.is_zero() => Some(remaining),
            _ => {
                cooldowns.remove(id);
                None
            }
        }
    }

    fn start_cooldown(&self, id: &PictogramId) {
        if self.failure_cooldown.is_zero() {
            return;
        }
        let mut cooldowns = self.lock_cooldowns();
        cooldowns.retain(|_, failed_at| failed_at.elapsed() < self.failure_cooldown);
        cooldowns.insert(id.clone(), Instant::now());
    }

    fn failed(&self, id: &PictogramId) -> PictogramAsset {
        PictogramAsset::failed(id.clone(), self.placeholders.for_id(id))
    }

    fn cache_failure(&self, id: &PictogramId, error: &CacheError) -> PictogramAsset {
        warn!(%id, "Pictogram cache error: {}", error);
        let _ = self.notices.send(CacheNotice {
            pictogram_id: id.clone(),
            message: error.to_string(),
        });
        self.failed(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchedPictogram, OfflineSource};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a small PNG for every id and counts fetches.
    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PictogramSource for CountingSource {
        async fn fetch(&self, id: &PictogramId) -> FetchResult<FetchedPictogram> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut bytes = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
            bytes.extend_from_slice(id.as_str().as_bytes());
            Ok(FetchedPictogram {
                bytes: Bytes::from(bytes),
                source_url: format!("test://{id}"),
            })
        }

        async fn search(&self, _term: &str, _locale: &str) -> FetchResult<Vec<PictogramId>> {
            Ok(Vec::new())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    async fn serving_coordinator(
        dir: &std::path::Path,
    ) -> (FetchCoordinator, Arc<CountingSource>) {
        let cache = Arc::new(CacheStore::open(dir.join("pictograms")).await.unwrap());
        let source = Arc::new(CountingSource::default());
        let coordinator = FetchCoordinator::new(
            cache,
            Arc::clone(&source) as Arc<dyn PictogramSource>,
            PlaceholderCatalog::new(),
            &FetchConfig {
                failure_cooldown: Duration::from_secs(3600),
                ..FetchConfig::default()
            },
        );
        (coordinator, source)
    }

    async fn coordinator(dir: &std::path::Path, cooldown: Duration) -> FetchCoordinator {
        let cache = Arc::new(CacheStore::open(dir.join("pictograms")).await.unwrap());
        let milk = PictogramId::new("2445").unwrap();
        let placeholders: PlaceholderCatalog = [(milk, Placeholder::new("🥛", Some("Milk".into())))]
            .into_iter()
            .collect();
        FetchCoordinator::new(
            cache,
            Arc::new(OfflineSource),
            placeholders,
            &FetchConfig {
                failure_cooldown: cooldown,
                ..FetchConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_offline_miss_uses_card_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), Duration::from_secs(3600)).await;
        let milk = PictogramId::new("2445").unwrap();

        let asset = coordinator.ensure(&milk).wait().await;
        assert_eq!(asset.fetch_state(), FetchState::Failed);
        assert_eq!(asset.placeholder().unwrap().glyph, "🥛");
        assert!(asset.local_path().is_none());

        assert!(coordinator.cooldown_remaining(&milk).is_some());
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_damaged_staging_write_is_refetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, source) = serving_coordinator(dir.path()).await;
        let id = PictogramId::new("2445").unwrap();

        coordinator.cache().force_checksum_mismatches(1);
        let asset = coordinator.ensure(&id).wait().await;

        assert!(asset.is_cached());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_damage_gives_up_with_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, source) = serving_coordinator(dir.path()).await;
        let mut notices = coordinator.subscribe_notices();
        let id = PictogramId::new("2445").unwrap();

        coordinator.cache().force_checksum_mismatches(2);
        let asset = coordinator.ensure(&id).wait().await;

        assert_eq!(asset.fetch_state(), FetchState::Failed);
        assert_eq!(source.fetches.load(Ordering::SeqCst), MAX_STORE_ATTEMPTS as usize);
        assert_eq!(notices.try_recv().unwrap().pictogram_id, id);
        assert!(coordinator.cooldown_remaining(&id).is_none());
        assert!(!coordinator.cache().get(&id).await.unwrap().is_cached());
    }

    #[tokio::test]
    async fn test_expired_cooldowns_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), Duration::from_millis(300)).await;

        for raw in ["1", "2", "3"] {
            let id = PictogramId::new(raw).unwrap();
            coordinator.ensure(&id).wait().await;
        }
        assert_eq!(coordinator.inner.lock_cooldowns().len(), 3);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let id = PictogramId::new("4").unwrap();
        coordinator.ensure(&id).wait().await;
        assert_eq!(coordinator.inner.lock_cooldowns().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_cooldown_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), Duration::ZERO).await;
        let id = PictogramId::new("1").unwrap();

        let asset = coordinator.ensure(&id).wait().await;
        assert_eq!(asset.fetch_state(), FetchState::Failed);
        assert!(coordinator.cooldown_remaining(&id).is_none());
    }
}
