//! Pictogram cache store with sidecar metadata, LRU eviction and integrity checks

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lru::LruCache;
use sandboxed_store::SandboxedStore;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::entry::{Access, CacheEntry, Fingerprint, IncomingAsset};
use super::metadata::CachedPictogramMetadata;
use crate::errors::{CacheError, CacheResult};
use crate::models::{PictogramAsset, PictogramId};
use crate::utils::sha256_hex;

type PinCounts = Arc<StdMutex<HashMap<PictogramId, usize>>>;

/// Result of [`CacheStore::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The bytes are cached and verified
    Stored(PictogramAsset),
    /// The cache was cleared after the fetch started; nothing was written
    Discarded,
}

/// Limits applied by [`CacheStore::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Total size the cache is brought down to
    pub max_bytes: u64,
    /// Entries not accessed for longer than this are removed regardless of size
    pub max_age: Option<Duration>,
}

impl EvictionPolicy {
    #[must_use]
    pub fn size_only(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            max_age: None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct EvictionStats {
    pub total_entries: u64,
    pub kept_entries: u64,
    pub removed_by_age: u64,
    pub removed_by_size: u64,
    pub skipped_pinned: u64,
    pub skipped_busy: u64,
    pub removal_errors: u64,
    pub bytes_freed: u64,
    pub final_total_bytes: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_bytes: u64,
    pub pinned_entries: u64,
    pub generation: u64,
    pub directory: PathBuf,
}

/// Keeps a cached pictogram out of eviction while held.
#[derive(Debug)]
pub struct AssetPin {
    id: PictogramId,
    pins: PinCounts,
}

impl AssetPin {
    #[must_use]
    pub fn id(&self) -> &PictogramId {
        &self.id
    }
}

impl Drop for AssetPin {
    fn drop(&mut self) {
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = pins.get_mut(&self.id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                pins.remove(&self.id);
            }
        }
    }
}

/// Cached bytes together with the pin that keeps them on disk.
#[derive(Debug)]
pub struct PinnedAsset {
    pub asset: PictogramAsset,
    pub bytes: Bytes,
    pub pin: AssetPin,
}

/// An entry taken out of the index by eviction, awaiting file removal.
struct Victim {
    id: PictogramId,
    entry: CacheEntry,
    expired: bool,
    _writer: OwnedMutexGuard<()>,
}

/// Local pictogram cache.
///
/// Each pictogram is stored as `<id>.<ext>` with a `<id>.json` sidecar. The in-memory index is
/// rebuilt from the sidecars on [`CacheStore::open`].
pub struct CacheStore {
    files: SandboxedStore,
    entries: RwLock<HashMap<PictogramId, CacheEntry>>,
    /// Least recently used first when iterated in reverse
    recency: StdMutex<LruCache<PictogramId, Access>>,
    writer_locks: StdMutex<HashMap<PictogramId, Arc<Mutex<()>>>>,
    pins: PinCounts,
    generation: AtomicU64,
    /// Held exclusively by `clear`, shared by `store` while it commits
    clear_gate: RwLock<()>,
    #[cfg(test)]
    forced_mismatches: AtomicU64,
}

impl CacheStore {
    /// Open the cache in `directory`, creating it if needed and reloading existing entries.
    pub async fn open(directory: impl Into<PathBuf>) -> CacheResult<Self> {
        let files = SandboxedStore::builder()
            .base_directory(directory)
            .build()
            .await?;
        files.purge_partials().await?;

        let store = Self {
            files,
            entries: RwLock::new(HashMap::new()),
            recency: StdMutex::new(LruCache::unbounded()),
            writer_locks: StdMutex::new(HashMap::new()),
            pins: Arc::new(StdMutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            clear_gate: RwLock::new(()),
            #[cfg(test)]
            forced_mismatches: AtomicU64::new(0),
        };
        store.scan_and_load().await?;
        Ok(store)
    }

    /// Rebuild the in-memory index from sidecars, removing orphaned files.
    async fn scan_and_load(&self) -> CacheResult<()> {
        let start_time = Instant::now();
        let names = self.files.list_files().await?;
        let (sidecars, images): (Vec<_>, Vec<_>) =
            names.into_iter().partition(|name| name.ends_with(".json"));
        let images: HashSet<String> = images.into_iter().collect();

        let mut loaded: Vec<(PictogramId, CacheEntry, DateTime<Utc>)> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut orphans = 0usize;

        for sidecar in sidecars {
            let metadata = match self.read_sidecar(&sidecar).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Removing unreadable sidecar {}: {}", sidecar, e);
                    self.remove_quietly(&sidecar).await;
                    orphans += 1;
                    continue;
                }
            };

            let expected_name = CachedPictogramMetadata::file_name_for(&metadata.pictogram_id);
            if sidecar != expected_name
                || !metadata.describes(&metadata.file_name)
                || !images.contains(&metadata.file_name)
            {
                debug!("Removing orphaned sidecar {}", sidecar);
                self.remove_quietly(&sidecar).await;
                orphans += 1;
                continue;
            }

            claimed.insert(metadata.file_name.clone());
            let last_accessed = metadata.last_accessed;
            let id = metadata.pictogram_id.clone();
            loaded.push((id, CacheEntry::from_metadata(metadata), last_accessed));
        }

        for image in images.difference(&claimed) {
            debug!("Removing cached file without sidecar: {}", image);
            self.remove_quietly(image).await;
            orphans += 1;
        }

        // Oldest first so the most recently used ends up at the front of the LRU.
        loaded.sort_by_key(|(_, _, last_accessed)| *last_accessed);

        let mut entries = self.entries.write().await;
        let mut recency = self.lock_recency();
        entries.clear();
        recency.clear();
        for (id, entry, last_accessed) in loaded {
            recency.put(
                id.clone(),
                Access {
                    last_accessed,
                    dirty: false,
                },
            );
            entries.insert(id, entry);
        }

        info!(
            "Pictogram cache loaded: {} entries, {} orphaned file(s) removed in {:.2}s",
            entries.len(),
            orphans,
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Look up `id`.
    ///
    /// A hit costs one stat. The file is hashed on first access after load and whenever its
    /// size or modification time changes; a mismatch drops the entry and reports a miss.
    pub async fn get(&self, id: &PictogramId) -> CacheResult<PictogramAsset> {
        let Some(entry) = self.entries.read().await.get(id).cloned() else {
            return Ok(PictogramAsset::unfetched(id.clone()));
        };

        let Some(file_metadata) = self.files.metadata(&entry.file_name).await? else {
            warn!(%id, "Cached pictogram file vanished, dropping entry");
            self.invalidate(id, &entry.checksum).await?;
            return Ok(PictogramAsset::unfetched(id.clone()));
        };

        let fingerprint = Fingerprint::of(&file_metadata);
        if entry.verified != Some(fingerprint) {
            let bytes = match self.files.read(&entry.file_name).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => {
                    self.invalidate(id, &entry.checksum).await?;
                    return Ok(PictogramAsset::unfetched(id.clone()));
                }
                Err(e) => return Err(e.into()),
            };

            let actual = sha256_hex(&bytes);
            if actual != entry.checksum || bytes.len() as u64 != entry.size_bytes {
                warn!(
                    %id,
                    expected = %entry.checksum,
                    actual = %actual,
                    "Cached pictogram failed verification, dropping entry"
                );
                self.invalidate(id, &entry.checksum).await?;
                return Ok(PictogramAsset::unfetched(id.clone()));
            }

            if let Some(current) = self.entries.write().await.get_mut(id)
                && current.checksum == entry.checksum
            {
                current.verified = Some(fingerprint);
            }
        }

        self.touch(id);
        Ok(PictogramAsset::cached(
            id.clone(),
            self.files.base_dir().join(&entry.file_name),
            entry.checksum,
            entry.size_bytes,
        ))
    }

    /// Pin `id` and read its bytes. `None` on a miss.
    pub async fn read(&self, id: &PictogramId) -> CacheResult<Option<PinnedAsset>> {
        let Some(pin) = self.pin(id).await else {
            return Ok(None);
        };

        let asset = self.get(id).await?;
        let Some(path) = asset.local_path() else {
            return Ok(None);
        };
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };

        let bytes = match self.files.read(file_name).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if asset.checksum() != Some(sha256_hex(&bytes).as_str()) {
            warn!(%id, "Pictogram changed while being read, dropping entry");
            if let Some(checksum) = asset.checksum() {
                self.invalidate(id, checksum).await?;
            }
            return Ok(None);
        }

        Ok(Some(PinnedAsset { asset, bytes, pin }))
    }

    /// Keep `id` out of eviction until the returned pin is dropped. `None` on a miss.
    pub async fn pin(&self, id: &PictogramId) -> Option<AssetPin> {
        let entries = self.entries.read().await;
        if !entries.contains_key(id) {
            return None;
        }

        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        *pins.entry(id.clone()).or_default() += 1;
        Some(AssetPin {
            id: id.clone(),
            pins: Arc::clone(&self.pins),
        })
    }

    /// Write fetched bytes for `id`.
    ///
    /// The bytes are staged, read back and hashed before the sidecar is written and the file is
    /// renamed into place. If `generation` is no longer current the cache has been cleared since
    /// the fetch began and the bytes are discarded.
    pub async fn store(
        &self,
        id: &PictogramId,
        incoming: &IncomingAsset,
        generation: u64,
    ) -> CacheResult<StoreOutcome> {
        let lock = self.writer_lock(id);
        let _writer = lock.lock().await;

        if generation != self.generation() {
            debug!(%id, "Discarding pictogram fetched before cache clear");
            return Ok(StoreOutcome::Discarded);
        }

        let expected = sha256_hex(&incoming.bytes);
        let file_name = format!("{id}.{}", incoming.extension);
        let staged = match self.files.stage(&file_name, &incoming.bytes).await {
            Ok(staged) => staged,
            Err(e) => return self.discard_if_cleared(id, generation, e.into()),
        };

        let written = match staged.read_back().await {
            Ok(written) => written,
            Err(e) => return self.discard_if_cleared(id, generation, e.into()),
        };
        let actual = self.staged_checksum(&written);
        if actual != expected {
            staged.discard().await?;
            return Err(CacheError::ChecksumMismatch {
                id: id.to_string(),
                expected,
                actual,
            });
        }

        let _gate = self.clear_gate.read().await;
        if generation != self.generation() {
            staged.discard().await?;
            debug!(%id, "Discarding pictogram fetched before cache clear");
            return Ok(StoreOutcome::Discarded);
        }

        let now = Utc::now();
        let previous = self.entries.read().await.get(id).cloned();
        let entry = CacheEntry {
            file_name: file_name.clone(),
            checksum: expected,
            size_bytes: incoming.bytes.len() as u64,
            mime_type: incoming.mime_type.clone(),
            source_url: incoming.source_url.clone(),
            cached_at: previous.as_ref().map_or(now, |p| p.cached_at),
            verified: None,
        };

        self.write_sidecar(id, &entry, now).await?;
        let path = staged.commit().await?;

        if let Some(previous) = previous
            && previous.file_name != file_name
        {
            self.remove_quietly(&previous.file_name).await;
        }

        let verified = self
            .files
            .metadata(&file_name)
            .await?
            .map(|m| Fingerprint::of(&m));
        let asset = PictogramAsset::cached(
            id.clone(),
            path,
            entry.checksum.clone(),
            entry.size_bytes,
        );

        self.entries
            .write()
            .await
            .insert(id.clone(), CacheEntry { verified, ..entry });
        self.lock_recency().put(
            id.clone(),
            Access {
                last_accessed: now,
                dirty: false,
            },
        );

        debug!(%id, bytes = asset.size_bytes(), "Stored pictogram");
        Ok(StoreOutcome::Stored(asset))
    }

    /// Remove least recently used entries until the total size is below `policy.max_bytes`, and
    /// entries idle longer than `policy.max_age`. Pinned entries and entries being written are
    /// never removed.
    ///
    /// Victims leave the index before their files are deleted, so readers never wait on disk
    /// I/O. Each victim's writer lock is held until its files are gone.
    pub async fn evict(&self, policy: EvictionPolicy) -> EvictionStats {
        let start_time = Instant::now();
        let mut stats = EvictionStats::default();

        let (victims, mut total) = self.select_victims(policy, Utc::now(), &mut stats).await;

        let mut removed = Vec::new();
        let mut restored = Vec::new();
        for victim in &victims {
            match self.remove_files(&victim.id, &victim.entry.file_name).await {
                Ok(()) => {
                    stats.bytes_freed += victim.entry.size_bytes;
                    if victim.expired {
                        stats.removed_by_age += 1;
                    } else {
                        stats.removed_by_size += 1;
                    }
                    debug!(
                        id = %victim.id,
                        bytes = victim.entry.size_bytes,
                        expired = victim.expired,
                        "Evicted pictogram"
                    );
                    removed.push(&victim.id);
                }
                Err(e) => {
                    warn!(id = %victim.id, "Failed to evict cached pictogram: {}", e);
                    stats.removal_errors += 1;
                    stats.kept_entries += 1;
                    restored.push(victim);
                }
            }
        }

        if !restored.is_empty() {
            let mut entries = self.entries.write().await;
            for victim in restored {
                total += victim.entry.size_bytes;
                entries.insert(victim.id.clone(), victim.entry.clone());
            }
        }
        {
            let mut recency = self.lock_recency();
            for id in removed {
                recency.pop(id);
            }
        }
        drop(victims);
        self.prune_writer_locks();

        stats.final_total_bytes = total;
        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Pictogram cache eviction: kept={} removed_age={} removed_size={} pinned={} freed={}B total={}B",
            stats.kept_entries,
            stats.removed_by_age,
            stats.removed_by_size,
            stats.skipped_pinned,
            stats.bytes_freed,
            stats.final_total_bytes
        );
        stats
    }

    /// Pick eviction victims and take them out of the index. Returns them with the total size
    /// of what remains indexed.
    async fn select_victims(
        &self,
        policy: EvictionPolicy,
        now: DateTime<Utc>,
        stats: &mut EvictionStats,
    ) -> (Vec<Victim>, u64) {
        let mut entries = self.entries.write().await;
        let order: Vec<(PictogramId, DateTime<Utc>)> = {
            let recency = self.lock_recency();
            let mut order: Vec<_> = recency
                .iter()
                .rev()
                .map(|(id, access)| (id.clone(), access.last_accessed))
                .collect();
            // Entries missing from the recency list go first.
            let listed: HashSet<&PictogramId> = order.iter().map(|(id, _)| id).collect();
            let unlisted: Vec<_> = entries
                .keys()
                .filter(|id| !listed.contains(id))
                .map(|id| (id.clone(), now))
                .collect();
            order.splice(0..0, unlisted);
            order
        };

        let mut total: u64 = entries.values().map(|e| e.size_bytes).sum();
        let mut victims = Vec::new();

        for (id, last_accessed) in order {
            if !entries.contains_key(&id) {
                continue;
            }
            stats.total_entries += 1;

            let expired = policy.max_age.is_some_and(|max_age| {
                (now - last_accessed)
                    .to_std()
                    .is_ok_and(|idle| idle > max_age)
            });
            let over_budget = total >= policy.max_bytes;
            if !expired && !over_budget {
                stats.kept_entries += 1;
                continue;
            }

            if self.pin_count(&id) > 0 {
                stats.skipped_pinned += 1;
                stats.kept_entries += 1;
                continue;
            }
            let Some(writer) = self.try_writer_lock(&id) else {
                stats.skipped_busy += 1;
                stats.kept_entries += 1;
                continue;
            };
            let Some(entry) = entries.remove(&id) else {
                continue;
            };

            total = total.saturating_sub(entry.size_bytes);
            victims.push(Victim {
                id,
                entry,
                expired,
                _writer: writer,
            });
        }

        (victims, total)
    }

    /// Remove every cached pictogram and start a new generation. Returns the number of entries
    /// that were indexed.
    pub async fn clear(&self) -> CacheResult<u64> {
        let _gate = self.clear_gate.write().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let cleared = {
            let mut entries = self.entries.write().await;
            let count = entries.len() as u64;
            entries.clear();
            self.lock_recency().clear();
            count
        };

        let mut removal_errors = 0usize;
        for file in self.files.list_files().await? {
            if let Err(e) = self.files.remove_file(&file).await {
                warn!("Failed to remove cached file {}: {}", file, e);
                removal_errors += 1;
            }
        }
        self.files.purge_partials().await?;
        self.prune_writer_locks();

        info!(
            "Cleared pictogram cache: {} entries removed, generation now {} ({} removal errors)",
            cleared, generation, removal_errors
        );
        Ok(cleared)
    }

    /// Write last-access times that changed since load back to the sidecars.
    pub async fn flush(&self) -> CacheResult<usize> {
        let dirty: Vec<(PictogramId, DateTime<Utc>)> = {
            let mut recency = self.lock_recency();
            recency
                .iter_mut()
                .filter(|(_, access)| access.dirty)
                .map(|(id, access)| {
                    access.dirty = false;
                    (id.clone(), access.last_accessed)
                })
                .collect()
        };

        let mut flushed = 0;
        for (id, last_accessed) in dirty {
            let lock = self.writer_lock(&id);
            let _writer = lock.lock().await;
            let Some(entry) = self.entries.read().await.get(&id).cloned() else {
                continue;
            };
            self.write_sidecar(&id, &entry, last_accessed).await?;
            flushed += 1;
        }

        if flushed > 0 {
            debug!("Flushed {} access time(s) to sidecars", flushed);
        }
        Ok(flushed)
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let pinned_entries = self.pins.lock().unwrap_or_else(|e| e.into_inner()).len() as u64;
        CacheStats {
            total_entries: entries.len() as u64,
            total_bytes: entries.values().map(|e| e.size_bytes).sum(),
            pinned_entries,
            generation: self.generation(),
            directory: self.files.base_dir().to_path_buf(),
        }
    }

    /// Current clear generation; fetches record it when they start.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        self.files.base_dir()
    }

    /// Drop the entry for `id` if it still has `checksum`.
    async fn invalidate(&self, id: &PictogramId, checksum: &str) -> CacheResult<()> {
        let lock = self.writer_lock(id);
        let _writer = lock.lock().await;

        let removed = {
            let mut entries = self.entries.write().await;
            match entries.get(id) {
                Some(entry) if entry.checksum == checksum => entries.remove(id),
                _ => None,
            }
        };
        let Some(entry) = removed else {
            return Ok(());
        };
        self.lock_recency().pop(id);

        self.remove_files(id, &entry.file_name).await
    }

    /// A staging failure after the cache was cleared is a discarded store, not an error.
    fn discard_if_cleared(
        &self,
        id: &PictogramId,
        generation: u64,
        error: CacheError,
    ) -> CacheResult<StoreOutcome> {
        if generation != self.generation() {
            debug!(%id, "Discarding pictogram staged before cache clear: {}", error);
            return Ok(StoreOutcome::Discarded);
        }
        Err(error)
    }

    async fn remove_files(&self, id: &PictogramId, file_name: &str) -> CacheResult<()> {
        self.files.remove_file(file_name).await?;
        self.files
            .remove_file(&CachedPictogramMetadata::file_name_for(id))
            .await?;
        Ok(())
    }

    async fn remove_quietly(&self, file_name: &str) {
        if let Err(e) = self.files.remove_file(file_name).await {
            warn!("Failed to remove {}: {}", file_name, e);
        }
    }

    async fn read_sidecar(&self, name: &str) -> CacheResult<CachedPictogramMetadata> {
        let bytes = self.files.read(name).await?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::metadata(name, e.to_string()))
    }

    async fn write_sidecar(
        &self,
        id: &PictogramId,
        entry: &CacheEntry,
        last_accessed: DateTime<Utc>,
    ) -> CacheResult<()> {
        let metadata = entry.to_metadata(id, last_accessed);
        let encoded = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| CacheError::metadata(id.as_str(), e.to_string()))?;
        self.files
            .write_atomic(&CachedPictogramMetadata::file_name_for(id), &encoded)
            .await?;
        Ok(())
    }

    fn touch(&self, id: &PictogramId) {
        self.lock_recency().put(
            id.clone(),
            Access {
                last_accessed: Utc::now(),
                dirty: true,
            },
        );
    }

    fn pin_count(&self, id: &PictogramId) -> usize {
        self.pins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    fn writer_lock(&self, id: &PictogramId) -> Arc<Mutex<()>> {
        let mut locks = self.writer_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    fn try_writer_lock(&self, id: &PictogramId) -> Option<OwnedMutexGuard<()>> {
        self.writer_lock(id).try_lock_owned().ok()
    }

    #[cfg(not(test))]
    fn staged_checksum(&self, written: &[u8]) -> String {
        sha256_hex(written)
    }

    #[cfg(test)]
    fn staged_checksum(&self, written: &[u8]) -> String {
        let forced = self
            .forced_mismatches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return sha256_hex(b"damaged staging write");
        }
        sha256_hex(written)
    }

    /// Make the next `count` stores see damaged staged bytes.
    #[cfg(test)]
    pub(crate) fn force_checksum_mismatches(&self, count: u64) {
        self.forced_mismatches.store(count, Ordering::SeqCst);
    }

    /// Forget writer locks nobody holds or waits on.
    fn prune_writer_locks(&self) {
        self.writer_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    fn lock_recency(&self) -> std::sync::MutexGuard<'_, LruCache<PictogramId, Access>> {
        self.recency.lock().unwrap_or_else(|e| e.into_inner())
    }
}
