//! Shared fixtures for the integration tests: a scriptable pictogram source and cache setup.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use pecs_board::{
    asset_cache::CacheStore,
    config::FetchConfig,
    errors::{FetchError, FetchResult},
    fetch::{FetchCoordinator, FetchedPictogram, PictogramSource, PlaceholderCatalog},
    models::PictogramId,
};

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// PNG-looking bytes that differ per id.
pub fn png_for(id: &str) -> Bytes {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(b"\0\0\0\rIHDR");
    bytes.extend_from_slice(id.as_bytes());
    Bytes::from(bytes)
}

pub fn id(raw: &str) -> PictogramId {
    PictogramId::new(raw).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Serve,
    Fail,
    NotAnImage,
}

/// Pictogram source with call counters and an optional gate that holds every fetch until
/// [`FakeSource::open_gate`] is called.
pub struct FakeSource {
    pub fetches: AtomicUsize,
    pub searches: AtomicUsize,
    /// Notified when a fetch begins
    pub started: Notify,
    gate: Option<Notify>,
    behaviour: Behaviour,
    remote: HashMap<String, Vec<PictogramId>>,
}

impl FakeSource {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            started: Notify::new(),
            gate: None,
            behaviour,
            remote: HashMap::new(),
        }
    }

    pub fn gated(behaviour: Behaviour) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new(behaviour)
        }
    }

    pub fn with_remote(mut self, term: &str, ids: &[&str]) -> Self {
        self.remote
            .insert(term.to_string(), ids.iter().map(|raw| id(raw)).collect());
        self
    }

    /// Let one held fetch continue.
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PictogramSource for FakeSource {
    async fn fetch(&self, id: &PictogramId) -> FetchResult<FetchedPictogram> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let source_url = format!("fake://{id}");
        match self.behaviour {
            Behaviour::Serve => Ok(FetchedPictogram {
                bytes: png_for(id.as_str()),
                source_url,
            }),
            Behaviour::Fail => Err(FetchError::Transport {
                url: source_url,
                message: "network unreachable".to_string(),
            }),
            Behaviour::NotAnImage => Ok(FetchedPictogram {
                bytes: Bytes::from_static(b"<html><body>Not found</body></html>"),
                source_url,
            }),
        }
    }

    async fn search(&self, term: &str, _locale: &str) -> FetchResult<Vec<PictogramId>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote.get(term).cloned().unwrap_or_default())
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

pub fn pictogram_dir(root: &Path) -> PathBuf {
    root.join("pictograms")
}

pub async fn open_cache(root: &Path) -> Arc<CacheStore> {
    Arc::new(CacheStore::open(pictogram_dir(root)).await.unwrap())
}

pub fn fetch_config(cooldown: Duration) -> FetchConfig {
    FetchConfig {
        failure_cooldown: cooldown,
        request_timeout: Duration::from_secs(5),
        ..FetchConfig::default()
    }
}

pub fn coordinator(
    cache: Arc<CacheStore>,
    source: Arc<FakeSource>,
    cooldown: Duration,
) -> FetchCoordinator {
    FetchCoordinator::new(
        cache,
        source,
        PlaceholderCatalog::new(),
        &fetch_config(cooldown),
    )
}

/// Names of the committed files in the pictogram directory.
pub fn cached_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(pictogram_dir(root))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
                .filter_map(|entry| entry.file_name().to_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
