use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::FetchConfig;
use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::keyword_index::primary_subtag;
use crate::models::PictogramId;

/// Largest pictogram body accepted from the network.
pub const MAX_PICTOGRAM_BYTES: usize = 10 * 1024 * 1024;

/// Image bytes as they arrived from a source, not yet sniffed or cached.
#[derive(Debug, Clone)]
pub struct FetchedPictogram {
    pub bytes: Bytes,
    pub source_url: String,
}

/// Where pictograms come from when they are not cached.
#[async_trait]
pub trait PictogramSource: Send + Sync {
    /// Download the image for `id`.
    async fn fetch(&self, id: &PictogramId) -> FetchResult<FetchedPictogram>;

    /// Ask the source which pictograms match `term`, best match first.
    async fn search(&self, term: &str, locale: &str) -> FetchResult<Vec<PictogramId>>;

    /// Human readable name used in logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "_id")]
    id: u64,
}

/// HTTP client for the ARASAAC pictogram API.
#[derive(Debug, Clone)]
pub struct ArasaacClient {
    client: Client,
    base_url: String,
    resolution: u32,
    request_timeout: Duration,
}

impl ArasaacClient {
    pub fn new(config: &FetchConfig) -> AppResult<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            AppError::configuration(format!("Invalid fetch.base_url '{}': {}", config.base_url, e))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("pecs-board/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            resolution: config.resolution,
            request_timeout: config.request_timeout,
        })
    }

    #[must_use]
    pub fn pictogram_url(&self, id: &PictogramId) -> String {
        format!(
            "{}/pictograms/{}?download=false&plural=false&color=true&resolution={}",
            self.base_url, id, self.resolution
        )
    }

    #[must_use]
    pub fn search_url(&self, term: &str, locale: &str) -> String {
        format!(
            "{}/pictograms/{}/search/{}",
            self.base_url,
            urlencoding::encode(&primary_subtag(locale)),
            urlencoding::encode(term.trim())
        )
    }

    fn classify(&self, url: &str, error: &reqwest::Error) -> FetchError {
        FetchError::from_reqwest(url, self.request_timeout.as_secs(), error)
    }
}

#[async_trait]
impl PictogramSource for ArasaacClient {
    async fn fetch(&self, id: &PictogramId) -> FetchResult<FetchedPictogram> {
        let url = self.pictogram_url(id);
        trace!(%id, %url, "Fetching pictogram");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(&url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url,
                status: status.as_u16(),
            });
        }

        if let Some(declared) = response.content_length() {
            check_size(id, declared)?;
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(&url, &e))?;
        check_size(id, bytes.len() as u64)?;

        debug!(%id, bytes = bytes.len(), "Fetched pictogram");
        Ok(FetchedPictogram {
            bytes,
            source_url: url,
        })
    }

    async fn search(&self, term: &str, locale: &str) -> FetchResult<Vec<PictogramId>> {
        let url = self.search_url(term, locale);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(&url, &e))?;

        // The API answers 404 when nothing matches
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(FetchError::Http {
                url,
                status: response.status().as_u16(),
            });
        }

        let items: Vec<SearchItem> = response
            .json()
            .await
            .map_err(|e| self.classify(&url, &e))?;

        let ids: Vec<PictogramId> = items
            .into_iter()
            .filter_map(|item| PictogramId::new(item.id.to_string()).ok())
            .collect();
        debug!(term, locale, matches = ids.len(), "Remote pictogram search");
        Ok(ids)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

fn check_size(id: &PictogramId, len: u64) -> FetchResult<()> {
    if len > MAX_PICTOGRAM_BYTES as u64 {
        return Err(FetchError::invalid_content(
            id.as_str(),
            format!("image too large ({len} bytes)"),
        ));
    }
    Ok(())
}

/// Source used when network access is disabled. Every fetch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSource;

#[async_trait]
impl PictogramSource for OfflineSource {
    async fn fetch(&self, id: &PictogramId) -> FetchResult<FetchedPictogram> {
        Err(FetchError::Offline { id: id.to_string() })
    }

    async fn search(&self, _term: &str, _locale: &str) -> FetchResult<Vec<PictogramId>> {
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        "offline".to_string()
    }
}
