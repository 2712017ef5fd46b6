use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::parse_default;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub board: BoardConfig,
}

/// Local pictogram cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root of the cache; pictograms live in `<directory>/pictograms`
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    /// Size budget enforced by eviction
    #[serde(default = "default_cache_max_size_mb")]
    pub max_size_mb: u64,
    /// Entries not accessed for this long are expired by eviction
    #[serde(default = "default_cache_max_age", with = "duration_serde::duration")]
    pub max_age: Duration,
    /// How often the background maintenance task runs eviction
    #[serde(
        default = "default_cache_maintenance_interval",
        with = "duration_serde::duration"
    )]
    pub maintenance_interval: Duration,
}

/// Remote pictogram source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_base_url")]
    pub base_url: String,
    /// Requested image resolution in pixels
    #[serde(default = "default_fetch_resolution")]
    pub resolution: u32,
    #[serde(
        default = "default_fetch_request_timeout",
        with = "duration_serde::duration"
    )]
    pub request_timeout: Duration,
    #[serde(
        default = "default_fetch_connect_timeout",
        with = "duration_serde::duration"
    )]
    pub connect_timeout: Duration,
    /// After a failed fetch the id is not retried until this window has passed
    #[serde(
        default = "default_fetch_failure_cooldown",
        with = "duration_serde::duration"
    )]
    pub failure_cooldown: Duration,
    /// Upper bound on concurrent network fetches across all callers
    #[serde(default = "default_fetch_max_concurrent")]
    pub max_concurrent: usize,
    /// Never touch the network; misses become placeholders
    #[serde(default)]
    pub offline: bool,
}

/// Search facade settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_max_fetches_per_query")]
    pub max_fetches_per_query: usize,
    #[serde(default = "default_search_parallel_fetches")]
    pub parallel_fetches: usize,
    #[serde(default = "default_search_locale")]
    pub default_locale: String,
    /// Ask the remote search endpoint when the offline index has no match
    #[serde(default = "default_search_remote_fallback")]
    pub remote_fallback: bool,
}

/// Keyword dataset settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatasetConfig {
    /// Dataset file overriding the bundled copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_enabled")]
    pub enabled: bool,
    /// Voice language (primary subtag, e.g. "sv" or "en")
    #[serde(default = "default_speech_locale")]
    pub locale: String,
    /// Words per minute for espeak
    #[serde(default = "default_speech_rate")]
    pub rate: u32,
    /// Extra directories searched for Piper voice models
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voice_directories: Vec<PathBuf>,
}

/// Board and export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Title written into export footers
    #[serde(default = "default_board_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default = "default_board_export_directory")]
    pub export_directory: PathBuf,
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIRECTORY)
}

fn default_cache_max_size_mb() -> u64 {
    DEFAULT_CACHE_MAX_SIZE_MB
}

fn default_cache_max_age() -> Duration {
    parse_default(DEFAULT_CACHE_MAX_AGE)
}

fn default_cache_maintenance_interval() -> Duration {
    parse_default(DEFAULT_CACHE_MAINTENANCE_INTERVAL)
}

fn default_fetch_base_url() -> String {
    DEFAULT_FETCH_BASE_URL.to_string()
}

fn default_fetch_resolution() -> u32 {
    DEFAULT_FETCH_RESOLUTION
}

fn default_fetch_request_timeout() -> Duration {
    parse_default(DEFAULT_FETCH_REQUEST_TIMEOUT)
}

fn default_fetch_connect_timeout() -> Duration {
    parse_default(DEFAULT_FETCH_CONNECT_TIMEOUT)
}

fn default_fetch_failure_cooldown() -> Duration {
    parse_default(DEFAULT_FETCH_FAILURE_COOLDOWN)
}

fn default_fetch_max_concurrent() -> usize {
    DEFAULT_FETCH_MAX_CONCURRENT
}

fn default_search_max_results() -> usize {
    DEFAULT_SEARCH_MAX_RESULTS
}

fn default_search_max_fetches_per_query() -> usize {
    DEFAULT_SEARCH_MAX_FETCHES_PER_QUERY
}

fn default_search_parallel_fetches() -> usize {
    DEFAULT_SEARCH_PARALLEL_FETCHES
}

fn default_search_locale() -> String {
    DEFAULT_SEARCH_LOCALE.to_string()
}

fn default_search_remote_fallback() -> bool {
    DEFAULT_SEARCH_REMOTE_FALLBACK
}

fn default_speech_enabled() -> bool {
    DEFAULT_SPEECH_ENABLED
}

fn default_speech_locale() -> String {
    DEFAULT_SPEECH_LOCALE.to_string()
}

fn default_speech_rate() -> u32 {
    DEFAULT_SPEECH_RATE
}

fn default_board_title() -> String {
    DEFAULT_BOARD_TITLE.to_string()
}

fn default_board_export_directory() -> PathBuf {
    PathBuf::from(DEFAULT_BOARD_EXPORT_DIRECTORY)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            max_size_mb: default_cache_max_size_mb(),
            max_age: default_cache_max_age(),
            maintenance_interval: default_cache_maintenance_interval(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Directory holding pictogram files and their sidecars.
    #[must_use]
    pub fn pictogram_directory(&self) -> PathBuf {
        self.directory.join("pictograms")
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_fetch_base_url(),
            resolution: default_fetch_resolution(),
            request_timeout: default_fetch_request_timeout(),
            connect_timeout: default_fetch_connect_timeout(),
            failure_cooldown: default_fetch_failure_cooldown(),
            max_concurrent: default_fetch_max_concurrent(),
            offline: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_search_max_results(),
            max_fetches_per_query: default_search_max_fetches_per_query(),
            parallel_fetches: default_search_parallel_fetches(),
            default_locale: default_search_locale(),
            remote_fallback: default_search_remote_fallback(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_speech_enabled(),
            locale: default_speech_locale(),
            rate: default_speech_rate(),
            voice_directories: Vec::new(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            title: default_board_title(),
            author: None,
            export_directory: default_board_export_directory(),
        }
    }
}

impl Config {
    /// Load configuration from `config_file`, layered with `PECS_BOARD_*` environment variables.
    ///
    /// A missing file is created with the default configuration.
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        if !std::path::Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())
                .map_err(|e| AppError::configuration(format!("Failed to render defaults: {e}")))?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate().map_err(AppError::configuration)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.fetch.base_url)
            .map_err(|e| format!("fetch.base_url '{}' is not a URL: {e}", self.fetch.base_url))?;

        if self.fetch.resolution == 0 {
            return Err("fetch.resolution must be greater than 0".to_string());
        }
        if self.fetch.max_concurrent == 0 {
            return Err("fetch.max_concurrent must be greater than 0".to_string());
        }
        if self.search.max_results == 0 {
            return Err("search.max_results must be greater than 0".to_string());
        }
        if self.search.parallel_fetches == 0 {
            return Err("search.parallel_fetches must be greater than 0".to_string());
        }
        if self.search.default_locale.trim().is_empty() {
            return Err("search.default_locale must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.max_size_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.cache.max_age, Duration::from_secs(90 * 24 * 3600));
        assert_eq!(config.fetch.base_url, "https://api.arasaac.org/v1");
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.fetch.failure_cooldown, Duration::from_secs(60));
        assert_eq!(config.search.max_fetches_per_query, 8);
        assert_eq!(config.search.default_locale, "sv");
        assert!(!config.search.remote_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        Jail::expect_with(|jail| {
            let config = Config::load_from_file("pecs-board.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.search.max_results, DEFAULT_SEARCH_MAX_RESULTS);
            assert!(jail.directory().join("pecs-board.toml").exists());

            let reloaded = Config::load_from_file("pecs-board.toml").map_err(|e| e.to_string())?;
            assert_eq!(reloaded.cache.max_age, config.cache.max_age);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_environment_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pecs-board.toml",
                r#"
                [cache]
                max_size_mb = 16
                max_age = "7d"

                [fetch]
                failure_cooldown = "5m"
                max_concurrent = 8
                "#,
            )?;
            jail.set_env("PECS_BOARD_FETCH__MAX_CONCURRENT", "2");
            jail.set_env("PECS_BOARD_SEARCH__DEFAULT_LOCALE", "en");

            let config = Config::load_from_file("pecs-board.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.cache.max_size_mb, 16);
            assert_eq!(config.cache.max_age, Duration::from_secs(7 * 24 * 3600));
            assert_eq!(config.fetch.failure_cooldown, Duration::from_secs(300));
            assert_eq!(config.fetch.max_concurrent, 2);
            assert_eq!(config.search.default_locale, "en");
            assert_eq!(config.search.max_results, DEFAULT_SEARCH_MAX_RESULTS);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pecs-board.toml",
                r#"
                [fetch]
                base_url = "not a url"
                "#,
            )?;
            let err = Config::load_from_file("pecs-board.toml").unwrap_err();
            assert!(matches!(err, AppError::Configuration { .. }));
            Ok(())
        });
    }
}
