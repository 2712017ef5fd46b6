/// Configuration default values
///
/// All default values for configuration options live here so they can be changed in one place.
// Cache defaults
pub const DEFAULT_CACHE_DIRECTORY: &str = "./data/cache";
pub const DEFAULT_CACHE_MAX_SIZE_MB: u64 = 256;
pub const DEFAULT_CACHE_MAX_AGE: &str = "90d";
pub const DEFAULT_CACHE_MAINTENANCE_INTERVAL: &str = "12h";

// Fetch defaults
pub const DEFAULT_FETCH_BASE_URL: &str = "https://api.arasaac.org/v1";
pub const DEFAULT_FETCH_RESOLUTION: u32 = 300;
pub const DEFAULT_FETCH_REQUEST_TIMEOUT: &str = "10s";
pub const DEFAULT_FETCH_CONNECT_TIMEOUT: &str = "5s";
pub const DEFAULT_FETCH_FAILURE_COOLDOWN: &str = "60s";
pub const DEFAULT_FETCH_MAX_CONCURRENT: usize = 4;

// Search defaults
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 50;
pub const DEFAULT_SEARCH_MAX_FETCHES_PER_QUERY: usize = 8;
pub const DEFAULT_SEARCH_PARALLEL_FETCHES: usize = 4;
pub const DEFAULT_SEARCH_LOCALE: &str = "sv";
pub const DEFAULT_SEARCH_REMOTE_FALLBACK: bool = false;

// Speech defaults
pub const DEFAULT_SPEECH_ENABLED: bool = true;
pub const DEFAULT_SPEECH_LOCALE: &str = "sv";
pub const DEFAULT_SPEECH_RATE: u32 = 130;

// Board defaults
pub const DEFAULT_BOARD_TITLE: &str = "PECS-bräda";
pub const DEFAULT_BOARD_EXPORT_DIRECTORY: &str = ".";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PECS_BOARD_";
