use serde::Deserialize;

/// Main configuration structure for Site-Search
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub morphology: MorphologyConfig,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

/// How the crawler identifies itself and paces its requests
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(default)]
    pub referer: Option<String>,

    /// Delay window before every page fetch
    #[serde(rename = "requests-interval", default)]
    pub requests_interval: RequestsInterval,
}

/// Pacing window in milliseconds
///
/// When `max` is absent or lower than `min`, the delay is exactly `min`.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct RequestsInterval {
    #[serde(default)]
    pub min: u64,

    #[serde(default)]
    pub max: Option<u64>,
}

/// Worker pool and fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of pages analyzed at the same time
    #[serde(rename = "max-concurrent-pages", default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: u32,

    /// Connect/read timeout for a single fetch
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: default_max_concurrent_pages(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Search result presentation settings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Significant words shown on each side of a highlighted lemma
    #[serde(rename = "words-range", default = "default_words_range")]
    pub words_range: usize,

    /// Snippet length after which the rest is folded away
    #[serde(rename = "spoiler-threshold", default = "default_spoiler_threshold")]
    pub spoiler_threshold: usize,

    #[serde(rename = "default-limit", default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            words_range: default_words_range(),
            spoiler_threshold: default_spoiler_threshold(),
            default_limit: default_limit(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Extra lexicon files for the morphology providers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MorphologyConfig {
    #[serde(default)]
    pub dictionaries: Vec<DictionaryEntry>,
}

/// A dictionary file bound to one language
#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryEntry {
    /// Language code, `ru` or `en`
    pub language: String,
    pub path: String,
}

/// A site to index
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Root URL without a trailing slash
    pub url: String,
    pub name: String,
}

fn default_max_concurrent_pages() -> u32 {
    8
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_words_range() -> usize {
    2
}

fn default_spoiler_threshold() -> usize {
    270
}

fn default_limit() -> i64 {
    20
}
