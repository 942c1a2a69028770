//! Site-Search: a lemma-indexing crawler for a fixed set of web sites
//!
//! This crate crawls the configured sites, reduces page text to normalized
//! lemmas, keeps a per-site inverted index consistent across re-crawls and
//! answers ranked full-text queries with highlighted snippets.

pub mod config;
pub mod crawler;
pub mod index;
pub mod lemma;
pub mod morphology;
pub mod output;
pub mod search;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Search operations
#[derive(Debug, Error)]
pub enum SiteSearchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid dictionary {path}, line {line}: {message}")]
    Dictionary {
        path: String,
        line: usize,
        message: String,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("URL \"{url}\" must start with \"{root}\" or with \"/\"")]
    ForeignOrigin { url: String, root: String },

    #[error("URL is empty")]
    Empty,
}

/// Result type alias for Site-Search operations
pub type Result<T> = std::result::Result<T, SiteSearchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{ControlError, CrawlManager};
pub use lemma::{LemmaExtractor, SnippetBuilder};
pub use morphology::Morphology;
pub use search::{SearchEngine, SearchError, SearchRequest};
pub use state::{SiteStatus, TaskState};
