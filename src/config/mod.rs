//! Configuration module for Site-Search
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use site_search::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Snippet window: {}", config.search.words_range);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BotConfig, Config, CrawlerConfig, DictionaryEntry, MorphologyConfig, RequestsInterval,
    SearchConfig, SiteEntry, StorageConfig,
};

// Re-export parser functions
pub use parser::{
    canonical_site_url, compute_config_hash, load_config, load_config_with_hash, parse_config,
};
