use crate::config::types::{
    BotConfig, Config, CrawlerConfig, DictionaryEntry, SearchConfig, SiteEntry, StorageConfig,
};
use crate::morphology::Language;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_bot_config(&config.bot)?;
    validate_crawler_config(&config.crawler)?;
    validate_search_config(&config.search)?;
    validate_storage_config(&config.storage)?;
    validate_dictionaries(&config.morphology.dictionaries)?;
    validate_sites(&config.sites)?;
    Ok(())
}

fn validate_bot_config(config: &BotConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer: {}", e)))?;
    }

    let interval = config.requests_interval;
    if let Some(max) = interval.max {
        if max < interval.min {
            tracing::warn!(
                "requests-interval max ({}ms) is lower than min ({}ms) and will be ignored",
                max,
                interval.min
            );
        }
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-pages must be between 1 and 100, got {}",
            config.max_concurrent_pages
        )));
    }

    if config.fetch_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.words_range < 1 {
        return Err(ConfigError::Validation(format!(
            "words-range must be >= 1, got {}",
            config.words_range
        )));
    }

    if config.spoiler_threshold < 1 {
        return Err(ConfigError::Validation(
            "spoiler-threshold must be >= 1".to_string(),
        ));
    }

    if config.default_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "default-limit must be >= 1, got {}",
            config.default_limit
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_dictionaries(entries: &[DictionaryEntry]) -> Result<(), ConfigError> {
    for entry in entries {
        if Language::from_code(&entry.language).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown dictionary language '{}', expected 'ru' or 'en'",
                entry.language
            )));
        }

        if entry.path.is_empty() {
            return Err(ConfigError::Validation(
                "Dictionary path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "At least one site must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for site in sites {
        if site.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Site '{}' must have a name",
                site.url
            )));
        }

        let url = Url::parse(&site.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site URL '{}': {}", site.url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Site URL '{}' must use HTTP or HTTPS",
                site.url
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Site URL '{}' has no host",
                site.url
            )));
        }

        if !seen.insert(site.url.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' is configured more than once",
                site.url
            )));
        }
    }

    Ok(())
}
