//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and referer
//! - GET requests to fetch page content
//! - Content type checks
//! - Error classification
//! - Pacing delays between requests

use crate::config::{BotConfig, CrawlerConfig, RequestsInterval};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Content types whose body is analyzed as page text
const ANALYZABLE_CONTENT_TYPES: &[&str] = &["application/xhtml+xml", "application/xml"];

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Successfully fetched a text page
    Success {
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Server answered with an error status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Response body is not text
    UnsupportedContent {
        /// The Content-Type received
        content_type: String,
    },

    /// Network or decoding failure
    Failed {
        /// Error description
        error: String,
    },
}

/// Fetches pages for the crawler
///
/// The trait boundary lets tests script fetch outcomes without a network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `bot` - User agent and referer settings
/// * `crawler` - Fetch timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(bot: &BotConfig, crawler: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Some(referer) = &bot.referer {
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
    }

    let timeout = Duration::from_secs(crawler.fetch_timeout_secs);

    Client::builder()
        .user_agent(bot.user_agent.clone())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if a response with this Content-Type is analyzed
///
/// A missing Content-Type is treated as text.
pub fn is_analyzable(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    mime.is_empty() || mime.starts_with("text/") || ANALYZABLE_CONTENT_TYPES.contains(&mime.as_str())
}

/// Draws the delay to wait before the next request of a site
///
/// Uniform in `[min, max]` milliseconds; exactly `min` when `max` is absent
/// or lower than `min`.
pub fn pacing_delay(interval: RequestsInterval) -> Duration {
    let millis = match interval.max {
        Some(max) if max > interval.min => interval.min + fastrand::u64(0..=max - interval.min),
        _ => interval.min,
    };
    Duration::from_millis(millis)
}

/// Page fetcher backed by a reqwest client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(bot: &BotConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(bot, crawler)?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL and classifies the response
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | Status >= 400 | HttpError with that status |
    /// | Non-text Content-Type | UnsupportedContent |
    /// | Connection, timeout, redirect or body error | Failed |
    /// | Otherwise | Success |
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return FetchOutcome::HttpError {
                status_code: status.as_u16(),
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_analyzable(content_type.as_deref()) {
            return FetchOutcome::UnsupportedContent {
                content_type: content_type.unwrap_or_default(),
            };
        }

        match response.text().await {
            Ok(body) => FetchOutcome::Success {
                status_code: status.as_u16(),
                body,
            },
            Err(e) => FetchOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}
