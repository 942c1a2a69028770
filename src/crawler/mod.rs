//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with content type classification and pacing
//! - HTML parsing: text, title and site link extraction
//! - The recursive page task tree with cooperative cancellation
//! - Global crawl start/stop coordination

mod fetcher;
mod manager;
mod parser;
mod task;

pub use fetcher::{
    build_http_client, is_analyzable, pacing_delay, FetchOutcome, HttpFetcher, PageFetcher,
};
pub use manager::{ControlError, CrawlManager, CrawlPhase, PageJob, STOPPED_BY_USER};
pub use parser::{extract_site_links, extract_title, html_to_text};
pub use task::{CrawlContext, PageTask, SiteContext, TaskHandle};
