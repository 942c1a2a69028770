use crate::storage::StorageError;
use crate::SiteSearchError;
use thiserror::Error;

/// A ranked full-text query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    /// Restricts the search to one configured site
    pub site: Option<String>,
    /// Page size; the configured default when absent
    pub limit: Option<i64>,
    pub offset: i64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Number of matching pages before pagination
    pub count: usize,
    pub items: Vec<SearchItem>,
}

/// A matching page
#[derive(Debug, Clone, PartialEq)]
pub struct SearchItem {
    pub site_url: String,
    pub site_name: String,
    /// Page path relative to the site
    pub uri: String,
    pub title: String,
    /// Text excerpt with `<b>` highlights
    pub snippet: String,
    /// Summed rank relative to the best match, in `(0, 1]`
    pub relevance: f64,
}

/// Reasons a search is rejected
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Empty search query")]
    EmptyQuery,

    #[error("Limit must be positive, got {0}")]
    InvalidLimit(i64),

    #[error("Offset must not be negative, got {0}")]
    InvalidOffset(i64),

    #[error("Site {0} is not in the configuration file")]
    SiteNotConfigured(String),

    #[error("Site {0} has not been indexed yet")]
    SiteNotIndexed(String),

    #[error("Indexing of {0} is not finished yet")]
    IndexingIncomplete(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SiteSearchError> for SearchError {
    fn from(err: SiteSearchError) -> Self {
        SearchError::Internal(err.to_string())
    }
}

impl From<StorageError> for SearchError {
    fn from(err: StorageError) -> Self {
        SearchError::Internal(err.to_string())
    }
}
