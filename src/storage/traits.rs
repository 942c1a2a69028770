//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::SiteStatus;
use crate::storage::{IndexDiff, IndexEntry, LemmaRecord, PageRecord, SiteRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Any backend honoring the uniqueness and cascade-delete constraints of the
/// four entities, and applying an `IndexDiff` atomically, can stand in for
/// SQLite.
pub trait Storage {
    // ===== Site Management =====

    /// Deletes a site with everything under it and recreates it as INDEXING
    fn reset_site(&mut self, url: &str, name: &str) -> StorageResult<SiteRecord>;

    /// Creates a new INDEXING site
    fn create_site(&mut self, url: &str, name: &str) -> StorageResult<SiteRecord>;

    /// Gets a site by ID
    fn get_site(&self, site_id: i64) -> StorageResult<SiteRecord>;

    /// Gets a site by its root URL
    fn get_site_by_url(&self, url: &str) -> StorageResult<Option<SiteRecord>>;

    /// Gets all sites ordered by ID
    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>>;

    /// Sets the site's status time to now
    fn touch_site(&mut self, site_id: i64) -> StorageResult<()>;

    /// Unconditionally sets the status and last error of a site
    fn update_site_status(
        &mut self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    /// Sets the status only if the site is currently in `from`
    ///
    /// # Returns
    ///
    /// True if this call performed the transition
    fn transition_site_status(
        &mut self,
        site_id: i64,
        from: SiteStatus,
        to: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<bool>;

    // ===== Page Management =====

    /// Inserts a page; fails if the path already exists for the site
    fn insert_page(
        &mut self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
    ) -> StorageResult<PageRecord>;

    /// Inserts processing placeholders for paths without a page row
    ///
    /// # Returns
    ///
    /// Only the pages created by this call, in input order
    fn insert_placeholder_pages(
        &mut self,
        site_id: i64,
        paths: &[String],
    ) -> StorageResult<Vec<PageRecord>>;

    /// Stores the outcome of a fetch
    fn update_page_fetch(&mut self, page_id: i64, code: u16, content: &str) -> StorageResult<()>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Gets a page by site and path
    fn find_page(&self, site_id: i64, path: &str) -> StorageResult<Option<PageRecord>>;

    /// Deletes a page and its index rows
    fn delete_page(&mut self, page_id: i64) -> StorageResult<()>;

    // ===== Lemma Index =====

    /// Gets the site's lemma rows whose text is in `lemmas`
    fn find_lemmas(&self, site_id: i64, lemmas: &[String]) -> StorageResult<Vec<LemmaRecord>>;

    /// Gets the index rows of a page joined with their lemmas
    fn find_page_indexes(&self, page_id: i64) -> StorageResult<Vec<IndexEntry>>;

    /// Applies an index diff in one transaction, deletions first
    fn apply_index_diff(&mut self, diff: &IndexDiff) -> StorageResult<()>;

    /// Gets page ID -> rank for every page indexing the lemma
    fn find_lemma_ranks(&self, lemma_id: i64) -> StorageResult<HashMap<i64, f64>>;

    /// Gets page ID -> rank for the lemma, restricted to the given pages
    fn find_lemma_ranks_in_pages(
        &self,
        lemma_id: i64,
        page_ids: &[i64],
    ) -> StorageResult<HashMap<i64, f64>>;

    // ===== Statistics =====

    /// Counts the pages of a site
    fn count_pages(&self, site_id: i64) -> StorageResult<u64>;

    /// Counts the lemmas of a site
    fn count_lemmas(&self, site_id: i64) -> StorageResult<u64>;

    /// Lists lemmas whose frequency differs from the number of pages indexing them
    ///
    /// Returns `(lemma, stored frequency, counted pages)` triples; empty when
    /// the site's aggregates are consistent.
    fn lemma_frequency_mismatches(&self, site_id: i64)
        -> StorageResult<Vec<(String, i64, i64)>>;
}
