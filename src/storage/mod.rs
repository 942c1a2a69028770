//! Storage module for persisting index data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Site lifecycle and page persistence
//! - Lemma and index rows, written as atomic diffs
//! - Aggregates for statistics and consistency checks

mod schema;
mod sqlite;
mod traits;

pub use schema::{FETCH_ERROR_CODE, PROCESSING_CODE, UNSUPPORTED_CONTENT_CODE};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::SiteStatus;
use crate::{SiteSearchError, Result};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between crawl tasks, the manager and search
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SiteSearchError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a storage for sharing
pub fn shared(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, reporting a poisoned lock as an error
pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| SiteSearchError::LockPoisoned("storage"))
}

/// Represents a site in the database
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: String,
    pub last_error: Option<String>,
}

/// Represents a page in the database
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub site_id: i64,
    /// Site-relative path, `/` for the root
    pub path: String,
    /// HTTP status or one of the sentinel codes
    pub code: u16,
    pub content: String,
}

impl PageRecord {
    /// Returns true while the page waits for its fetch
    pub fn is_processing(&self) -> bool {
        self.code == PROCESSING_CODE
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }
}

/// Represents a lemma of a site
#[derive(Debug, Clone, PartialEq)]
pub struct LemmaRecord {
    pub id: i64,
    pub site_id: i64,
    pub lemma: String,
    /// Number of pages of the site indexing this lemma
    pub frequency: i64,
}

/// An index row of a page together with its lemma
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: i64,
    pub page_id: i64,
    pub lemma_id: i64,
    pub lemma: String,
    pub frequency: i64,
    pub rank: f64,
}

/// A lemma row to insert (`id` is None) or update
#[derive(Debug, Clone, PartialEq)]
pub struct LemmaChange {
    pub id: Option<i64>,
    pub lemma: String,
    pub frequency: i64,
}

/// An index row to insert (`id` is None) or update
///
/// `lemma_id` is None when the lemma itself is inserted by the same diff;
/// it is then resolved by lemma text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexChange {
    pub id: Option<i64>,
    pub lemma_id: Option<i64>,
    pub lemma: String,
    pub rank: f64,
}

/// Lemma and index changes caused by re-analyzing one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexDiff {
    pub site_id: i64,
    pub page_id: i64,
    pub deleted_indexes: Vec<i64>,
    pub deleted_lemmas: Vec<i64>,
    pub saved_lemmas: Vec<LemmaChange>,
    pub saved_indexes: Vec<IndexChange>,
}

impl IndexDiff {
    /// Returns true if applying the diff changes nothing
    pub fn is_empty(&self) -> bool {
        self.deleted_indexes.is_empty()
            && self.deleted_lemmas.is_empty()
            && self.saved_lemmas.is_empty()
            && self.saved_indexes.is_empty()
    }
}
