//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::SiteStatus;
use crate::storage::schema::{initialize_schema, PROCESSING_CODE};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{IndexDiff, IndexEntry, LemmaRecord, PageRecord, SiteRecord};
use crate::Result;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// Maximum number of values bound into one `IN (...)` list
const IN_CHUNK: usize = 500;

const SITE_COLUMNS: &str = "id, url, name, status, status_time, last_error";
const PAGE_COLUMNS: &str = "id, site_id, path, code, content";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SiteSearchError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn insert_site(&mut self, url: &str, name: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sites (url, name, status, status_time) VALUES (?1, ?2, ?3, ?4)",
            params![url, name, SiteStatus::Indexing.to_db_string(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        status: SiteStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(SiteStatus::Failed),
        status_time: row.get(4)?,
        last_error: row.get(5)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        path: row.get(2)?,
        code: row.get(3)?,
        content: row.get(4)?,
    })
}

fn lemma_from_row(row: &Row<'_>) -> rusqlite::Result<LemmaRecord> {
    Ok(LemmaRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        lemma: row.get(2)?,
        frequency: row.get(3)?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl Storage for SqliteStorage {
    // ===== Site Management =====

    fn reset_site(&mut self, url: &str, name: &str) -> StorageResult<SiteRecord> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sites WHERE url = ?1", params![url])?;
        tx.execute(
            "INSERT INTO sites (url, name, status, status_time) VALUES (?1, ?2, ?3, ?4)",
            params![url, name, SiteStatus::Indexing.to_db_string(), now],
        )?;
        let site_id = tx.last_insert_rowid();
        tx.commit()?;

        self.get_site(site_id)
    }

    fn create_site(&mut self, url: &str, name: &str) -> StorageResult<SiteRecord> {
        let site_id = self.insert_site(url, name)?;
        self.get_site(site_id)
    }

    fn get_site(&self, site_id: i64) -> StorageResult<SiteRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
                params![site_id],
                site_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::SiteNotFound(format!("Site ID {}", site_id)))
    }

    fn get_site_by_url(&self, url: &str) -> StorageResult<Option<SiteRecord>> {
        let site = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE url = ?1", SITE_COLUMNS),
                params![url],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM sites ORDER BY id", SITE_COLUMNS))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sites)
    }

    fn touch_site(&mut self, site_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE sites SET status_time = ?1 WHERE id = ?2",
            params![now, site_id],
        )?;
        Ok(())
    }

    fn update_site_status(
        &mut self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE sites SET status = ?1, status_time = ?2, last_error = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, last_error, site_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SiteNotFound(format!("Site ID {}", site_id)));
        }
        Ok(())
    }

    fn transition_site_status(
        &mut self,
        site_id: i64,
        from: SiteStatus,
        to: SiteStatus,
        last_error: Option<&str>,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE sites SET status = ?1, status_time = ?2, last_error = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                to.to_db_string(),
                now,
                last_error,
                site_id,
                from.to_db_string()
            ],
        )?;
        Ok(updated == 1)
    }

    // ===== Page Management =====

    fn insert_page(
        &mut self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
    ) -> StorageResult<PageRecord> {
        self.conn
            .execute(
                "INSERT INTO pages (site_id, path, code, content) VALUES (?1, ?2, ?3, ?4)",
                params![site_id, path, code, content],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::ConstraintViolation(format!(
                        "Page {} already exists for site {}",
                        path, site_id
                    ))
                }
                other => StorageError::Sqlite(other),
            })?;

        Ok(PageRecord {
            id: self.conn.last_insert_rowid(),
            site_id,
            path: path.to_string(),
            code,
            content: content.to_string(),
        })
    }

    fn insert_placeholder_pages(
        &mut self,
        site_id: i64,
        paths: &[String],
    ) -> StorageResult<Vec<PageRecord>> {
        let tx = self.conn.transaction()?;
        let mut created = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pages (site_id, path, code, content) VALUES (?1, ?2, ?3, '')",
            )?;
            for path in paths {
                let inserted = stmt.execute(params![site_id, path, PROCESSING_CODE])?;
                if inserted == 1 {
                    created.push(PageRecord {
                        id: tx.last_insert_rowid(),
                        site_id,
                        path: path.clone(),
                        code: PROCESSING_CODE,
                        content: String::new(),
                    });
                }
            }
        }
        tx.commit()?;
        Ok(created)
    }

    fn update_page_fetch(&mut self, page_id: i64, code: u16, content: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE pages SET code = ?1, content = ?2 WHERE id = ?3",
            params![code, content, page_id],
        )?;
        if updated == 0 {
            return Err(StorageError::PageNotFound(format!("Page ID {}", page_id)));
        }
        Ok(())
    }

    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::PageNotFound(format!("Page ID {}", page_id)))
    }

    fn find_page(&self, site_id: i64, path: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE site_id = ?1 AND path = ?2",
                    PAGE_COLUMNS
                ),
                params![site_id, path],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn delete_page(&mut self, page_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM pages WHERE id = ?1", params![page_id])?;
        Ok(())
    }

    // ===== Lemma Index =====

    fn find_lemmas(&self, site_id: i64, lemmas: &[String]) -> StorageResult<Vec<LemmaRecord>> {
        let mut records = Vec::new();

        for chunk in lemmas.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT id, site_id, lemma, frequency FROM lemmas
                 WHERE site_id = ? AND lemma IN ({})",
                placeholders(chunk.len())
            );
            let mut values = vec![Value::Integer(site_id)];
            values.extend(chunk.iter().map(|lemma| Value::Text(lemma.clone())));

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), lemma_from_row)?;
            for row in rows {
                records.push(row?);
            }
        }

        Ok(records)
    }

    fn find_page_indexes(&self, page_id: i64) -> StorageResult<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.page_id, i.lemma_id, l.lemma, l.frequency, i.lemma_rank
             FROM indexes i JOIN lemmas l ON l.id = i.lemma_id
             WHERE i.page_id = ?1
             ORDER BY i.id",
        )?;

        let entries = stmt
            .query_map(params![page_id], |row| {
                Ok(IndexEntry {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    lemma_id: row.get(2)?,
                    lemma: row.get(3)?,
                    frequency: row.get(4)?,
                    rank: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn apply_index_diff(&mut self, diff: &IndexDiff) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        for index_id in &diff.deleted_indexes {
            tx.execute("DELETE FROM indexes WHERE id = ?1", params![index_id])?;
        }

        for lemma_id in &diff.deleted_lemmas {
            tx.execute("DELETE FROM lemmas WHERE id = ?1", params![lemma_id])?;
        }

        let mut inserted: HashMap<&str, i64> = HashMap::new();
        for change in &diff.saved_lemmas {
            match change.id {
                Some(lemma_id) => {
                    tx.execute(
                        "UPDATE lemmas SET frequency = ?1 WHERE id = ?2",
                        params![change.frequency, lemma_id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO lemmas (site_id, lemma, frequency) VALUES (?1, ?2, ?3)",
                        params![diff.site_id, change.lemma, change.frequency],
                    )?;
                    inserted.insert(change.lemma.as_str(), tx.last_insert_rowid());
                }
            }
        }

        for change in &diff.saved_indexes {
            match change.id {
                Some(index_id) => {
                    tx.execute(
                        "UPDATE indexes SET lemma_rank = ?1 WHERE id = ?2",
                        params![change.rank, index_id],
                    )?;
                }
                None => {
                    let lemma_id = change
                        .lemma_id
                        .or_else(|| inserted.get(change.lemma.as_str()).copied())
                        .ok_or_else(|| {
                            StorageError::ConstraintViolation(format!(
                                "Index for page {} references unknown lemma '{}'",
                                diff.page_id, change.lemma
                            ))
                        })?;
                    tx.execute(
                        "INSERT INTO indexes (page_id, lemma_id, lemma_rank) VALUES (?1, ?2, ?3)",
                        params![diff.page_id, lemma_id, change.rank],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn find_lemma_ranks(&self, lemma_id: i64) -> StorageResult<HashMap<i64, f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_id, lemma_rank FROM indexes WHERE lemma_id = ?1")?;
        let ranks = stmt
            .query_map(params![lemma_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<i64, f64>>>()?;
        Ok(ranks)
    }

    fn find_lemma_ranks_in_pages(
        &self,
        lemma_id: i64,
        page_ids: &[i64],
    ) -> StorageResult<HashMap<i64, f64>> {
        let mut ranks = HashMap::new();

        for chunk in page_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT page_id, lemma_rank FROM indexes
                 WHERE lemma_id = ? AND page_id IN ({})",
                placeholders(chunk.len())
            );
            let mut values = vec![Value::Integer(lemma_id)];
            values.extend(chunk.iter().map(|id| Value::Integer(*id)));

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (page_id, rank) = row?;
                ranks.insert(page_id, rank);
            }
        }

        Ok(ranks)
    }

    // ===== Statistics =====

    fn count_pages(&self, site_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_lemmas(&self, site_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM lemmas WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn lemma_frequency_mismatches(
        &self,
        site_id: i64,
    ) -> StorageResult<Vec<(String, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.lemma, l.frequency, COUNT(DISTINCT i.page_id) AS pages
             FROM lemmas l LEFT JOIN indexes i ON i.lemma_id = l.id
             WHERE l.site_id = ?1
             GROUP BY l.id
             HAVING l.frequency != pages
             ORDER BY l.lemma",
        )?;
        let mismatches = stmt
            .query_map(params![site_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(mismatches)
    }
}
