use super::locks::KeyedLocks;
use crate::storage::{
    self, IndexChange, IndexDiff, IndexEntry, LemmaChange, LemmaRecord, SharedStorage, Storage,
};
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Computes the lemma and index changes for re-analyzing one page
///
/// # Arguments
///
/// * `lemmas` - New lemma counts of the page
/// * `site_lemmas` - Existing site lemma rows matching the new lemma names
/// * `page_indexes` - Index rows the page had before, with their lemmas
///
/// Lemmas the page already used keep their frequency, lemmas new to the page
/// gain one, lemmas unknown to the site start at one. Lemmas the page no
/// longer uses lose one, or are deleted when this page was their last user.
/// Index rows whose rank is unchanged are left alone.
pub fn plan_index_diff(
    site_id: i64,
    page_id: i64,
    lemmas: &HashMap<String, usize>,
    site_lemmas: &[LemmaRecord],
    page_indexes: &[IndexEntry],
) -> IndexDiff {
    let mut diff = IndexDiff {
        site_id,
        page_id,
        ..Default::default()
    };

    let lemma_cache: HashMap<&str, &LemmaRecord> = site_lemmas
        .iter()
        .map(|record| (record.lemma.as_str(), record))
        .collect();
    let used: HashMap<i64, &IndexEntry> = page_indexes
        .iter()
        .map(|entry| (entry.lemma_id, entry))
        .collect();

    let mut touched_lemmas = HashSet::new();
    let mut kept_indexes = HashSet::new();

    let mut names: Vec<&String> = lemmas.keys().collect();
    names.sort();

    for name in names {
        let rank = lemmas[name] as f64;

        let Some(record) = lemma_cache.get(name.as_str()) else {
            diff.saved_lemmas.push(LemmaChange {
                id: None,
                lemma: name.clone(),
                frequency: 1,
            });
            diff.saved_indexes.push(IndexChange {
                id: None,
                lemma_id: None,
                lemma: name.clone(),
                rank,
            });
            continue;
        };

        touched_lemmas.insert(record.id);

        match used.get(&record.id) {
            Some(entry) => {
                kept_indexes.insert(entry.id);
                if entry.rank != rank {
                    diff.saved_indexes.push(IndexChange {
                        id: Some(entry.id),
                        lemma_id: Some(record.id),
                        lemma: name.clone(),
                        rank,
                    });
                }
            }
            None => {
                diff.saved_lemmas.push(LemmaChange {
                    id: Some(record.id),
                    lemma: name.clone(),
                    frequency: record.frequency + 1,
                });
                diff.saved_indexes.push(IndexChange {
                    id: None,
                    lemma_id: Some(record.id),
                    lemma: name.clone(),
                    rank,
                });
            }
        }
    }

    for entry in page_indexes {
        if touched_lemmas.contains(&entry.lemma_id) {
            continue;
        }
        if entry.frequency > 1 {
            diff.saved_lemmas.push(LemmaChange {
                id: Some(entry.lemma_id),
                lemma: entry.lemma.clone(),
                frequency: entry.frequency - 1,
            });
        } else {
            diff.deleted_lemmas.push(entry.lemma_id);
        }
    }

    diff.deleted_indexes = page_indexes
        .iter()
        .filter(|entry| !kept_indexes.contains(&entry.id))
        .map(|entry| entry.id)
        .collect();

    diff
}

/// Keeps a site's lemma and index rows in step with its pages
///
/// Every commit for a site runs under that site's lock, so the
/// read-plan-write cycle of one page never interleaves with another page of
/// the same site.
#[derive(Clone)]
pub struct IndexMaintainer {
    storage: SharedStorage,
    site_locks: Arc<KeyedLocks>,
}

impl IndexMaintainer {
    pub fn new(storage: SharedStorage, site_locks: Arc<KeyedLocks>) -> Self {
        Self {
            storage,
            site_locks,
        }
    }

    pub fn site_locks(&self) -> &Arc<KeyedLocks> {
        &self.site_locks
    }

    /// Replaces the page's index contribution with the given lemma counts
    ///
    /// # Returns
    ///
    /// The diff that was applied
    pub fn commit(
        &self,
        site_id: i64,
        page_id: i64,
        lemmas: &HashMap<String, usize>,
    ) -> Result<IndexDiff> {
        self.site_locks.with_lock(site_id, || {
            let diff = self.plan(site_id, page_id, lemmas)?;
            if !diff.is_empty() {
                storage::lock(&self.storage)?.apply_index_diff(&diff)?;
            }
            tracing::trace!(
                "Page {} index diff: {} lemmas saved, {} deleted, {} indexes saved, {} deleted",
                page_id,
                diff.saved_lemmas.len(),
                diff.deleted_lemmas.len(),
                diff.saved_indexes.len(),
                diff.deleted_indexes.len()
            );
            Ok(diff)
        })
    }

    /// Removes the page's index contribution, then the page itself
    pub fn clear_page(&self, site_id: i64, page_id: i64) -> Result<()> {
        self.site_locks.with_lock(site_id, || {
            let diff = self.plan(site_id, page_id, &HashMap::new())?;
            let mut storage = storage::lock(&self.storage)?;
            if !diff.is_empty() {
                storage.apply_index_diff(&diff)?;
            }
            storage.delete_page(page_id)?;
            Ok(())
        })
    }

    fn plan(
        &self,
        site_id: i64,
        page_id: i64,
        lemmas: &HashMap<String, usize>,
    ) -> Result<IndexDiff> {
        let names: Vec<String> = lemmas.keys().cloned().collect();
        let storage = storage::lock(&self.storage)?;
        let site_lemmas = storage.find_lemmas(site_id, &names)?;
        let page_indexes = storage.find_page_indexes(page_id)?;
        Ok(plan_index_diff(
            site_id,
            page_id,
            lemmas,
            &site_lemmas,
            &page_indexes,
        ))
    }
}
