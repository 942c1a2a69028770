use crate::{Result, SiteSearchError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lock shards keyed by entity id
///
/// Each key gets its own mutex, created on first use and dropped again once
/// no caller holds or waits on it. Work for different keys runs in parallel;
/// work for the same key is serialized.
pub struct KeyedLocks {
    name: &'static str,
    shards: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` while holding the lock for `key`
    pub fn with_lock<T>(&self, key: i64, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let shard = {
            let mut shards = self.shards()?;
            Arc::clone(shards.entry(key).or_default())
        };

        let result = {
            let _guard = shard
                .lock()
                .map_err(|_| SiteSearchError::LockPoisoned(self.name))?;
            f()
        };

        // Clones are only handed out under the map lock, so a count of two
        // (the map and `shard`) means nobody else is waiting on the key.
        let mut shards = self.shards()?;
        if shards
            .get(&key)
            .is_some_and(|held| Arc::ptr_eq(held, &shard) && Arc::strong_count(held) == 2)
        {
            shards.remove(&key);
        }

        result
    }

    /// True if no key currently has a shard
    pub fn is_empty(&self) -> bool {
        self.shards().map(|shards| shards.is_empty()).unwrap_or(false)
    }

    fn shards(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Arc<Mutex<()>>>>> {
        self.shards
            .lock()
            .map_err(|_| SiteSearchError::LockPoisoned(self.name))
    }
}
