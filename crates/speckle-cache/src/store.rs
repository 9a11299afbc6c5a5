// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object cache abstraction
//!
//! Content-addressed key/value store: record id -> record JSON.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Content-addressed object cache.
///
/// Entries are immutable once written through the insert-if-absent paths;
/// only [`replace`](ObjectCache::replace) overwrites. Every method is
/// synchronous and callable from many threads at once.
///
/// # Implementations
///
/// - `SqliteCache` -- pooled on-disk store
/// - `MemoryCache` -- process-local map
pub trait ObjectCache: Send + Sync {
    fn has(&self, id: &str) -> Result<bool>;

    fn get(&self, id: &str) -> Result<Option<String>>;

    /// Store `json` unless `id` is present. Returns true if it was written.
    fn insert_if_absent(&self, id: &str, json: &str) -> Result<bool>;

    /// Upsert; for rewrite/migration only.
    fn replace(&self, id: &str, json: &str) -> Result<()>;

    /// Insert-if-absent for many entries. Returns the number written.
    fn bulk_insert_if_absent(&self, items: &[(String, String)]) -> Result<usize>;

    /// Returns true if an entry was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn get_all(&self) -> Result<Vec<(String, String)>>;

    fn count(&self) -> Result<usize>;

    fn clear(&self) -> Result<()>;
}

/// In-process cache, lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectCache for MemoryCache {
    fn has(&self, id: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(id))
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn insert_if_absent(&self, id: &str, json: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.contains_key(id) {
            return Ok(false);
        }
        entries.insert(id.to_string(), json.to_string());
        Ok(true)
    }

    fn replace(&self, id: &str, json: &str) -> Result<()> {
        self.entries.write().insert(id.to_string(), json.to_string());
        Ok(())
    }

    fn bulk_insert_if_absent(&self, items: &[(String, String)]) -> Result<usize> {
        let mut entries = self.entries.write();
        let mut written = 0;
        for (id, json) in items {
            if !entries.contains_key(id) {
                entries.insert(id.clone(), json.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().remove(id).is_some())
    }

    fn get_all(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}
