// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite object cache
//!
//! One database file per collection, one table:
//!
//! ```sql
//! CREATE TABLE objects (
//!     hash TEXT PRIMARY KEY,
//!     content TEXT
//! ) WITHOUT ROWID;
//! ```
//!
//! Calls borrow a pooled connection for their duration only; no transaction
//! spans two calls.

use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::pool::ConnectionPool;
use crate::store::ObjectCache;
use crossbeam::queue::SegQueue;
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction, TransactionBehavior};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Application folder under the per-user data directory.
pub const APP_DIR: &str = "Speckle";

/// Folder holding the per-stream databases.
pub const PROJECTS_DIR: &str = "Projects";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS objects (
    hash TEXT PRIMARY KEY,
    content TEXT
) WITHOUT ROWID;";

const BULK_PREFIX: &str = "INSERT OR IGNORE INTO objects (hash, content) VALUES ";

/// Pooled SQLite cache. `Send + Sync`; share it behind an `Arc`.
pub struct SqliteCache {
    pool: ConnectionPool,
    /// Reusable SQL text buffers for bulk statements.
    buffers: SegQueue<String>,
}

impl SqliteCache {
    /// Open (or create) the database at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, CacheOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: CacheOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(path, options)?;
        pool.get()?.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "object cache opened");
        Ok(Self {
            pool,
            buffers: SegQueue::new(),
        })
    }

    /// Open the cache of one stream under the per-user data directory.
    pub fn for_stream(stream_id: &str) -> Result<Self> {
        Self::open(stream_path(stream_id)?)
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    /// Connections opened so far.
    pub fn connections(&self) -> usize {
        self.pool.opened()
    }

    fn take_buffer(&self) -> String {
        let mut buf = self.buffers.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    fn insert_chunk(
        conn: &rusqlite::Connection,
        sql: &mut String,
        chunk: &[(String, String)],
    ) -> Result<usize> {
        sql.push_str(BULK_PREFIX);
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push(',');
            }
            let _ = write!(sql, "(?{}, ?{})", 2 * i + 1, 2 * i + 2);
        }

        let mut stmt = conn.prepare_cached(sql)?;
        let params = chunk.iter().flat_map(|(id, json)| [id.as_str(), json.as_str()]);
        Ok(stmt.execute(params_from_iter(params))?)
    }
}

/// `<data_dir>/Speckle/Projects/<stream_id>.db`
pub fn stream_path(stream_id: &str) -> Result<PathBuf> {
    let valid = !stream_id.is_empty()
        && stream_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        return Err(CacheError::InvalidKey(stream_id.to_string()));
    }

    let dirs = directories::BaseDirs::new().ok_or(CacheError::NoDataDir)?;
    Ok(dirs
        .data_dir()
        .join(APP_DIR)
        .join(PROJECTS_DIR)
        .join(format!("{stream_id}.db")))
}

impl ObjectCache for SqliteCache {
    fn has(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM objects WHERE hash = ?1 LIMIT 1")?;
        Ok(stmt.exists(params![id])?)
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare_cached("SELECT content FROM objects WHERE hash = ?1 LIMIT 1")?;
        Ok(stmt.query_row(params![id], |row| row.get(0)).optional()?)
    }

    fn insert_if_absent(&self, id: &str, json: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare_cached("INSERT OR IGNORE INTO objects (hash, content) VALUES (?1, ?2)")?;
        Ok(stmt.execute(params![id, json])? == 1)
    }

    fn replace(&self, id: &str, json: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare_cached("INSERT OR REPLACE INTO objects (hash, content) VALUES (?1, ?2)")?;
        stmt.execute(params![id, json])?;
        Ok(())
    }

    fn bulk_insert_if_absent(&self, items: &[(String, String)]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let conn = self.pool.get()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let mut sql = self.take_buffer();

        let mut written = 0;
        let mut outcome = Ok(());
        for chunk in items.chunks(self.pool.options().bulk_rows.max(1)) {
            sql.clear();
            match Self::insert_chunk(&tx, &mut sql, chunk) {
                Ok(n) => written += n,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.buffers.push(sql);

        outcome?;
        tx.commit()?;
        tracing::trace!(items = items.len(), written, "bulk insert");
        Ok(written)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached("DELETE FROM objects WHERE hash = ?1")?;
        Ok(stmt.execute(params![id])? > 0)
    }

    fn get_all(&self) -> Result<Vec<(String, String)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT hash, content FROM objects")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn clear(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM objects", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, SqliteCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(dir.path().join("objects.db")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_basic_operations() {
        let (_dir, cache) = cache();
        assert!(!cache.has("a").unwrap());
        assert_eq!(cache.get("a").unwrap(), None);

        assert!(cache.insert_if_absent("a", "{}").unwrap());
        assert!(cache.has("a").unwrap());
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.count().unwrap(), 1);

        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_if_absent_never_overwrites() {
        let (_dir, cache) = cache();
        assert!(cache.insert_if_absent("a", "first").unwrap());
        assert!(!cache.insert_if_absent("a", "first").unwrap());
        assert!(!cache.insert_if_absent("a", "second").unwrap());
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("first"));

        cache.replace("a", "second").unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_bulk_insert_spans_statements() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions::builder().bulk_rows(3).build();
        let cache = SqliteCache::open_with(dir.path().join("bulk.db"), options).unwrap();
        cache.insert_if_absent("id3", "old").unwrap();

        let items: Vec<(String, String)> = (0..10)
            .map(|i| (format!("id{i}"), format!("{{\"n\":{i}}}")))
            .collect();
        assert_eq!(cache.bulk_insert_if_absent(&items).unwrap(), 9);
        assert_eq!(cache.count().unwrap(), 10);
        assert_eq!(cache.get("id3").unwrap().as_deref(), Some("old"));

        // Buffer went back to the pool
        assert_eq!(cache.buffers.len(), 1);
        assert_eq!(cache.bulk_insert_if_absent(&items).unwrap(), 0);
        assert_eq!(cache.bulk_insert_if_absent(&[]).unwrap(), 0);
    }

    #[test]
    fn test_get_all_and_clear() {
        let (_dir, cache) = cache();
        cache.insert_if_absent("a", "1").unwrap();
        cache.insert_if_absent("b", "2").unwrap();

        let mut all = cache.get_all().unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );

        cache.clear().unwrap();
        assert!(cache.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("persist.db");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.insert_if_absent("a", "1").unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(cache.path(), path.as_path());
    }

    #[test]
    fn test_stream_path() {
        assert!(matches!(stream_path(""), Err(CacheError::InvalidKey(_))));
        assert!(matches!(
            stream_path("../escape"),
            Err(CacheError::InvalidKey(_))
        ));
        if let Ok(path) = stream_path("a1b2c3") {
            assert!(path.ends_with("Speckle/Projects/a1b2c3.db"));
        }
    }
}
