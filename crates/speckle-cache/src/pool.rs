// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-free connection pool.
//!
//! Idle connections sit in a crossbeam `SegQueue`. A borrow pops one (or
//! opens a new connection when the queue is empty) and the guard pushes it
//! back on drop, so the pool grows to the peak concurrency and stays there.
//! Prepared statements live in each connection's own statement cache.

use crate::config::CacheOptions;
use crate::error::Result;
use crossbeam::queue::SegQueue;
use rusqlite::Connection;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct ConnectionPool {
    path: PathBuf,
    options: CacheOptions,
    idle: SegQueue<Connection>,
    opened: AtomicUsize,
}

impl ConnectionPool {
    /// Open `options.pool_size` connections up front.
    pub(crate) fn open(path: &Path, options: CacheOptions) -> Result<Self> {
        let pool = Self {
            path: path.to_path_buf(),
            options,
            idle: SegQueue::new(),
            opened: AtomicUsize::new(0),
        };
        for _ in 0..pool.options.pool_size.max(1) {
            let conn = pool.connect()?;
            pool.idle.push(conn);
        }
        Ok(pool)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        conn.set_prepared_statement_cache_capacity(self.options.statement_cache);
        conn.execute_batch(&self.options.pragmas())?;
        let total = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(path = %self.path.display(), total, "opened cache connection");
        Ok(conn)
    }

    pub(crate) fn get(&self) -> Result<PooledConnection<'_>> {
        let conn = match self.idle.pop() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Connections opened over the pool's lifetime.
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub(crate) fn idle(&self) -> usize {
        self.idle.len()
    }
}

/// Borrowed connection, returned to the pool on drop.
pub(crate) struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    #[allow(clippy::expect_used)] // only taken in drop
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.push(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_opens_and_grows() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions::builder().pool_size(2).build();
        let pool = ConnectionPool::open(&dir.path().join("pool.db"), options).unwrap();
        assert_eq!(pool.opened(), 2);
        assert_eq!(pool.idle(), 2);

        {
            let _a = pool.get().unwrap();
            let _b = pool.get().unwrap();
            let _c = pool.get().unwrap();
            assert_eq!(pool.idle(), 0);
            assert_eq!(pool.opened(), 3);
        }
        assert_eq!(pool.idle(), 3);
    }

    #[test]
    fn test_connections_share_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(&dir.path().join("shared.db"), CacheOptions::default()).unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        a.execute_batch("CREATE TABLE t(x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
        let x: i64 = b.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 7);
    }
}
