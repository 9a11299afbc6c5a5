// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache configuration

use std::time::Duration;

/// Connection pool and engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Connections opened eagerly. The pool grows past this on demand.
    pub pool_size: usize,

    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,

    /// Prepared statements kept per connection.
    pub statement_cache: usize,

    /// Rows per multi-row insert statement in bulk writes.
    pub bulk_rows: usize,

    /// `PRAGMA page_size` (only effective on a fresh database).
    pub page_size: u32,

    /// `PRAGMA mmap_size` in bytes.
    pub mmap_size: u64,

    /// Use the write-ahead log.
    pub wal: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
            statement_cache: 16,
            bulk_rows: 500,
            page_size: 32_768,
            mmap_size: 30_000_000_000,
            wal: true,
        }
    }
}

impl CacheOptions {
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::default()
    }

    /// Pragmas applied to every new connection.
    pub(crate) fn pragmas(&self) -> String {
        let journal = if self.wal { "WAL" } else { "DELETE" };
        format!(
            "PRAGMA page_size = {};
             PRAGMA journal_mode = {journal};
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA mmap_size = {};",
            self.page_size, self.mmap_size
        )
    }
}

/// Builder for [`CacheOptions`].
#[derive(Debug, Default)]
pub struct CacheOptionsBuilder {
    pool_size: Option<usize>,
    busy_timeout: Option<Duration>,
    statement_cache: Option<usize>,
    bulk_rows: Option<usize>,
    page_size: Option<u32>,
    mmap_size: Option<u64>,
    wal: Option<bool>,
}

impl CacheOptionsBuilder {
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn statement_cache(mut self, capacity: usize) -> Self {
        self.statement_cache = Some(capacity);
        self
    }

    /// Rows per bulk insert statement (clamped to at least 1).
    pub fn bulk_rows(mut self, rows: usize) -> Self {
        self.bulk_rows = Some(rows.max(1));
        self
    }

    pub fn page_size(mut self, bytes: u32) -> Self {
        self.page_size = Some(bytes);
        self
    }

    pub fn mmap_size(mut self, bytes: u64) -> Self {
        self.mmap_size = Some(bytes);
        self
    }

    pub fn wal(mut self, enabled: bool) -> Self {
        self.wal = Some(enabled);
        self
    }

    pub fn build(self) -> CacheOptions {
        let defaults = CacheOptions::default();

        CacheOptions {
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            busy_timeout: self.busy_timeout.unwrap_or(defaults.busy_timeout),
            statement_cache: self.statement_cache.unwrap_or(defaults.statement_cache),
            bulk_rows: self.bulk_rows.unwrap_or(defaults.bulk_rows),
            page_size: self.page_size.unwrap_or(defaults.page_size),
            mmap_size: self.mmap_size.unwrap_or(defaults.mmap_size),
            wal: self.wal.unwrap_or(defaults.wal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let options = CacheOptions::builder()
            .pool_size(2)
            .bulk_rows(0)
            .wal(false)
            .build();

        assert_eq!(options.pool_size, 2);
        assert_eq!(options.bulk_rows, 1);
        assert!(!options.wal);
        assert_eq!(options.page_size, CacheOptions::default().page_size);
    }

    #[test]
    fn test_pragmas() {
        let pragmas = CacheOptions::default().pragmas();
        assert!(pragmas.contains("journal_mode = WAL"));
        assert!(pragmas.contains("mmap_size = 30000000000"));

        let pragmas = CacheOptions::builder().wal(false).build().pragmas();
        assert!(pragmas.contains("journal_mode = DELETE"));
    }
}
