// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speckle Local Cache
//!
//! Content-addressed object store keyed by record id.
//!
//! # Features
//!
//! - **SQLite backend** -- WAL, memory temp store, large pages and mmap
//! - **Connection pool** -- pre-opened, grows on demand, lock-free return
//! - **Statement reuse** -- per-connection prepared statement cache
//! - **Bulk writes** -- multi-row insert-if-absent in one transaction
//!
//! # Example
//!
//! ```no_run
//! use speckle_cache::{ObjectCache, SqliteCache};
//!
//! let cache = SqliteCache::for_stream("a1b2c3d4")?;
//! cache.insert_if_absent("0123456789abcdef0123456789abcdef", "{}")?;
//! assert!(cache.has("0123456789abcdef0123456789abcdef")?);
//! # Ok::<(), speckle_cache::CacheError>(())
//! ```

pub mod config;
pub mod error;
mod pool;
pub mod sqlite;
pub mod store;

pub use config::{CacheOptions, CacheOptionsBuilder};
pub use error::{CacheError, Result};
pub use sqlite::{stream_path, SqliteCache};
pub use store::{MemoryCache, ObjectCache};
