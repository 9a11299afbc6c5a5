// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Concurrent cache access
//!
//! Many threads sharing one pooled cache: no lost writes, no overwritten
//! entries, and the pool grows instead of failing.

use speckle_cache::{CacheOptions, ObjectCache, SqliteCache};
use std::sync::Arc;
use std::thread;

#[test]
fn parallel_writers_and_readers() {
    let dir = tempfile::tempdir().unwrap();
    let options = CacheOptions::builder().pool_size(2).build();
    let cache = Arc::new(SqliteCache::open_with(dir.path().join("objects.db"), options).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..50 {
                    let id = format!("t{}-{}", t, i);
                    assert!(cache.insert_if_absent(&id, "{}").unwrap());
                    assert!(cache.has(&id).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.count().unwrap(), 400);
    assert!(cache.connections() >= 2);
}

#[test]
fn racing_inserts_keep_one_value() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteCache::open(dir.path().join("race.db")).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let items: Vec<(String, String)> = (0..100)
                    .map(|i| (format!("shared{}", i), format!("{{\"writer\":{}}}", t)))
                    .collect();
                cache.bulk_insert_if_absent(&items).unwrap()
            })
        })
        .collect();

    let written: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(written, 100);
    assert_eq!(cache.count().unwrap(), 100);

    // Each entry is one writer's value, never a mix
    for (_, content) in cache.get_all().unwrap() {
        assert!(content.starts_with("{\"writer\":"));
    }
}
