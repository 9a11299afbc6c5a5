// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process remote store for pipeline tests.

#![allow(dead_code)] // Each test binary uses a subset

use parking_lot::Mutex;
use speckle_transport::{RemoteStore, Result, TransportConfig, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MockRemote {
    objects: Mutex<HashMap<String, String>>,
    /// Size of every upload batch, in call order.
    pub upload_batches: Mutex<Vec<usize>>,
    pub download_calls: AtomicUsize,
    pub downloaded: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub fail_downloads: AtomicBool,
    /// Every call waits forever.
    pub hang: AtomicBool,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<'a>(objects: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let remote = Self::new();
        remote.objects.lock().extend(
            objects
                .into_iter()
                .map(|(id, json)| (id.to_string(), json.to_string())),
        );
        remote
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.lock().contains_key(id)
    }

    pub fn uploaded(&self) -> usize {
        self.upload_batches.lock().iter().sum()
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

impl RemoteStore for MockRemote {
    async fn has_objects(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        self.maybe_hang().await;
        let objects = self.objects.lock();
        Ok(ids
            .iter()
            .map(|id| (id.clone(), objects.contains_key(id)))
            .collect())
    }

    async fn upload_objects(&self, batch: &[(String, String)]) -> Result<()> {
        self.maybe_hang().await;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("injected upload failure".into()));
        }
        self.upload_batches.lock().push(batch.len());
        self.objects.lock().extend(batch.iter().cloned());
        Ok(())
    }

    async fn download_objects(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        self.maybe_hang().await;
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("injected download failure".into()));
        }
        let objects = self.objects.lock();
        let found: Vec<(String, String)> = ids
            .iter()
            .filter_map(|id| objects.get(id).map(|json| (id.clone(), json.clone())))
            .collect();
        self.downloaded.fetch_add(found.len(), Ordering::SeqCst);
        Ok(found)
    }

    async fn download_single_object(&self, id: &str) -> Result<Option<String>> {
        self.maybe_hang().await;
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().get(id).cloned())
    }
}

/// Small batches and a short window so tests finish quickly.
pub fn test_config() -> TransportConfig {
    TransportConfig::builder()
        .http_batch_size(4)
        .batch_window(Duration::from_millis(20))
        .save_cache(3, 1)
        .load_cache(3, 2)
        .build()
        .unwrap()
}
