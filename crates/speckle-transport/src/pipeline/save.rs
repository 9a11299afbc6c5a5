// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Save pipeline: records the local cache does not hold go out to the
//! remote, then into the cache.

use super::{bump, cache_stage, push, BatchLimits, Runner, Shared, StatsSnapshot};
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::remote::RemoteStore;
use futures::StreamExt;
use speckle_cache::ObjectCache;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One record to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveItem {
    pub id: String,
    pub json: String,
    /// Also write the record to the local cache once uploaded.
    pub needs_storage: bool,
}

impl SaveItem {
    pub fn new(id: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            json: json.into(),
            needs_storage: true,
        }
    }
}

/// Running save pipeline.
///
/// Push items, then call [`finish`](Self::finish) to flush and collect the
/// outcome. Must be created inside a Tokio runtime.
pub struct SavePipeline {
    tx: Option<mpsc::Sender<SaveItem>>,
    runner: Runner,
    shared: Arc<Shared>,
}

impl SavePipeline {
    /// Build and start the stages.
    pub fn spawn<R>(
        remote: Arc<R>,
        cache: Arc<dyn ObjectCache>,
        config: &TransportConfig,
        cancel: &CancellationToken,
    ) -> Self
    where
        R: RemoteStore + 'static,
    {
        let shared = Shared::new(cancel);
        let (tx, rx) = mpsc::channel(config.save_queue_capacity.max(1));
        let (store_tx, store_rx) = mpsc::channel(config.save_cache_batch_size.max(1));

        let upload_limits = BatchLimits {
            max_items: config.http_batch_size,
            max_bytes: config.max_batch_bytes,
            window: config.batch_window(),
        };
        let store_limits = BatchLimits {
            max_items: config.save_cache_batch_size,
            max_bytes: usize::MAX,
            window: config.batch_window(),
        };

        let upload = upload_stage(
            rx,
            remote,
            Arc::clone(&cache),
            store_tx,
            upload_limits,
            config.max_http_parallelism,
            Arc::clone(&shared),
        );
        let store = cache_stage(
            store_rx,
            cache,
            store_limits,
            config.save_cache_parallelism,
            Arc::clone(&shared),
        );
        let mut runner = Runner::new(Box::pin(async move {
            tokio::join!(upload, store);
        }));
        runner.start();

        info!(
            batch = config.http_batch_size,
            parallelism = config.max_http_parallelism,
            "save pipeline started"
        );
        Self {
            tx: Some(tx),
            runner,
            shared,
        }
    }

    /// Queue one record, waiting while the queue is full.
    ///
    /// Fails once the pipeline has stopped; the cause is reported by
    /// [`finish`](Self::finish).
    pub async fn push(&self, item: SaveItem) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Cancelled)?;
        bump(&self.shared.stats.seen, 1);
        push(&self.shared, tx, item).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Close the input, wait for every stage to drain and return the outcome.
    pub async fn finish(mut self) -> Result<StatsSnapshot> {
        self.tx.take();
        self.runner.join().await?;
        let outcome = self.shared.outcome();
        if let Ok(stats) = &outcome {
            info!(
                seen = stats.seen,
                cache_hits = stats.cache_hits,
                uploaded = stats.uploaded,
                remote_present = stats.remote_present,
                cache_writes = stats.cache_writes,
                "save pipeline finished"
            );
        }
        outcome
    }
}

async fn upload_stage<R: RemoteStore + 'static>(
    rx: mpsc::Receiver<SaveItem>,
    remote: Arc<R>,
    cache: Arc<dyn ObjectCache>,
    store_tx: mpsc::Sender<(String, String)>,
    limits: BatchLimits,
    parallelism: usize,
    shared: Arc<Shared>,
) {
    let mut seen = HashSet::new();
    let dedup = Arc::clone(&shared);
    let faults = Arc::clone(&shared);

    super::batches(rx, limits, |item: &SaveItem| item.json.len(), shared.token().clone())
        .filter_map(move |batch| {
            futures::future::ready(fresh_items(batch, &mut seen, cache.as_ref(), &dedup))
        })
        .map(move |batch| {
            upload_batch(
                Arc::clone(&remote),
                batch,
                Arc::clone(&shared),
                store_tx.clone(),
            )
        })
        .buffer_unordered(parallelism.max(1))
        .for_each(move |result| {
            if let Err(e) = result {
                faults.fail("upload", e);
            }
            futures::future::ready(())
        })
        .await;
    // The last store_tx clone drops with the stream, closing the cache stage input.
}

/// Drop ids already pushed in this run or already in the local cache.
///
/// `None` when nothing is left to upload or the cache check failed.
fn fresh_items(
    batch: Vec<SaveItem>,
    seen: &mut HashSet<String>,
    cache: &dyn ObjectCache,
    shared: &Shared,
) -> Option<Vec<SaveItem>> {
    let mut fresh = Vec::with_capacity(batch.len());
    for item in batch {
        if !seen.insert(item.id.clone()) {
            bump(&shared.stats.duplicates, 1);
            continue;
        }
        match cache.has(&item.id) {
            Ok(true) => bump(&shared.stats.cache_hits, 1),
            Ok(false) => fresh.push(item),
            Err(e) => {
                shared.fail("cache check", e.into());
                return None;
            }
        }
    }
    (!fresh.is_empty()).then_some(fresh)
}

async fn upload_batch<R: RemoteStore>(
    remote: Arc<R>,
    batch: Vec<SaveItem>,
    shared: Arc<Shared>,
    store_tx: mpsc::Sender<(String, String)>,
) -> Result<()> {
    bump(&shared.stats.batches, 1);
    let ids: Vec<String> = batch.iter().map(|item| item.id.clone()).collect();
    let present = shared.guard(remote.has_objects(&ids)).await?;

    let missing: Vec<(String, String)> = batch
        .iter()
        .filter(|item| !present.get(&item.id).copied().unwrap_or(false))
        .map(|item| (item.id.clone(), item.json.clone()))
        .collect();
    bump(&shared.stats.remote_present, batch.len() - missing.len());

    if !missing.is_empty() {
        shared.guard(remote.upload_objects(&missing)).await?;
        bump(&shared.stats.uploaded, missing.len());
    }
    debug!(batch = batch.len(), uploaded = missing.len(), "save batch done");

    for item in batch.into_iter().filter(|item| item.needs_storage) {
        push(&shared, &store_tx, (item.id, item.json)).await?;
    }
    Ok(())
}
