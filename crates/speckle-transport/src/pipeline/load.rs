// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Load pipeline: fetch the records missing from the local cache.

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

/// Load pipeline.
///
/// Requested ids go through a bounded queue: [`push`](Self::push) waits,
/// rather than failing or dropping, while the queue is full. Fetched records
/// end up in the local cache; read them from there after
/// [`finish`](Self::finish).
pub struct LoadPipeline {
    tx: Option<mpsc::Sender<String>>,
    runner: Runner,
    shared: Arc<Shared>,
}

impl LoadPipeline {
    /// Build the stages without starting them.
    pub fn new<R>(
        remote: Arc<R>,
        cache: Arc<dyn ObjectCache>,
        config: &TransportConfig,
        cancel: &CancellationToken,
    ) -> Self
    where
        R: RemoteStore + 'static,
    {
        let shared = Shared::new(cancel);
        let (tx, rx) = mpsc::channel(config.load_queue_capacity.max(1));
        let (miss_tx, miss_rx) = mpsc::channel(config.http_batch_size.max(1));
        let (store_tx, store_rx) = mpsc::channel(config.load_cache_batch_size.max(1));

        let fetch_limits = BatchLimits {
            max_items: config.http_batch_size,
            max_bytes: usize::MAX,
            window: config.batch_window(),
        };
        let store_limits = BatchLimits {
            max_items: config.load_cache_batch_size,
            max_bytes: usize::MAX,
            window: config.batch_window(),
        };

        let check = check_stage(rx, Arc::clone(&cache), miss_tx, Arc::clone(&shared));
        let fetch = fetch_stage(
            miss_rx,
            remote,
            store_tx,
            fetch_limits,
            config.max_http_parallelism,
            Arc::clone(&shared),
        );
        let store = cache_stage(
            store_rx,
            cache,
            store_limits,
            config.load_cache_parallelism,
            Arc::clone(&shared),
        );
        let runner = Runner::new(Box::pin(async move {
            tokio::join!(check, fetch, store);
        }));

        Self {
            tx: Some(tx),
            runner,
            shared,
        }
    }

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
        let mut pipeline = Self::new(remote, cache, config, cancel);
        pipeline.start();
        pipeline
    }

    /// Start consuming the queue. No-op once started.
    pub fn start(&mut self) {
        if self.runner.start() {
            info!("load pipeline started");
        }
    }

    /// Request one record, waiting while the queue is full.
    pub async fn push(&self, id: impl Into<String>) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Cancelled)?;
        bump(&self.shared.stats.seen, 1);
        push(&self.shared, tx, id.into()).await
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
                downloaded = stats.downloaded,
                cache_writes = stats.cache_writes,
                "load pipeline finished"
            );
        }
        outcome
    }
}

/// Drop duplicates and ids already cached; forward the rest.
async fn check_stage(
    mut rx: mpsc::Receiver<String>,
    cache: Arc<dyn ObjectCache>,
    miss_tx: mpsc::Sender<String>,
    shared: Arc<Shared>,
) {
    let mut seen = HashSet::new();
    loop {
        let id = tokio::select! {
            biased;
            () = shared.token().cancelled() => break,
            id = rx.recv() => match id {
                Some(id) => id,
                None => break,
            },
        };
        if !seen.insert(id.clone()) {
            bump(&shared.stats.duplicates, 1);
            continue;
        }
        match cache.has(&id) {
            Ok(true) => bump(&shared.stats.cache_hits, 1),
            Ok(false) => {
                if push(&shared, &miss_tx, id).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                shared.fail("cache check", e.into());
                break;
            }
        }
    }
}

async fn fetch_stage<R: RemoteStore + 'static>(
    miss_rx: mpsc::Receiver<String>,
    remote: Arc<R>,
    store_tx: mpsc::Sender<(String, String)>,
    limits: BatchLimits,
    parallelism: usize,
    shared: Arc<Shared>,
) {
    let faults = Arc::clone(&shared);
    super::batches(miss_rx, limits, |_: &String| 0, shared.token().clone())
        .map(move |ids| {
            fetch_batch(
                Arc::clone(&remote),
                ids,
                Arc::clone(&shared),
                store_tx.clone(),
            )
        })
        .buffer_unordered(parallelism.max(1))
        .for_each(move |result| {
            if let Err(e) = result {
                faults.fail("download", e);
            }
            futures::future::ready(())
        })
        .await;
}

async fn fetch_batch<R: RemoteStore>(
    remote: Arc<R>,
    ids: Vec<String>,
    shared: Arc<Shared>,
    store_tx: mpsc::Sender<(String, String)>,
) -> Result<()> {
    bump(&shared.stats.batches, 1);
    let objects = shared.guard(remote.download_objects(&ids)).await?;
    bump(&shared.stats.downloaded, objects.len());
    debug!(requested = ids.len(), received = objects.len(), "load batch done");

    for object in objects {
        push(&shared, &store_tx, object).await?;
    }
    Ok(())
}
