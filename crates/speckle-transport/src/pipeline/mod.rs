// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batch transport pipelines
//!
//! Both directions are chains of async stages joined by bounded channels:
//!
//! ```text
//! save:  push --> batch --> dedup + cache check --> has/upload (xN) --> re-batch --> cache write (xM)
//! load:  push --> dedup + cache check --> batch --> download (xN) --> re-batch --> cache write (xM)
//! ```
//!
//! Completion is signalled by closing the input channel; every stage drains
//! what it holds, then drops its own sender so the next stage sees the close.
//!
//! # Faults
//!
//! Every pipeline runs under a child of the caller's cancellation token. The
//! first stage error is kept and cancels that child token, which stops all
//! other stages; later errors are discarded. [`finish`](SavePipeline::finish)
//! returns the kept error, or [`TransportError::Cancelled`] when the caller
//! cancelled and no stage failed.

mod load;
mod save;

pub use load::LoadPipeline;
pub use save::{SaveItem, SavePipeline};

use crate::error::{Result, TransportError};
use futures::future::BoxFuture;
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use speckle_cache::ObjectCache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Pipeline counters, updated by the stages as they go.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Items pushed by the caller.
    pub seen: AtomicU64,
    /// Items dropped because the same id was already pushed in this run.
    pub duplicates: AtomicU64,
    /// Ids already held by the local cache, so neither fetched nor uploaded.
    pub cache_hits: AtomicU64,
    /// Save items the server already had.
    pub remote_present: AtomicU64,
    pub uploaded: AtomicU64,
    pub downloaded: AtomicU64,
    /// Rows actually inserted into the local cache.
    pub cache_writes: AtomicU64,
    /// Network batches issued.
    pub batches: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            seen: self.seen.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_present: self.remote_present.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub seen: u64,
    pub duplicates: u64,
    pub cache_hits: u64,
    pub remote_present: u64,
    pub uploaded: u64,
    pub downloaded: u64,
    pub cache_writes: u64,
    pub batches: u64,
}

pub(crate) fn bump(counter: &AtomicU64, n: usize) {
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

// ----------------------------------------------------------------------------
// Shared state
// ----------------------------------------------------------------------------

/// State shared by every stage of one pipeline run.
pub(crate) struct Shared {
    caller: CancellationToken,
    cancel: CancellationToken,
    fault: Mutex<Option<TransportError>>,
    pub(crate) stats: PipelineStats,
}

impl Shared {
    pub(crate) fn new(caller: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            caller: caller.clone(),
            cancel: caller.child_token(),
            fault: Mutex::new(None),
            stats: PipelineStats::default(),
        })
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record a stage failure. The first one wins and stops the pipeline.
    pub(crate) fn fail(&self, stage: &'static str, err: TransportError) {
        if err.is_cancelled() {
            self.cancel.cancel();
            return;
        }
        {
            let mut fault = self.fault.lock();
            if fault.is_none() {
                error!(stage, error = %err, "pipeline stage failed");
                *fault = Some(err);
            } else {
                debug!(stage, error = %err, "discarding error after first fault");
            }
        }
        self.cancel.cancel();
    }

    /// Run `fut` unless the pipeline is cancelled first.
    pub(crate) async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(TransportError::Cancelled),
            result = fut => result,
        }
    }

    /// Final result of the run once every stage has stopped.
    pub(crate) fn outcome(&self) -> Result<StatsSnapshot> {
        if let Some(err) = self.fault.lock().take() {
            return Err(err);
        }
        if self.caller.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        Ok(self.stats.snapshot())
    }
}

/// Stage chain, spawned lazily.
pub(crate) struct Runner {
    pending: Option<BoxFuture<'static, ()>>,
    task: Option<JoinHandle<()>>,
}

impl Runner {
    pub(crate) fn new(stages: BoxFuture<'static, ()>) -> Self {
        Self {
            pending: Some(stages),
            task: None,
        }
    }

    /// Spawn the stages on the current Tokio runtime. False if already started.
    pub(crate) fn start(&mut self) -> bool {
        match self.pending.take() {
            Some(stages) => {
                self.task = Some(tokio::spawn(stages));
                true
            }
            None => false,
        }
    }

    pub(crate) async fn join(&mut self) -> Result<()> {
        self.start();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| TransportError::StageFailed("pipeline", e.to_string())),
            None => Ok(()),
        }
    }
}

/// Send `item` into a bounded stage channel, waiting for room.
///
/// Fails with `Cancelled` when the pipeline stops first or the receiving
/// stage has gone away; the cause, if any, is in the fault slot.
pub(crate) async fn push<T: Send>(shared: &Shared, tx: &mpsc::Sender<T>, item: T) -> Result<()> {
    tokio::select! {
        biased;
        () = shared.cancel.cancelled() => Err(TransportError::Cancelled),
        sent = tx.send(item) => sent.map_err(|_| TransportError::Cancelled),
    }
}

// ----------------------------------------------------------------------------
// Batching
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchLimits {
    pub max_items: usize,
    pub max_bytes: usize,
    /// Time a batch may stay open after its first item.
    pub window: Duration,
}

/// Collect the next batch from `rx`.
///
/// Waits for a first item, then gathers until the batch is full by count or
/// weight, the window elapses, or the channel closes. Returns `None` once the
/// channel is closed and drained, or when `cancel` fires.
pub(crate) async fn next_batch<T>(
    rx: &mut mpsc::Receiver<T>,
    limits: BatchLimits,
    weigh: impl Fn(&T) -> usize,
    cancel: &CancellationToken,
) -> Option<Vec<T>> {
    let first = tokio::select! {
        biased;
        () = cancel.cancelled() => return None,
        item = rx.recv() => item?,
    };

    let deadline = tokio::time::Instant::now() + limits.window;
    let mut bytes = weigh(&first);
    let mut batch = vec![first];

    while batch.len() < limits.max_items && bytes < limits.max_bytes {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            item = rx.recv() => match item {
                Some(item) => {
                    bytes = bytes.saturating_add(weigh(&item));
                    batch.push(item);
                }
                None => break,
            },
            () = tokio::time::sleep_until(deadline) => break,
        }
    }
    Some(batch)
}

/// [`next_batch`] as a stream, ending when the channel closes or on cancel.
pub(crate) fn batches<T, W>(
    rx: mpsc::Receiver<T>,
    limits: BatchLimits,
    weigh: W,
    cancel: CancellationToken,
) -> impl Stream<Item = Vec<T>>
where
    T: Send,
    W: Fn(&T) -> usize + Clone,
{
    futures::stream::unfold(rx, move |mut rx| {
        let weigh = weigh.clone();
        let cancel = cancel.clone();
        async move {
            let batch = next_batch(&mut rx, limits, weigh, &cancel).await?;
            Some((batch, rx))
        }
    })
}

/// Shared re-batch + cache write tail of both pipelines.
///
/// Writes go through `spawn_blocking`; at most `parallelism` run at once.
pub(crate) async fn cache_stage(
    rx: mpsc::Receiver<(String, String)>,
    cache: Arc<dyn ObjectCache>,
    limits: BatchLimits,
    parallelism: usize,
    shared: Arc<Shared>,
) {
    use futures::StreamExt;

    let sink = Arc::clone(&shared);
    batches(rx, limits, |_: &(String, String)| 0, shared.token().clone())
        .map(move |batch| {
            let cache = Arc::clone(&cache);
            async move {
                let rows = batch.len();
                let written =
                    tokio::task::spawn_blocking(move || cache.bulk_insert_if_absent(&batch))
                        .await
                        .map_err(|e| TransportError::StageFailed("cache", e.to_string()))?
                        .map_err(TransportError::from)?;
                debug!(rows, written, "cache batch written");
                Ok::<_, TransportError>(written)
            }
        })
        .buffer_unordered(parallelism.max(1))
        .for_each(move |result| {
            match result {
                Ok(written) => bump(&sink.stats.cache_writes, written),
                Err(e) => sink.fail("cache", e),
            }
            futures::future::ready(())
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_items: usize, window_ms: u64) -> BatchLimits {
        BatchLimits {
            max_items,
            max_bytes: usize::MAX,
            window: Duration::from_millis(window_ms),
        }
    }

    #[tokio::test]
    async fn test_batch_closes_on_count() {
        let (tx, mut rx) = mpsc::channel(16);
        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        let cancel = CancellationToken::new();
        let batch = next_batch(&mut rx, limits(3, 10_000), |_| 0, &cancel).await;
        assert_eq!(batch, Some(vec![0, 1, 2]));
    }

    #[tokio::test]
    async fn test_batch_closes_on_bytes() {
        let (tx, mut rx) = mpsc::channel(16);
        for s in ["aaaa", "bbbb", "cccc"] {
            tx.send(s.to_string()).await.unwrap();
        }
        let cancel = CancellationToken::new();
        let limits = BatchLimits {
            max_items: 100,
            max_bytes: 8,
            window: Duration::from_secs(10),
        };
        let batch = next_batch(&mut rx, limits, String::len, &cancel).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_closes_on_window() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(1).await.unwrap();
        let cancel = CancellationToken::new();
        // Sender stays open; only the window can end this batch.
        let batch = tokio::time::timeout(
            Duration::from_secs(5),
            next_batch(&mut rx, limits(100, 20), |_| 0, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(batch, Some(vec![1]));
        drop(tx);
    }

    #[tokio::test]
    async fn test_batch_ends_on_close_and_cancel() {
        let (tx, mut rx) = mpsc::channel::<u32>(4);
        drop(tx);
        let cancel = CancellationToken::new();
        assert_eq!(next_batch(&mut rx, limits(10, 10), |_| 0, &cancel).await, None);

        let (_tx, mut rx) = mpsc::channel::<u32>(4);
        cancel.cancel();
        assert_eq!(next_batch(&mut rx, limits(10, 10), |_| 0, &cancel).await, None);
    }

    #[test]
    fn test_first_fault_wins() {
        let caller = CancellationToken::new();
        let shared = Shared::new(&caller);
        shared.fail("upload", TransportError::Protocol("first".into()));
        shared.fail("cache", TransportError::Protocol("second".into()));

        assert!(shared.token().is_cancelled());
        assert!(!caller.is_cancelled());
        match shared.outcome() {
            Err(TransportError::Protocol(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_caller_cancel_is_not_a_fault() {
        let caller = CancellationToken::new();
        let shared = Shared::new(&caller);
        caller.cancel();
        assert!(shared.token().is_cancelled());
        shared.fail("upload", TransportError::Cancelled);
        assert!(matches!(shared.outcome(), Err(TransportError::Cancelled)));
    }

    #[test]
    fn test_clean_outcome_reports_stats() {
        let shared = Shared::new(&CancellationToken::new());
        bump(&shared.stats.seen, 3);
        assert_eq!(shared.outcome().unwrap().seen, 3);
    }
}
