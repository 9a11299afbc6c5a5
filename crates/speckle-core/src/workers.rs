// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deserialization worker pool
//!
//! A fixed set of OS threads draining a bounded crossbeam queue. Submission
//! never blocks: [`DeserializePool::submit`] tries a non-blocking send and,
//! when every worker is busy (queue full), deserializes on the caller's
//! thread instead. With the default queue capacity of zero the channel is a
//! rendezvous, so work is only handed off to a worker that is idle right now.

use crate::deserializer::{Deserializer, ReferenceResolver};
use crate::error::DeserializeError;
use crate::node::Node;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

type TaskResult = Result<Arc<dyn Node>, DeserializeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Background threads. Zero runs every task inline.
    pub workers: usize,
    /// Pending tasks accepted beyond those handed to idle workers.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            queue_capacity: 0,
        }
    }
}

struct Job {
    json: String,
    resolver: Arc<dyn ReferenceResolver>,
    reply: oneshot::Sender<TaskResult>,
}

/// Pool counters.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub queued: AtomicU64,
    pub inline: AtomicU64,
}

impl PoolMetrics {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.queued.load(Ordering::Relaxed),
            self.inline.load(Ordering::Relaxed),
        )
    }
}

/// Pending result of a submitted task.
///
/// Await it from async code, or call [`TaskHandle::wait`] from a plain
/// thread.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskResult>,
}

impl TaskHandle {
    /// Block the current thread until the task completes.
    ///
    /// Panics if called from within an async runtime.
    pub fn wait(self) -> TaskResult {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(DeserializeError::WorkerGone))
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(DeserializeError::WorkerGone)))
    }
}

pub struct DeserializePool {
    deserializer: Arc<Deserializer>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<PoolMetrics>,
}

impl DeserializePool {
    /// Spawn the worker threads.
    pub fn start(deserializer: Deserializer, config: &WorkerPoolConfig) -> std::io::Result<Self> {
        let deserializer = Arc::new(deserializer);
        let (sender, receiver) = channel::bounded(config.queue_capacity);

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let receiver = receiver.clone();
            let deserializer = Arc::clone(&deserializer);
            let handle = thread::Builder::new()
                .name(format!("speckle-deser-{index}"))
                .spawn(move || worker_loop(&receiver, &deserializer))?;
            workers.push(handle);
        }

        tracing::debug!(
            workers = config.workers,
            queue = config.queue_capacity,
            "deserialization pool started"
        );

        Ok(Self {
            deserializer,
            sender: Some(sender),
            workers,
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    /// Hand `json` to an idle worker, or deserialize it inline.
    pub fn submit(&self, json: String, resolver: Arc<dyn ReferenceResolver>) -> TaskHandle {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            json,
            resolver,
            reply,
        };

        let job = match &self.sender {
            Some(sender) => match sender.try_send(job) {
                Ok(()) => {
                    self.metrics.queued.fetch_add(1, Ordering::Relaxed);
                    return TaskHandle { rx };
                }
                Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => job,
            },
            None => job,
        };

        self.metrics.inline.fetch_add(1, Ordering::Relaxed);
        run(&self.deserializer, job);
        TaskHandle { rx }
    }

    pub fn deserializer(&self) -> &Deserializer {
        &self.deserializer
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and join every worker. Queued tasks still complete.
    pub fn stop(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("deserialization worker panicked");
            }
        }
        tracing::debug!("deserialization pool stopped");
    }
}

impl Drop for DeserializePool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: &Receiver<Job>, deserializer: &Deserializer) {
    while let Ok(job) = receiver.recv() {
        run(deserializer, job);
    }
}

fn run(deserializer: &Deserializer, job: Job) {
    let result = deserializer.deserialize(&job.json, job.resolver.as_ref());
    // Submitter may have dropped the handle.
    let _ = job.reply.send(result);
}
