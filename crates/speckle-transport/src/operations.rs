// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send and receive
//!
//! `send` serializes a graph and pushes every record through the save
//! pipeline. `receive` fetches a root record and its closure through the
//! load pipeline, then rebuilds the graph bottom-up: records are grouped by
//! closure size and each group is handed to the deserialization pool once
//! every smaller group is built. A record's closure strictly contains the
//! closure of anything it references, so references always resolve.

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::pipeline::{LoadPipeline, SaveItem, SavePipeline, StatsSnapshot};
use crate::remote::RemoteStore;
use dashmap::DashMap;
use speckle_cache::ObjectCache;
use speckle_core::{closure_of, serialize, DeserializePool, Id, Node, ReferenceResolver};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub root_id: Id,
    /// Records produced by the serializer.
    pub objects: usize,
    pub stats: StatsSnapshot,
}

#[derive(Debug)]
pub struct ReceiveOutcome {
    pub root: Arc<dyn Node>,
    /// Records rebuilt, root included.
    pub objects: usize,
    pub stats: StatsSnapshot,
}

/// Remote + local cache pair for one stream.
pub struct SyncClient<R> {
    remote: Arc<R>,
    cache: Arc<dyn ObjectCache>,
    config: TransportConfig,
}

impl<R: RemoteStore + 'static> SyncClient<R> {
    pub fn new(remote: Arc<R>, cache: Arc<dyn ObjectCache>, config: TransportConfig) -> Self {
        Self {
            remote,
            cache,
            config,
        }
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn cache(&self) -> &Arc<dyn ObjectCache> {
        &self.cache
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Serialize `root` and save every record. Returns the root id.
    pub async fn send(&self, root: &dyn Node, cancel: &CancellationToken) -> Result<SendOutcome> {
        let records = serialize(root)?;
        let root_id = records.root_id().clone();
        let objects = records.len();
        info!(root = %root_id, objects, "sending");

        let pipeline = SavePipeline::spawn(
            Arc::clone(&self.remote),
            Arc::clone(&self.cache),
            &self.config,
            cancel,
        );
        let mut interrupted = false;
        for record in records {
            if pipeline
                .push(SaveItem::new(record.id.into_string(), record.json))
                .await
                .is_err()
            {
                interrupted = true;
                break;
            }
        }

        let stats = pipeline.finish().await?;
        if interrupted {
            return Err(TransportError::Cancelled);
        }
        info!(root = %root_id, uploaded = stats.uploaded, "sent");
        Ok(SendOutcome {
            root_id,
            objects,
            stats,
        })
    }

    /// Fetch `root_id` and everything it references, then rebuild the graph.
    pub async fn receive(
        &self,
        root_id: &str,
        pool: &DeserializePool,
        cancel: &CancellationToken,
    ) -> Result<ReceiveOutcome> {
        let root_json = self.root_record(root_id, cancel).await?;
        let closure = closure_of(&root_json)?;
        info!(root = root_id, children = closure.len(), "receiving");

        let pipeline = LoadPipeline::spawn(
            Arc::clone(&self.remote),
            Arc::clone(&self.cache),
            &self.config,
            cancel,
        );
        let mut interrupted = false;
        for id in closure.keys() {
            if pipeline.push(id.as_str()).await.is_err() {
                interrupted = true;
                break;
            }
        }
        let stats = pipeline.finish().await?;
        if interrupted {
            return Err(TransportError::Cancelled);
        }

        // closure size -> (id, json)
        let mut levels: BTreeMap<usize, Vec<(Id, String)>> = BTreeMap::new();
        for id in closure.keys() {
            let json = self
                .cache
                .get(id.as_str())?
                .ok_or_else(|| TransportError::NotFound(id.to_string()))?;
            let size = closure_of(&json)?.len();
            levels.entry(size).or_default().push((id.clone(), json));
        }

        let built: Arc<DashMap<Id, Arc<dyn Node>>> = Arc::new(DashMap::new());
        let resolver: Arc<dyn ReferenceResolver> = built.clone();
        for (size, group) in levels {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let count = group.len();
            let pending: Vec<_> = group
                .into_iter()
                .map(|(id, json)| (id, pool.submit(json, Arc::clone(&resolver))))
                .collect();
            for (id, handle) in pending {
                built.insert(id, handle.await?);
            }
            debug!(closure_size = size, records = count, "level rebuilt");
        }

        let root = pool.deserializer().deserialize(&root_json, resolver.as_ref())?;
        let objects = built.len() + 1;
        info!(root = root_id, objects, "received");
        Ok(ReceiveOutcome {
            root,
            objects,
            stats,
        })
    }

    /// Root record from the cache, else from the remote (then cached).
    async fn root_record(&self, root_id: &str, cancel: &CancellationToken) -> Result<String> {
        if let Some(json) = self.cache.get(root_id)? {
            debug!(root = root_id, "root found in cache");
            return Ok(json);
        }
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            json = self.remote.download_single_object(root_id) => json?,
        };
        let json = fetched.ok_or_else(|| TransportError::NotFound(root_id.to_string()))?;

        self.cache.insert_if_absent(root_id, &json)?;
        Ok(json)
    }
}
