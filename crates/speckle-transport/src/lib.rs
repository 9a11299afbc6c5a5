// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speckle Transport
//!
//! Moves records between the local object cache and a remote object store.
//!
//! # Features
//!
//! - **Save pipeline** -- dedup, size/time batching, parallel upload of
//!   what the server lacks, then cache write
//! - **Load pipeline** -- bounded request queue, cache check, parallel
//!   download of misses, then cache write
//! - **HTTP remote** -- Speckle server endpoints with retry and backoff
//! - **Send / receive** -- whole-graph operations over both pipelines
//!
//! # Example
//!
//! ```no_run
//! use speckle_cache::SqliteCache;
//! use speckle_core::node::Base;
//! use speckle_transport::{HttpRemote, SyncClient, TransportConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), speckle_transport::TransportError> {
//! let config = TransportConfig::default();
//! let remote = HttpRemote::new("https://speckle.example", "a1b2c3d4", &config)?
//!     .with_token("token");
//! let cache = Arc::new(SqliteCache::for_stream("a1b2c3d4")?);
//! let client = SyncClient::new(Arc::new(remote), cache, config);
//!
//! let outcome = client.send(&Base::new(), &CancellationToken::new()).await?;
//! println!("sent {}", outcome.root_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod operations;
pub mod pipeline;
pub mod remote;

pub use config::{ConfigError, RetryPolicy, TransportConfig, TransportConfigBuilder};
pub use error::{Result, TransportError};
pub use http::HttpRemote;
pub use operations::{ReceiveOutcome, SendOutcome, SyncClient};
pub use pipeline::{LoadPipeline, PipelineStats, SaveItem, SavePipeline, StatsSnapshot};
pub use remote::RemoteStore;
