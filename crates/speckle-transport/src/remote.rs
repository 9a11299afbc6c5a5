// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote object store interface
//!
//! Backend-agnostic view of the server side of a stream. Records travel as
//! `(id, json)` pairs; the JSON is passed through untouched.
//!
//! # Implementations
//!
//! - [`HttpRemote`](crate::http::HttpRemote) -- Speckle server REST endpoints
//!
//! Futures returned by these methods are dropped when a pipeline is
//! cancelled, which aborts the underlying request.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;

pub trait RemoteStore: Send + Sync {
    /// Which of `ids` the server already holds.
    ///
    /// Ids missing from the returned map are treated as absent.
    fn has_objects(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, bool>>> + Send;

    /// Upload one batch of records.
    fn upload_objects(&self, objects: &[(String, String)]) -> impl Future<Output = Result<()>> + Send;

    /// Fetch records by id. Unknown ids are omitted from the result.
    fn download_objects(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<(String, String)>>> + Send;

    /// Fetch one record; `None` when the server does not have it.
    fn download_single_object(&self, id: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}
