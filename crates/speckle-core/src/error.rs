// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serialization and deserialization errors.
//!
//! Both are local, non-retryable input failures.

use thiserror::Error;

/// Malformed input to the serializer.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("dictionary keys must be strings, found {found} under property '{property}'")]
    NonStringKey {
        property: String,
        found: &'static str,
    },

    #[error("chunk size must be greater than zero (property '{0}')")]
    ZeroChunkSize(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to rebuild a node from a record.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object at the record root, found {0}")]
    NotAnObject(&'static str),

    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("type '{speckle_type}': property '{name}' expects {expected}")]
    InvalidProperty {
        speckle_type: String,
        name: String,
        expected: &'static str,
    },

    #[error("deserialization worker dropped the task")]
    WorkerGone,
}
