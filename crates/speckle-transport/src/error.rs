// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport errors.

use crate::config::ConfigError;
use speckle_cache::CacheError;
use speckle_core::{DeserializeError, SerializeError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The caller's cancellation token fired. Never reported as a fault.
    #[error("operation cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("local cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("serialization failed: {0}")]
    Serialize(#[from] SerializeError),

    #[error("deserialization failed: {0}")]
    Deserialize(#[from] DeserializeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0} stage failed: {1}")]
    StageFailed(&'static str, String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Transient failures worth another attempt: connection problems,
    /// timeouts, throttling and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Cache(e) => e.is_busy(),
            _ => false,
        }
    }
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let status = |status| TransportError::Status {
            status,
            url: "http://localhost/objects/s".into(),
            body: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
        assert!(!TransportError::Protocol("bad line".into()).is_retryable());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(TransportError::Cancelled.is_cancelled());
        assert!(!TransportError::NotFound("x".into()).is_cancelled());
        assert_eq!(
            TransportError::StageFailed("upload", "boom".into()).to_string(),
            "upload stage failed: boom"
        );
    }
}
