// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache error taxonomy.
//!
//! Driver errors never leave the crate as `rusqlite::Error`; they are decoded
//! into [`CacheError::Engine`] with the primary result code name and the
//! extended code description.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache engine error {code} ({extended}): {message}")]
    Engine {
        /// Primary result code, e.g. `DatabaseBusy`.
        code: String,
        /// Extended result code text.
        extended: String,
        message: String,
    },

    #[error("no per-user data directory available")]
    NoDataDir,

    #[error("invalid cache key '{0}'")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// True for lock contention the caller may retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Engine { code, .. } if code == "DatabaseBusy" || code == "DatabaseLocked")
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi, message) => Self::Engine {
                code: format!("{:?}", ffi.code),
                extended: ffi.to_string(),
                message: message.unwrap_or_else(|| ffi.to_string()),
            },
            other => Self::Engine {
                code: "Driver".to_string(),
                extended: String::new(),
                message: other.to_string(),
            },
        }
    }
}
