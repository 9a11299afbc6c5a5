// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property descriptors.

use super::chunk::DEFAULT_CHUNK_SIZE;
use super::DETACH_PREFIX;
use crate::value::Value;
use thiserror::Error;

/// How a property takes part in serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyFlags {
    /// Nested nodes are written as standalone records.
    pub detach: bool,
    /// Split a list value into chunk records of at most this many items.
    pub chunk_size: Option<usize>,
    /// Never serialized.
    pub ignored: bool,
}

/// A named property value with its serialization flags.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub value: Value,
    pub flags: PropertyFlags,
}

impl Property {
    /// Inline, non-chunked property.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flags: PropertyFlags::default(),
        }
    }

    /// Dynamic property; flags derive from the key syntax.
    pub(crate) fn dynamic(key: &str, value: Value) -> Self {
        let detach = key.starts_with(DETACH_PREFIX);
        Self {
            name: key.to_string(),
            value,
            flags: PropertyFlags {
                detach,
                chunk_size: if detach { parse_chunk_syntax(key) } else { None },
                ignored: false,
            },
        }
    }

    pub fn detached(mut self) -> Self {
        self.flags.detach = true;
        self
    }

    /// Detach and chunk a list property.
    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.flags.detach = true;
        self.flags.chunk_size = Some(chunk_size);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.flags.ignored = true;
        self
    }
}

/// Parse the `@(N)name` chunk syntax of a dynamic key.
///
/// `@()name` selects [`DEFAULT_CHUNK_SIZE`]. Returns `None` when the key has
/// no chunk prefix or the size is not a number.
pub fn parse_chunk_syntax(key: &str) -> Option<usize> {
    let rest = key.strip_prefix(DETACH_PREFIX)?.strip_prefix('(')?;
    let close = rest.find(')')?;
    let digits = &rest[..close];
    if digits.is_empty() {
        return Some(DEFAULT_CHUNK_SIZE);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Failure to assign a declared property.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// The variant declares no such property; the value is handed back.
    #[error("unknown property")]
    Unknown(Value),

    #[error("property '{name}' expects {expected}")]
    Invalid { name: String, expected: &'static str },
}

impl PropertyError {
    pub fn invalid(name: &str, expected: &'static str) -> Self {
        Self::Invalid {
            name: name.to_string(),
            expected,
        }
    }
}
