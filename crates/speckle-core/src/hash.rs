// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content hasher.
//!
//! Record ids are the first [`HASH_LENGTH`] lowercase hex characters of the
//! SHA-256 digest of the record's JSON bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;

/// Number of hex characters kept from the digest.
pub const HASH_LENGTH: usize = 32;

/// Content-derived record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Wrap an id received from storage or the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hash `bytes` into an id.
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut hex = hex::encode(digest);
        hex.truncate(HASH_LENGTH);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_truncated_lowercase_hex() {
        let id = Id::compute(b"{\"speckle_type\":\"Base\"");
        assert_eq!(id.as_str().len(), HASH_LENGTH);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_compute_known_vector() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(
            Id::compute(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223"
        );
    }

    #[test]
    fn test_compute_is_content_sensitive() {
        assert_ne!(Id::compute(b"{\"a\":1"), Id::compute(b"{\"a\":2"));
        assert_eq!(Id::compute(b"{\"a\":1"), Id::compute(b"{\"a\":1"));
    }
}
