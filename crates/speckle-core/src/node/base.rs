// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::Node;
use crate::hash::Id;
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;

/// Discriminator of the root node type; also the resolution fallback.
pub const BASE_TYPE: &str = "Base";

/// Ordered bag of dynamically named properties.
///
/// Insertion order is kept because it feeds the content hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicProperties {
    entries: Vec<(String, Value)>,
}

impl DynamicProperties {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or overwrite in place. Returns the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State shared by every node: id, application id, dynamic properties.
///
/// Also a node in its own right (`speckle_type` = `"Base"` unless the node
/// was deserialized from an unknown discriminator, in which case the original
/// chain is kept so the record round-trips).
#[derive(Default)]
pub struct Base {
    id: RwLock<Option<Id>>,
    pub application_id: Option<String>,
    dynamic: DynamicProperties,
    speckle_type: Option<String>,
}

impl Base {
    pub fn new() -> Self {
        Self::default()
    }

    /// A base node carrying a foreign discriminator chain.
    pub fn with_speckle_type(speckle_type: impl Into<String>) -> Self {
        Self {
            speckle_type: Some(speckle_type.into()),
            ..Self::default()
        }
    }

    /// Content id, present once the node has been serialized.
    pub fn id(&self) -> Option<Id> {
        self.id.read().clone()
    }

    pub(crate) fn set_id(&self, id: Id) {
        *self.id.write() = Some(id);
    }

    pub(crate) fn set_speckle_type(&mut self, speckle_type: String) {
        self.speckle_type = Some(speckle_type);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.dynamic.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.dynamic.set(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.dynamic.remove(key)
    }

    pub fn dynamic(&self) -> &DynamicProperties {
        &self.dynamic
    }

    pub fn dynamic_mut(&mut self) -> &mut DynamicProperties {
        &mut self.dynamic
    }
}

impl Clone for Base {
    fn clone(&self) -> Self {
        Self {
            id: RwLock::new(self.id()),
            application_id: self.application_id.clone(),
            dynamic: self.dynamic.clone(),
            speckle_type: self.speckle_type.clone(),
        }
    }
}

impl fmt::Debug for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Base")
            .field("id", &self.id())
            .field("speckle_type", &self.speckle_type())
            .field("application_id", &self.application_id)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

impl Node for Base {
    fn speckle_type(&self) -> &str {
        self.speckle_type.as_deref().unwrap_or(BASE_TYPE)
    }

    fn base(&self) -> &Base {
        self
    }

    fn base_mut(&mut self) -> &mut Base {
        self
    }
}
