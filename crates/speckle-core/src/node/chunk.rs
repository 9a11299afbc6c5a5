// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{Base, Node, Property, PropertyError};
use crate::value::Value;

/// Discriminator of chunk records.
pub const DATA_CHUNK_TYPE: &str = "Speckle.Core.Models.DataChunk";

/// Chunk size used by the `@()name` dynamic key syntax.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Synthetic detached node holding one ordered slice of a chunked list.
#[derive(Debug, Default, Clone)]
pub struct DataChunk {
    pub base: Base,
    pub data: Vec<Value>,
}

impl DataChunk {
    pub fn new(data: Vec<Value>) -> Self {
        Self {
            base: Base::new(),
            data,
        }
    }
}

impl Node for DataChunk {
    fn speckle_type(&self) -> &str {
        DATA_CHUNK_TYPE
    }

    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn typed_properties(&self) -> Vec<Property> {
        vec![Property::new("data", Value::List(self.data.clone()))]
    }

    fn set_typed_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match (name, value) {
            ("data", Value::List(items)) => {
                self.data = items;
                Ok(())
            }
            ("data", Value::Null) => {
                self.data.clear();
                Ok(())
            }
            ("data", _) => Err(PropertyError::invalid(name, "list")),
            (_, value) => Err(PropertyError::Unknown(value)),
        }
    }
}

/// Items of a chunk node, or `None` if `node` is not a chunk.
pub(crate) fn chunk_items(node: &dyn Node) -> Option<Vec<Value>> {
    if node.speckle_type() != DATA_CHUNK_TYPE {
        return None;
    }
    node.typed_properties()
        .into_iter()
        .find(|p| p.name == "data")
        .and_then(|p| match p.value {
            Value::List(items) => Some(items),
            _ => None,
        })
}
