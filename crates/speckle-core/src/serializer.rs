// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content-addressed serializer
//!
//! Walks a node graph and decomposes it into hash-identified records.
//!
//! # Per-node layout
//!
//! ```text
//! {"speckle_type":..,"applicationId":..,<typed..>,<dynamic..>   <- hashed
//!  ,"id":"<hash>","__closure":{..}}                             <- appended
//! ```
//!
//! The id is the hash of the bytes written before `id`, so it never covers
//! the id itself or the closure map. Property order is the canonical order of
//! [`properties_of`]; two graphs differing only in dynamic insertion order
//! hash differently.
//!
//! # Output order
//!
//! The root record first, then detached records in the order their subtrees
//! completed (depth-first). A detached node reachable through several paths
//! is emitted once.

use crate::closure::{Closure, ClosureTracker};
use crate::error::SerializeError;
use crate::hash::Id;
use crate::node::{
    properties_of, DataChunk, Node, ObjectReference, CLOSURE_FIELD, ID_FIELD, REFERENCE_TYPE,
    TYPE_FIELD,
};
use crate::value::Value;
use chrono::SecondsFormat;
use std::collections::HashSet;

/// Unit of storage and transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: Id,
    pub json: String,
    pub speckle_type: String,
    pub application_id: Option<String>,
    pub closure: Closure,
}

impl Record {
    /// Lightweight pointer to this record.
    pub fn reference(&self) -> ObjectReference {
        let mut reference = ObjectReference::new(self.id.clone()).with_closure(self.closure.clone());
        reference.application_id = self.application_id.clone();
        reference
    }
}

/// Records of one serializer run: root first, then detached records.
///
/// Single pass; serialize again to get a fresh sequence.
#[derive(Debug)]
pub struct SerializedObjects {
    root_id: Id,
    root: Option<Record>,
    children: std::vec::IntoIter<Record>,
}

impl SerializedObjects {
    pub fn root_id(&self) -> &Id {
        &self.root_id
    }
}

impl Iterator for SerializedObjects {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.root.take().or_else(|| self.children.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::from(self.root.is_some()) + self.children.len();
        (n, Some(n))
    }
}

impl ExactSizeIterator for SerializedObjects {}

/// Serialize `root` with a fresh serializer.
pub fn serialize(root: &dyn Node) -> Result<SerializedObjects, SerializeError> {
    ObjectSerializer::new().serialize(root)
}

/// Reusable serializer state.
#[derive(Debug, Default)]
pub struct ObjectSerializer {
    tracker: ClosureTracker,
    detached: Vec<Record>,
    emitted: HashSet<Id>,
}

impl ObjectSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompose `root` into records. Assigns ids to every node visited.
    pub fn serialize(&mut self, root: &dyn Node) -> Result<SerializedObjects, SerializeError> {
        self.tracker.reset();
        self.detached.clear();
        self.emitted.clear();

        let (id, json, closure) = self.write_node(root)?;
        let root_record = Record {
            id: id.clone(),
            json,
            speckle_type: root.speckle_type().to_string(),
            application_id: root.base().application_id.clone(),
            closure,
        };
        let children = std::mem::take(&mut self.detached);

        tracing::debug!(
            root = %id,
            detached = children.len(),
            "serialized object graph"
        );

        Ok(SerializedObjects {
            root_id: id,
            root: Some(root_record),
            children: children.into_iter(),
        })
    }

    /// Re-wrap an existing reference as a record without decomposing it.
    pub fn serialize_reference(
        &mut self,
        reference: &ObjectReference,
    ) -> Result<SerializedObjects, SerializeError> {
        let mut out = JsonWriter::default();
        out.reference(reference)?;
        let record = Record {
            id: reference.referenced_id.clone(),
            json: out.into_string(),
            speckle_type: REFERENCE_TYPE.to_string(),
            application_id: reference.application_id.clone(),
            closure: reference.closure.clone().unwrap_or_default(),
        };
        Ok(SerializedObjects {
            root_id: record.id.clone(),
            root: Some(record),
            children: Vec::new().into_iter(),
        })
    }

    fn write_node(&mut self, node: &dyn Node) -> Result<(Id, String, Closure), SerializeError> {
        self.tracker.enter();
        let mut out = JsonWriter::default();
        out.begin_object();

        for prop in properties_of(node) {
            out.key(&prop.name)?;
            match (prop.flags.chunk_size, prop.value) {
                (Some(size), Value::List(items)) => {
                    self.write_chunks(&mut out, &prop.name, &items, size)?;
                }
                (_, value) => self.write_value(&mut out, &prop.name, &value, prop.flags.detach)?,
            }
        }

        let id = Id::compute(out.as_bytes());
        let closure = self.tracker.exit();

        out.key(ID_FIELD)?;
        out.string(id.as_str())?;
        if !closure.is_empty() {
            out.key(CLOSURE_FIELD)?;
            out.closure(&closure)?;
        }
        out.end_object();

        node.base().set_id(id.clone());
        Ok((id, out.into_string(), closure))
    }

    /// Serialize `node` as its own record and link it into the current closure.
    fn detach(&mut self, node: &dyn Node) -> Result<Id, SerializeError> {
        let (id, json, closure) = self.write_node(node)?;
        self.tracker.add_child(&id);
        if self.emitted.insert(id.clone()) {
            self.detached.push(Record {
                id: id.clone(),
                json,
                speckle_type: node.speckle_type().to_string(),
                application_id: node.base().application_id.clone(),
                closure,
            });
        }
        Ok(id)
    }

    fn write_chunks(
        &mut self,
        out: &mut JsonWriter,
        property: &str,
        items: &[Value],
        chunk_size: usize,
    ) -> Result<(), SerializeError> {
        if chunk_size == 0 {
            return Err(SerializeError::ZeroChunkSize(property.to_string()));
        }
        out.begin_array();
        for slice in items.chunks(chunk_size) {
            let chunk = DataChunk::new(slice.to_vec());
            let id = self.detach(&chunk)?;
            out.reference_stub(&id)?;
        }
        out.end_array();
        Ok(())
    }

    fn write_value(
        &mut self,
        out: &mut JsonWriter,
        property: &str,
        value: &Value,
        detach: bool,
    ) -> Result<(), SerializeError> {
        match value {
            Value::Null => out.raw("null"),
            Value::Bool(v) => out.raw(if *v { "true" } else { "false" }),
            Value::Int(v) | Value::Enum(v) => out.number(v)?,
            Value::Float(v) => out.number(v)?,
            Value::String(v) => out.string(v)?,
            Value::Guid(v) => out.string(&v.to_string())?,
            Value::Date(v) => out.string(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true))?,
            Value::Matrix(m) => {
                out.begin_array();
                for v in m.iter() {
                    out.number(v)?;
                }
                out.end_array();
            }
            Value::List(items) => {
                out.begin_array();
                for item in items {
                    self.write_value(out, property, item, detach)?;
                }
                out.end_array();
            }
            Value::Map(entries) => {
                out.begin_object();
                for (key, item) in entries {
                    let key = key.as_str().ok_or_else(|| SerializeError::NonStringKey {
                        property: property.to_string(),
                        found: key.kind(),
                    })?;
                    out.key(key)?;
                    self.write_value(out, property, item, detach)?;
                }
                out.end_object();
            }
            Value::Object(node) => {
                if detach {
                    let id = self.detach(node.as_ref())?;
                    out.reference_stub(&id)?;
                } else {
                    let (_, json, _) = self.write_node(node.as_ref())?;
                    out.raw(&json);
                }
            }
            Value::Reference(reference) => {
                self.tracker.add_reference(reference);
                out.reference(reference)?;
            }
        }
        Ok(())
    }
}

/// Minimal streaming JSON writer with automatic separators.
#[derive(Debug, Default)]
struct JsonWriter {
    buf: Vec<u8>,
    /// One entry per open container: true until its first member is written.
    first: Vec<bool>,
    after_key: bool,
}

impl JsonWriter {
    fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn into_string(self) -> String {
        // Only valid UTF-8 is ever written.
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    fn separate(&mut self) {
        if let Some(first) = self.first.last_mut() {
            if *first {
                *first = false;
            } else {
                self.buf.push(b',');
            }
        }
    }

    fn prefix(&mut self) {
        if self.after_key {
            self.after_key = false;
        } else {
            self.separate();
        }
    }

    fn begin_object(&mut self) {
        self.prefix();
        self.buf.push(b'{');
        self.first.push(true);
    }

    fn end_object(&mut self) {
        self.first.pop();
        self.buf.push(b'}');
    }

    fn begin_array(&mut self) {
        self.prefix();
        self.buf.push(b'[');
        self.first.push(true);
    }

    fn end_array(&mut self) {
        self.first.pop();
        self.buf.push(b']');
    }

    fn key(&mut self, key: &str) -> Result<(), SerializeError> {
        self.separate();
        serde_json::to_writer(&mut self.buf, key)?;
        self.buf.push(b':');
        self.after_key = true;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), SerializeError> {
        self.prefix();
        serde_json::to_writer(&mut self.buf, value)?;
        Ok(())
    }

    fn number<T: serde::Serialize>(&mut self, value: &T) -> Result<(), SerializeError> {
        self.prefix();
        serde_json::to_writer(&mut self.buf, value)?;
        Ok(())
    }

    fn raw(&mut self, json: &str) {
        self.prefix();
        self.buf.extend_from_slice(json.as_bytes());
    }

    fn closure(&mut self, closure: &Closure) -> Result<(), SerializeError> {
        self.begin_object();
        for (id, depth) in closure {
            self.key(id.as_str())?;
            self.number(depth)?;
        }
        self.end_object();
        Ok(())
    }

    fn reference_stub(&mut self, id: &Id) -> Result<(), SerializeError> {
        self.begin_object();
        self.key(TYPE_FIELD)?;
        self.string(REFERENCE_TYPE)?;
        self.key("referencedId")?;
        self.string(id.as_str())?;
        self.end_object();
        Ok(())
    }

    fn reference(&mut self, reference: &ObjectReference) -> Result<(), SerializeError> {
        self.begin_object();
        self.key(TYPE_FIELD)?;
        self.string(REFERENCE_TYPE)?;
        self.key("referencedId")?;
        self.string(reference.referenced_id.as_str())?;
        if let Some(application_id) = &reference.application_id {
            self.key("applicationId")?;
            self.string(application_id)?;
        }
        if let Some(closure) = &reference.closure {
            self.key(CLOSURE_FIELD)?;
            self.closure(closure)?;
        }
        self.end_object();
        Ok(())
    }
}
