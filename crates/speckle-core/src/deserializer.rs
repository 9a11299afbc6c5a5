// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Record deserializer
//!
//! Rebuilds a typed node from one record's JSON. Nested inline objects are
//! rebuilt recursively; reference stubs are looked up through a
//! [`ReferenceResolver`] holding the already rebuilt detached children.

use crate::error::DeserializeError;
use crate::hash::Id;
use crate::node::{
    chunk_items, Node, ObjectReference, PropertyError, APPLICATION_ID_FIELD, ID_FIELD,
    REFERENCE_TYPE, RESERVED_PREFIX, TYPE_FIELD,
};
use crate::registry::{SchemaVersion, TypeRegistry};
use crate::value::Value;
use dashmap::DashMap;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up already rebuilt nodes by id.
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, id: &Id) -> Option<Arc<dyn Node>>;
}

impl ReferenceResolver for HashMap<Id, Arc<dyn Node>> {
    fn resolve(&self, id: &Id) -> Option<Arc<dyn Node>> {
        self.get(id).cloned()
    }
}

impl ReferenceResolver for DashMap<Id, Arc<dyn Node>> {
    fn resolve(&self, id: &Id) -> Option<Arc<dyn Node>> {
        self.get(id).map(|node| Arc::clone(node.value()))
    }
}

impl<T: ReferenceResolver + ?Sized> ReferenceResolver for Arc<T> {
    fn resolve(&self, id: &Id) -> Option<Arc<dyn Node>> {
        (**self).resolve(id)
    }
}

/// Resolves nothing; every reference stays a [`Value::Reference`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    fn resolve(&self, _id: &Id) -> Option<Arc<dyn Node>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Deserializer {
    registry: Arc<TypeRegistry>,
    version: Option<SchemaVersion>,
}

impl Deserializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            version: None,
        }
    }

    /// Resolve types for data written at `version`.
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Rebuild one record.
    ///
    /// A reference stub at the root is returned as the node it points to,
    /// which must be known to `resolver`.
    pub fn deserialize(
        &self,
        json: &str,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Arc<dyn Node>, DeserializeError> {
        let parsed: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(map) = parsed else {
            return Err(DeserializeError::NotAnObject(json_kind(&parsed)));
        };

        if is_reference(&map) {
            let reference = parse_reference(map)?;
            return resolver.resolve(&reference.referenced_id).ok_or_else(|| {
                DeserializeError::MalformedReference(format!(
                    "root reference {} is not resolvable",
                    reference.referenced_id
                ))
            });
        }

        self.node(map, resolver).map(Arc::from)
    }

    fn node(
        &self,
        map: Map<String, serde_json::Value>,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Box<dyn Node>, DeserializeError> {
        let chain = map
            .get(TYPE_FIELD)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(crate::node::BASE_TYPE)
            .to_string();
        let resolution = self.registry.resolve(&chain, self.version);
        let record = resolution.record;

        let mut node = record.create();
        if resolution.fallback {
            node.base_mut().set_speckle_type(chain.clone());
        }

        for (key, raw) in map {
            match key.as_str() {
                TYPE_FIELD => continue,
                ID_FIELD => {
                    if let Some(id) = raw.as_str() {
                        node.base().set_id(Id::new(id));
                    }
                    continue;
                }
                APPLICATION_ID_FIELD => {
                    node.base_mut().application_id = raw.as_str().map(str::to_string);
                    continue;
                }
                k if k.starts_with(RESERVED_PREFIX) => continue,
                _ => {}
            }

            let value = self.value(raw, resolver)?;
            let Some(declared) = record.property_name(&key) else {
                node.base_mut().set(key, value);
                continue;
            };

            match node.set_typed_property(declared, value) {
                Ok(()) => {}
                Err(PropertyError::Unknown(value)) => {
                    node.base_mut().set(key, value);
                }
                Err(PropertyError::Invalid { name, expected }) => {
                    return Err(DeserializeError::InvalidProperty {
                        speckle_type: chain,
                        name,
                        expected,
                    });
                }
            }
        }

        record.run_hooks(node.as_mut());
        Ok(node)
    }

    fn value(
        &self,
        raw: serde_json::Value,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Value, DeserializeError> {
        Ok(match raw {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => number(&n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                let stubs_only = !items.is_empty()
                    && items.iter().all(|item| {
                        matches!(item, serde_json::Value::Object(map) if is_reference(map))
                    });
                let items = items
                    .into_iter()
                    .map(|item| self.value(item, resolver))
                    .collect::<Result<Vec<_>, _>>()?;
                if stubs_only {
                    flatten_chunks(items)
                } else {
                    Value::List(items)
                }
            }
            serde_json::Value::Object(map) if is_reference(&map) => {
                let reference = parse_reference(map)?;
                match resolver.resolve(&reference.referenced_id) {
                    Some(node) => Value::Object(node),
                    None => {
                        tracing::debug!(id = %reference.referenced_id, "reference left unresolved");
                        Value::Reference(reference)
                    }
                }
            }
            serde_json::Value::Object(map) if map.contains_key(TYPE_FIELD) => {
                Value::Object(Arc::from(self.node(map, resolver)?))
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((Value::String(k), self.value(v, resolver)?)))
                    .collect::<Result<Vec<_>, DeserializeError>>()?,
            ),
        })
    }
}

fn is_reference(map: &Map<String, serde_json::Value>) -> bool {
    map.get(TYPE_FIELD).and_then(serde_json::Value::as_str) == Some(REFERENCE_TYPE)
}

fn parse_reference(
    map: Map<String, serde_json::Value>,
) -> Result<ObjectReference, DeserializeError> {
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| DeserializeError::MalformedReference(e.to_string()))
}

fn number(n: &serde_json::Number) -> Value {
    if let Some(v) = n.as_i64() {
        Value::Int(v)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// A list of references that all resolved to chunk nodes is replaced by the
/// concatenated chunk items.
fn flatten_chunks(items: Vec<Value>) -> Value {
    let mut flat = Vec::new();
    for item in &items {
        match item.as_object().and_then(|node| chunk_items(node.as_ref())) {
            Some(data) => flat.extend(data),
            None => return Value::List(items),
        }
    }
    Value::List(flat)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Base, DataChunk, Property, BASE_TYPE, DATA_CHUNK_TYPE};
    use crate::registry::TypeRecord;
    use crate::serializer::serialize;

    #[derive(Debug, Default)]
    struct Level {
        base: Base,
        elevation: f64,
        name: String,
    }

    impl Node for Level {
        fn speckle_type(&self) -> &str {
            "Objects.BuiltElements.Level"
        }
        fn base(&self) -> &Base {
            &self.base
        }
        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
        fn typed_properties(&self) -> Vec<Property> {
            vec![
                Property::new("elevation", self.elevation),
                Property::new("name", self.name.clone()),
            ]
        }
        fn set_typed_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
            match name {
                "elevation" => {
                    self.elevation = value
                        .as_f64()
                        .ok_or_else(|| PropertyError::invalid(name, "number"))?;
                }
                "name" => {
                    self.name = value
                        .as_str()
                        .ok_or_else(|| PropertyError::invalid(name, "string"))?
                        .to_string();
                }
                _ => return Err(PropertyError::Unknown(value)),
            }
            Ok(())
        }
    }

    fn new_level() -> Box<dyn Node> {
        Box::new(Level::default())
    }

    fn mark_loaded(node: &mut dyn Node) {
        node.base_mut().set("__loaded", true);
    }

    fn deserializer() -> Deserializer {
        let mut registry = TypeRegistry::new(SchemaVersion::new(2, 0, 0));
        registry
            .register(TypeRecord::new("Objects.BuiltElements.Level", new_level).with_hook(mark_loaded))
            .unwrap();
        Deserializer::new(Arc::new(registry))
    }

    #[test]
    fn test_typed_round_trip() {
        let mut level = Level {
            elevation: 3.5,
            name: "L1".into(),
            ..Default::default()
        };
        level.base_mut().application_id = Some("app-1".into());
        level.base_mut().set("comment", "ground floor");

        let record = serialize(&level).unwrap().next().unwrap();
        let node = deserializer().deserialize(&record.json, &NoReferences).unwrap();

        assert_eq!(node.speckle_type(), "Objects.BuiltElements.Level");
        assert_eq!(node.base().id(), Some(record.id.clone()));
        assert_eq!(node.base().application_id.as_deref(), Some("app-1"));
        assert_eq!(node.base().get("comment"), Some(&Value::from("ground floor")));

        let props = node.typed_properties();
        assert_eq!(props[0].value, Value::Float(3.5));
        assert_eq!(props[1].value, Value::from("L1"));

        // Re-serializing the rebuilt node gives the same id
        let again = serialize(node.as_ref()).unwrap().next().unwrap();
        assert_eq!(again.id, record.id);
    }

    #[test]
    fn test_properties_bind_case_insensitively() {
        let json = r#"{"speckle_type":"Objects.BuiltElements.Level","Elevation":7,"NAME":"roof","id":"x"}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        let props = node.typed_properties();
        assert_eq!(props[0].value, Value::Float(7.0));
        assert_eq!(props[1].value, Value::from("roof"));
        assert!(node.base().dynamic().is_empty());
    }

    #[test]
    fn test_invalid_typed_value() {
        let json = r#"{"speckle_type":"Objects.BuiltElements.Level","elevation":"high"}"#;
        let err = deserializer().deserialize(json, &NoReferences).unwrap_err();
        assert!(matches!(
            err,
            DeserializeError::InvalidProperty { ref name, expected: "number", .. } if name == "elevation"
        ));
    }

    #[test]
    fn test_unknown_type_keeps_chain() {
        let json = r#"{"speckle_type":"Vendor.Widget:Vendor.Widget.Special","size":2,"id":"abc"}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        assert_eq!(node.speckle_type(), "Vendor.Widget:Vendor.Widget.Special");
        assert_eq!(node.base().get("size"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_reserved_keys_dropped() {
        let json = r#"{"speckle_type":"Base","__closure":{"a":1},"__internal":1,"keep":true}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        assert_eq!(node.base().dynamic().keys().collect::<Vec<_>>(), vec!["keep"]);
        assert_eq!(node.speckle_type(), BASE_TYPE);
    }

    #[test]
    fn test_hooks_run() {
        let json = r#"{"speckle_type":"Objects.BuiltElements.Level","elevation":1}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        assert_eq!(node.base().get("__loaded"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_references_resolve_or_stay() {
        let child: Arc<dyn Node> = Arc::new(Base::new());
        let mut known: HashMap<Id, Arc<dyn Node>> = HashMap::new();
        known.insert(Id::new("known"), Arc::clone(&child));

        let json = r#"{"speckle_type":"Base",
            "@a":{"speckle_type":"reference","referencedId":"known"},
            "@b":{"speckle_type":"reference","referencedId":"missing"}}"#;
        let node = deserializer().deserialize(json, &known).unwrap();

        let a = node.base().get("@a").and_then(Value::as_object).unwrap();
        assert!(Arc::ptr_eq(a, &child));
        let b = node.base().get("@b").and_then(Value::as_reference).unwrap();
        assert_eq!(b.referenced_id, Id::new("missing"));
    }

    #[test]
    fn test_root_reference() {
        let child: Arc<dyn Node> = Arc::new(Base::new());
        let known: DashMap<Id, Arc<dyn Node>> = DashMap::new();
        known.insert(Id::new("r"), Arc::clone(&child));

        let stub = r#"{"speckle_type":"reference","referencedId":"r"}"#;
        let node = deserializer().deserialize(stub, &known).unwrap();
        assert!(Arc::ptr_eq(&node, &child));

        assert!(matches!(
            deserializer().deserialize(stub, &NoReferences),
            Err(DeserializeError::MalformedReference(_))
        ));
    }

    #[test]
    fn test_malformed_reference() {
        let json = r#"{"speckle_type":"Base","@a":{"speckle_type":"reference"}}"#;
        assert!(matches!(
            deserializer().deserialize(json, &NoReferences),
            Err(DeserializeError::MalformedReference(_))
        ));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            deserializer().deserialize("[1,2]", &NoReferences),
            Err(DeserializeError::NotAnObject("array"))
        ));
        assert!(matches!(
            deserializer().deserialize("{", &NoReferences),
            Err(DeserializeError::Json(_))
        ));
    }

    #[test]
    fn test_chunk_references_flatten() {
        let known: HashMap<Id, Arc<dyn Node>> = [
            (Id::new("c1"), Arc::new(DataChunk::new(vec![Value::Int(1), Value::Int(2)])) as Arc<dyn Node>),
            (Id::new("c2"), Arc::new(DataChunk::new(vec![Value::Int(3)])) as Arc<dyn Node>),
        ]
        .into_iter()
        .collect();

        let json = r#"{"speckle_type":"Base","@(2)values":[
            {"speckle_type":"reference","referencedId":"c1"},
            {"speckle_type":"reference","referencedId":"c2"}]}"#;
        let node = deserializer().deserialize(json, &known).unwrap();
        assert_eq!(
            node.base().get("@(2)values"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
    }

    #[test]
    fn test_inline_chunk_list_is_kept() {
        let json = r#"{"speckle_type":"Base","parts":[
            {"speckle_type":"Speckle.Core.Models.DataChunk","data":[1,2]},
            {"speckle_type":"Speckle.Core.Models.DataChunk","data":[3]}]}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        let parts = node.base().get("parts").and_then(Value::as_list).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_object().unwrap().speckle_type(), DATA_CHUNK_TYPE);
    }

    #[test]
    fn test_plain_objects_become_maps() {
        let json = r#"{"speckle_type":"Base","params":{"b":1,"a":"x"}}"#;
        let node = deserializer().deserialize(json, &NoReferences).unwrap();
        let params = node.base().get("params").unwrap();
        assert_eq!(params.get_key("a"), Some(&Value::from("x")));
        match params {
            Value::Map(entries) => assert_eq!(entries[0].0, Value::from("b")),
            other => panic!("expected map, got {other:?}"),
        }
    }
}
