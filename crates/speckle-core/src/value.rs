// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property values.

use crate::node::{Node, ObjectReference};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A property value that a node can carry.
///
/// Nested nodes are shared (`Arc`) so the same child may appear under
/// several parents; the serializer emits it once and keeps the minimum
/// closure depth.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Enum discriminant, written as an integer.
    Enum(i64),
    Guid(Uuid),
    /// Written as an ISO 8601 string.
    Date(DateTime<Utc>),
    /// Row-major 4x4 transform, written as a 16-element array.
    Matrix(Box<[f64; 16]>),

    // Composites
    List(Vec<Value>),
    /// Ordered map. Keys must be [`Value::String`] to serialize.
    Map(Vec<(Value, Value)>),
    Object(Arc<dyn Node>),
    Reference(ObjectReference),
}

impl Value {
    /// Build a string-keyed map preserving iteration order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), v.into()))
                .collect(),
        )
    }

    /// Wrap a node.
    pub fn object(node: impl Node + 'static) -> Self {
        Self::Object(Arc::new(node))
    }

    /// Check if value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) | Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Guid view; accepts the hyphenated string form records carry.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Guid(v) => Some(*v),
            Self::String(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Date view; accepts the RFC 3339 string form records carry.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(v) => Some(*v),
            Self::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Node>> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectReference> {
        match self {
            Self::Reference(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a string key in a map value.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::Guid(_) => "guid",
            Self::Date(_) => "date",
            Self::Matrix(_) => "matrix",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Reference(_) => "reference",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Enum(v) => write!(f, "Enum({v})"),
            Self::Guid(v) => write!(f, "Guid({v})"),
            Self::Date(v) => write!(f, "Date({v})"),
            Self::Matrix(v) => write!(f, "Matrix({:?})", &v[..]),
            Self::List(v) => f.debug_list().entries(v).finish(),
            Self::Map(v) => f.debug_map().entries(v.iter().map(|(k, v)| (k, v))).finish(),
            Self::Object(node) => write!(f, "Object({node:?})"),
            Self::Reference(r) => write!(f, "Reference({})", r.referenced_id),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) | (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Guid(a), Self::Guid(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Matrix(a), Self::Matrix(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                Arc::ptr_eq(a, b) || matches!((a.base().id(), b.base().id()), (Some(x), Some(y)) if x == y)
            }
            (Self::Reference(a), Self::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

impl From<[f64; 16]> for Value {
    fn from(v: [f64; 16]) -> Self {
        Self::Matrix(Box::new(v))
    }
}

impl From<Arc<dyn Node>> for Value {
    fn from(v: Arc<dyn Node>) -> Self {
        Self::Object(v)
    }
}

impl From<ObjectReference> for Value {
    fn from(v: ObjectReference) -> Self {
        Self::Reference(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from(2.5f32), Value::Float(2.5));
        assert_eq!(Value::from("wall"), Value::String("wall".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1, 2]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_map_lookup_preserves_order() {
        let map = Value::map([("b", 1), ("a", 2)]);
        assert_eq!(map.get_key("a"), Some(&Value::Int(2)));
        match map {
            Value::Map(entries) => assert_eq!(entries[0].0, Value::from("b")),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Enum(2).as_i64(), Some(2));
        assert_eq!(Value::Float(1.5).as_i64(), None);
    }

    #[test]
    fn test_string_forms_of_guid_and_date() {
        let guid = Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert!(guid.as_guid().is_some());
        assert!(Value::from("not a guid").as_guid().is_none());

        let date = Value::from("2024-03-01T12:00:00Z");
        assert_eq!(date.as_date().map(|d| d.timestamp()), Some(1_709_294_400));
    }
}
