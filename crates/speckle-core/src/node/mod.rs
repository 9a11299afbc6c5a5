// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node model
//!
//! A node is a polymorphic graph vertex with:
//!
//! - declared (typed) properties exposed by its concrete variant through
//!   [`Node::typed_properties`],
//! - an ordered bag of dynamically named properties held by [`Base`],
//! - a `speckle_type` discriminator chain.
//!
//! [`properties_of`] merges both into the canonical order the serializer
//! hashes: `speckle_type`, `applicationId`, typed properties in declaration
//! order, then dynamic properties in insertion order.

mod base;
mod chunk;
mod property;
mod reference;

pub use base::{Base, DynamicProperties, BASE_TYPE};
pub(crate) use chunk::chunk_items;
pub use chunk::{DataChunk, DATA_CHUNK_TYPE, DEFAULT_CHUNK_SIZE};
pub use property::{parse_chunk_syntax, Property, PropertyError, PropertyFlags};
pub use reference::{ObjectReference, REFERENCE_TYPE};

use crate::value::Value;
use std::fmt;

/// Separator between the type names of a discriminator chain.
pub const DISCRIMINATOR_SEPARATOR: char = ':';

/// Dynamic keys starting with this prefix are never serialized.
pub const RESERVED_PREFIX: &str = "__";

/// Dynamic keys starting with this character are detached.
pub const DETACH_PREFIX: char = '@';

/// Name of the id field appended after hashing.
pub const ID_FIELD: &str = "id";

/// Name of the closure map field appended after hashing.
pub const CLOSURE_FIELD: &str = "__closure";

/// Name of the discriminator field.
pub const TYPE_FIELD: &str = "speckle_type";

/// Name of the application id field.
pub const APPLICATION_ID_FIELD: &str = "applicationId";

/// A graph node.
///
/// Implementors hold a [`Base`] for the id, application id and dynamic
/// properties, and describe their declared fields through
/// [`typed_properties`](Node::typed_properties) and
/// [`set_typed_property`](Node::set_typed_property).
///
/// # Example
///
/// ```
/// use speckle_core::node::{Base, Node, Property, PropertyError};
/// use speckle_core::Value;
///
/// #[derive(Debug, Default)]
/// struct Level {
///     base: Base,
///     elevation: f64,
/// }
///
/// impl Node for Level {
///     fn speckle_type(&self) -> &str {
///         "Objects.BuiltElements.Level"
///     }
///     fn base(&self) -> &Base {
///         &self.base
///     }
///     fn base_mut(&mut self) -> &mut Base {
///         &mut self.base
///     }
///     fn typed_properties(&self) -> Vec<Property> {
///         vec![Property::new("elevation", self.elevation)]
///     }
///     fn set_typed_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
///         match name {
///             "elevation" => {
///                 self.elevation = value.as_f64().ok_or_else(|| PropertyError::invalid(name, "number"))?;
///                 Ok(())
///             }
///             _ => Err(PropertyError::Unknown(value)),
///         }
///     }
/// }
/// ```
pub trait Node: fmt::Debug + Send + Sync {
    /// Colon-joined discriminator chain, oldest ancestor first.
    fn speckle_type(&self) -> &str;

    fn base(&self) -> &Base;

    fn base_mut(&mut self) -> &mut Base;

    /// Declared properties in declaration order.
    fn typed_properties(&self) -> Vec<Property> {
        Vec::new()
    }

    /// Assign a declared property by its canonical name.
    ///
    /// Returns [`PropertyError::Unknown`] with the value handed back when the
    /// variant declares no such property, so the caller can keep it as a
    /// dynamic property instead.
    fn set_typed_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        let _ = name;
        Err(PropertyError::Unknown(value))
    }
}

/// All serializable properties of `node` in canonical order.
///
/// Skips the `id` field, typed properties flagged as ignored, and dynamic
/// keys carrying the reserved `__` prefix.
pub fn properties_of(node: &dyn Node) -> Vec<Property> {
    let base = node.base();
    let mut props = Vec::with_capacity(2 + base.dynamic().len());

    props.push(Property::new(TYPE_FIELD, node.speckle_type()));
    props.push(Property::new(
        APPLICATION_ID_FIELD,
        base.application_id.clone(),
    ));

    props.extend(
        node.typed_properties()
            .into_iter()
            .filter(|p| !p.flags.ignored && p.name != ID_FIELD),
    );

    for (key, value) in base.dynamic().iter() {
        if key.starts_with(RESERVED_PREFIX) {
            continue;
        }
        props.push(Property::dynamic(key, value.clone()));
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Column {
        base: Base,
        height: f64,
        cache_hint: String,
    }

    impl Node for Column {
        fn speckle_type(&self) -> &str {
            "Objects.BuiltElements.Column"
        }
        fn base(&self) -> &Base {
            &self.base
        }
        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
        fn typed_properties(&self) -> Vec<Property> {
            vec![
                Property::new("height", self.height),
                Property::new("cache_hint", self.cache_hint.clone()).ignored(),
                Property::new("id", "bogus"),
            ]
        }
    }

    #[test]
    fn test_canonical_order() {
        let mut column = Column {
            height: 3.0,
            ..Default::default()
        };
        column.base_mut().set("zeta", 1);
        column.base_mut().set("alpha", 2);
        column.base_mut().set("__internal", 3);
        column.base_mut().set("@detached", 4);

        let names: Vec<_> = properties_of(&column)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "speckle_type",
                "applicationId",
                "height",
                "zeta",
                "alpha",
                "@detached"
            ]
        );
    }

    #[test]
    fn test_dynamic_detach_flags() {
        let mut base = Base::new();
        base.set("@child", Value::Null);
        base.set("@(10)points", Value::List(vec![]));
        base.set("plain", Value::Null);

        let props = properties_of(&base);
        let child = props.iter().find(|p| p.name == "@child").unwrap();
        assert!(child.flags.detach);
        assert_eq!(child.flags.chunk_size, None);

        let points = props.iter().find(|p| p.name == "@(10)points").unwrap();
        assert!(points.flags.detach);
        assert_eq!(points.flags.chunk_size, Some(10));

        let plain = props.iter().find(|p| p.name == "plain").unwrap();
        assert!(!plain.flags.detach);
    }
}
