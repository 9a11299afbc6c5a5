// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speckle Core
//!
//! Content-addressed object model for AEC/BIM graphs.
//!
//! # Features
//!
//! - **Node model** -- typed properties plus an ordered dynamic property bag
//! - **Serializer** -- decomposes a graph into hash-identified records with
//!   closure maps, detached children and chunked lists
//! - **Type registry** -- discriminator chains resolved against versioned
//!   type definitions, falling back to `Base`
//! - **Deserializer** -- rebuilds typed nodes from records
//! - **Worker pool** -- bounded deserialization threads with inline fallback
//!
//! # Architecture
//!
//! ```text
//! Node graph --ObjectSerializer--> Record { id, json, closure } ...
//!                 |                      root first, then detached
//!                 +-- ClosureTracker
//!
//! Record json --Deserializer--> Arc<dyn Node>
//!                 +-- TypeRegistry (resolve discriminator, bind properties)
//!                 +-- ReferenceResolver (already rebuilt children)
//! ```
//!
//! # Example
//!
//! ```
//! use speckle_core::node::Base;
//! use speckle_core::{serialize, Value};
//!
//! let mut wall = Base::with_speckle_type("Objects.BuiltElements.Wall");
//! wall.set("height", 3.0);
//!
//! let mut root = Base::new();
//! root.set("@elements", vec![Value::object(wall)]);
//!
//! let records: Vec<_> = serialize(&root).unwrap().collect();
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].closure.len(), 1);
//! ```

pub mod closure;
pub mod deserializer;
pub mod error;
pub mod hash;
pub mod node;
pub mod registry;
pub mod serializer;
pub mod value;
pub mod workers;

pub use closure::{closure_of, Closure, ClosureTracker};
pub use deserializer::{Deserializer, NoReferences, ReferenceResolver};
pub use error::{DeserializeError, SerializeError};
pub use hash::{Id, HASH_LENGTH};
pub use node::{Base, DataChunk, Node, ObjectReference, Property};
pub use registry::{
    Resolution, SchemaVersion, TypeRecord, TypeRegistry, TypeVersionSet, RegistryError,
};
pub use serializer::{serialize, ObjectSerializer, Record, SerializedObjects};
pub use value::Value;
pub use workers::{DeserializePool, PoolMetrics, TaskHandle, WorkerPoolConfig};
