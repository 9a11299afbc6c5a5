// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Version-aware type registry
//!
//! Maps discriminator chains to node factories. Types are grouped by their
//! unversioned name into a [`TypeVersionSet`]; resolution picks the oldest
//! registered version that is new enough for the requested schema version.
//!
//! ```text
//! "Objects.Geometry:Objects.BuiltElements.Wall"
//!                    ^^^^^^^^^^^^^^^^^^^^^^^^^^ tried first
//!   then "Objects.BuiltElements.Deprecated.Wall"
//!   then "Objects.Geometry", "Objects.Deprecated.Geometry"
//!   then Base (fallback, never an error)
//! ```
//!
//! A registry is built once at startup and shared by reference; there is no
//! process-wide instance.

mod version;

pub use version::{split_versioned, SchemaVersion, VERSIONS_SEGMENT};

use crate::node::{Base, DataChunk, Node, BASE_TYPE, DATA_CHUNK_TYPE, DISCRIMINATOR_SEPARATOR};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Constructs an empty instance of a registered type.
pub type NodeFactory = fn() -> Box<dyn Node>;

/// Runs after a deserialized node has been populated.
pub type PostLoadHook = fn(&mut dyn Node);

/// Namespace segment tried when a type name is not registered.
pub const DEPRECATED_SEGMENT: &str = "Deprecated";

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid schema version '{0}'")]
    InvalidVersion(String),

    #[error("empty type discriminator")]
    EmptyName,

    #[error("type '{0}' already has a current (unversioned) definition")]
    DuplicateLatest(String),

    #[error("type '{name}' already registered at version {version}")]
    DuplicateVersion {
        name: String,
        version: SchemaVersion,
    },
}

// ---------------------------------------------------------------------------
// TypeRecord
// ---------------------------------------------------------------------------

/// A registered type: discriminator, factory, property map and hooks.
pub struct TypeRecord {
    discriminator: String,
    name: String,
    version: Option<SchemaVersion>,
    factory: NodeFactory,
    hooks: Vec<PostLoadHook>,
    /// Lowercased property name -> declared name. Built on first use.
    properties: OnceLock<HashMap<String, String>>,
}

impl TypeRecord {
    /// `discriminator` is either plain (`Objects.Wall`, the current
    /// definition) or versioned (`Objects.Versions.V_1_0_0.Wall`).
    pub fn new(discriminator: impl Into<String>, factory: NodeFactory) -> Self {
        let discriminator = discriminator.into();
        let (name, version) = split_versioned(&discriminator);
        Self {
            discriminator,
            name,
            version,
            factory,
            hooks: Vec::new(),
            properties: OnceLock::new(),
        }
    }

    pub fn with_hook(mut self, hook: PostLoadHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Discriminator as registered, versioned namespace included.
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Unversioned name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit version, `None` for the current definition.
    pub fn version(&self) -> Option<SchemaVersion> {
        self.version
    }

    pub fn create(&self) -> Box<dyn Node> {
        (self.factory)()
    }

    pub fn hooks(&self) -> &[PostLoadHook] {
        &self.hooks
    }

    pub fn run_hooks(&self, node: &mut dyn Node) {
        for hook in &self.hooks {
            hook(node);
        }
    }

    /// Declared property name matching `key` case-insensitively.
    pub fn property_name(&self, key: &str) -> Option<&str> {
        self.properties
            .get_or_init(|| {
                self.create()
                    .typed_properties()
                    .into_iter()
                    .map(|p| (p.name.to_lowercase(), p.name))
                    .collect()
            })
            .get(&key.to_lowercase())
            .map(String::as_str)
    }
}

impl fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRecord")
            .field("discriminator", &self.discriminator)
            .field("version", &self.version)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypeVersionSet
// ---------------------------------------------------------------------------

/// All registered versions of one unversioned type name.
#[derive(Debug)]
pub struct TypeVersionSet {
    name: String,
    versions: BTreeMap<SchemaVersion, Arc<TypeRecord>>,
    current: Option<Arc<TypeRecord>>,
}

impl TypeVersionSet {
    fn new(name: String) -> Self {
        Self {
            name,
            versions: BTreeMap::new(),
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit versions, ascending.
    pub fn versions(&self) -> impl Iterator<Item = SchemaVersion> + '_ {
        self.versions.keys().copied()
    }

    /// The current definition, or the highest explicit version.
    fn latest(&self, schema: SchemaVersion) -> Option<(SchemaVersion, Arc<TypeRecord>)> {
        if let Some(current) = &self.current {
            return Some((schema, Arc::clone(current)));
        }
        self.versions
            .iter()
            .next_back()
            .map(|(v, record)| (*v, Arc::clone(record)))
    }

    fn select(
        &self,
        requested: Option<SchemaVersion>,
        schema: SchemaVersion,
    ) -> Option<(SchemaVersion, Arc<TypeRecord>)> {
        match requested {
            None => self.latest(schema),
            Some(v) if v == schema => self.latest(schema),
            Some(v) => self
                .versions
                .range(v..)
                .next()
                .map(|(v, record)| (*v, Arc::clone(record)))
                .or_else(|| self.latest(schema)),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Outcome of [`TypeRegistry::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub version: SchemaVersion,
    pub record: Arc<TypeRecord>,
    /// No chain segment matched; `record` is the base type.
    pub fallback: bool,
}

type CacheKey = (String, Option<SchemaVersion>);

pub struct TypeRegistry {
    schema_version: SchemaVersion,
    sets: HashMap<String, TypeVersionSet>,
    base: Arc<TypeRecord>,
    resolved: DashMap<CacheKey, Resolution>,
}

impl TypeRegistry {
    /// Registry loaded at `schema_version`, with `Base` and the chunk type
    /// pre-registered.
    pub fn new(schema_version: SchemaVersion) -> Self {
        let base = Arc::new(TypeRecord::new(BASE_TYPE, new_base));
        let mut registry = Self {
            schema_version,
            sets: HashMap::new(),
            base: Arc::clone(&base),
            resolved: DashMap::new(),
        };

        let mut base_set = TypeVersionSet::new(BASE_TYPE.to_string());
        base_set.current = Some(base);
        registry.sets.insert(BASE_TYPE.to_string(), base_set);

        let mut chunk_set = TypeVersionSet::new(DATA_CHUNK_TYPE.to_string());
        chunk_set.current = Some(Arc::new(TypeRecord::new(DATA_CHUNK_TYPE, new_chunk)));
        registry.sets.insert(DATA_CHUNK_TYPE.to_string(), chunk_set);

        registry
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Register one type.
    ///
    /// A plain discriminator claims the current slot of its name; a second
    /// plain registration for the same name is rejected, as is a repeated
    /// explicit version.
    pub fn register(&mut self, record: TypeRecord) -> Result<(), RegistryError> {
        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let set = self
            .sets
            .entry(record.name.clone())
            .or_insert_with(|| TypeVersionSet::new(record.name.clone()));

        match record.version {
            None => {
                if set.current.is_some() {
                    return Err(RegistryError::DuplicateLatest(record.name));
                }
                tracing::debug!(name = %record.name, "registered current type");
                set.current = Some(Arc::new(record));
            }
            Some(version) => {
                if set.versions.contains_key(&version) {
                    return Err(RegistryError::DuplicateVersion {
                        name: record.name,
                        version,
                    });
                }
                tracing::debug!(name = %record.name, %version, "registered versioned type");
                set.versions.insert(version, Arc::new(record));
            }
        }

        self.resolved.clear();
        Ok(())
    }

    /// Register several types, stopping at the first conflict.
    pub fn register_all(
        &mut self,
        records: impl IntoIterator<Item = TypeRecord>,
    ) -> Result<(), RegistryError> {
        records.into_iter().try_for_each(|r| self.register(r))
    }

    pub fn get(&self, name: &str) -> Option<&TypeVersionSet> {
        self.sets.get(name)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Resolve a discriminator chain for data written at `requested`.
    ///
    /// `None` asks for the current definitions. Unknown chains resolve to the
    /// base type with `fallback` set.
    pub fn resolve(&self, chain: &str, requested: Option<SchemaVersion>) -> Resolution {
        let key = (chain.to_string(), requested);
        if let Some(hit) = self.resolved.get(&key) {
            return hit.clone();
        }

        let resolution = self.resolve_uncached(chain, requested);
        self.resolved.insert(key, resolution.clone());
        resolution
    }

    fn resolve_uncached(&self, chain: &str, requested: Option<SchemaVersion>) -> Resolution {
        for segment in chain.rsplit(DISCRIMINATOR_SEPARATOR) {
            let (name, _) = split_versioned(segment);
            let set = self
                .sets
                .get(&name)
                .or_else(|| self.sets.get(&deprecated_name(&name)));

            if let Some((version, record)) =
                set.and_then(|s| s.select(requested, self.schema_version))
            {
                return Resolution {
                    version,
                    record,
                    fallback: false,
                };
            }
        }

        tracing::warn!(chain, "unknown type discriminator, falling back to base");
        Resolution {
            version: self.schema_version,
            record: Arc::clone(&self.base),
            fallback: true,
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("schema_version", &self.schema_version)
            .field("types", &self.sets.len())
            .finish()
    }
}

fn new_base() -> Box<dyn Node> {
    Box::new(Base::new())
}

fn new_chunk() -> Box<dyn Node> {
    Box::new(DataChunk::default())
}

/// `Objects.BuiltElements.Wall` -> `Objects.BuiltElements.Deprecated.Wall`.
fn deprecated_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((namespace, leaf)) => format!("{namespace}.{DEPRECATED_SEGMENT}.{leaf}"),
        None => format!("{DEPRECATED_SEGMENT}.{name}"),
    }
}
