// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Closure tracking
//!
//! A closure maps every transitively detached descendant id of a record to
//! the minimum depth at which it is reachable. The tracker keeps one frame
//! per node currently being written:
//!
//! ```text
//! enter(root)            frames: [root]
//!   enter(A)             frames: [root, A]
//!     ...                A collects its own descendants
//!   exit() -> closure(A) A's entries merge into root at depth + 1
//!   add_child(A.id)      root[A] = 1
//! exit() -> closure(root)
//! ```

use crate::hash::Id;
use crate::node::ObjectReference;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Descendant id -> minimum depth.
pub type Closure = BTreeMap<Id, u32>;

/// Per-subtree closure accumulator used by the serializer.
#[derive(Debug, Default)]
pub struct ClosureTracker {
    frames: Vec<Closure>,
}

impl ClosureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting for a new node.
    pub fn enter(&mut self) {
        self.frames.push(Closure::new());
    }

    /// Finish the current node.
    ///
    /// Its entries are merged into the enclosing node one level deeper, and
    /// the finished closure is returned for writing.
    pub fn exit(&mut self) -> Closure {
        let closure = self.frames.pop().unwrap_or_default();
        if let Some(parent) = self.frames.last_mut() {
            for (id, depth) in &closure {
                insert_min(parent, id, depth.saturating_add(1));
            }
        }
        closure
    }

    /// Record a direct detached child of the current node.
    pub fn add_child(&mut self, id: &Id) {
        if let Some(frame) = self.frames.last_mut() {
            insert_min(frame, id, 1);
        }
    }

    /// Record an already-resolved reference: its target at depth 1 and its
    /// own closure one level deeper.
    pub fn add_reference(&mut self, reference: &ObjectReference) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        insert_min(frame, &reference.referenced_id, 1);
        if let Some(closure) = &reference.closure {
            for (id, depth) in closure {
                insert_min(frame, id, depth.saturating_add(1));
            }
        }
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }
}

fn insert_min(closure: &mut Closure, id: &Id, depth: u32) {
    closure
        .entry(id.clone())
        .and_modify(|d| *d = (*d).min(depth))
        .or_insert(depth);
}

#[derive(Deserialize)]
struct ClosureOnly {
    #[serde(rename = "__closure", default)]
    closure: Option<Closure>,
}

/// Extract the `__closure` map of a serialized record.
///
/// Other fields are skipped by the parser without being materialized.
pub fn closure_of(json: &str) -> Result<Closure, serde_json::Error> {
    let parsed: ClosureOnly = serde_json::from_str(json)?;
    Ok(parsed.closure.unwrap_or_default())
}
