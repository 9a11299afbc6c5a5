// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::closure::Closure;
use crate::hash::Id;
use serde::{Deserialize, Serialize};

/// Discriminator of reference stubs.
pub const REFERENCE_TYPE: &str = "reference";

/// Lightweight pointer usable in place of a full record.
///
/// Wire shape: `{"speckle_type":"reference","referencedId":"<id>"}` plus
/// optional `applicationId` and `__closure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    #[serde(rename = "referencedId")]
    pub referenced_id: Id,

    #[serde(
        rename = "applicationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub application_id: Option<String>,

    #[serde(rename = "__closure", default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<Closure>,
}

impl ObjectReference {
    pub fn new(referenced_id: Id) -> Self {
        Self {
            referenced_id,
            application_id: None,
            closure: None,
        }
    }

    pub fn with_closure(mut self, closure: Closure) -> Self {
        self.closure = (!closure.is_empty()).then_some(closure);
        self
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }
}
