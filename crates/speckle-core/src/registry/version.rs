// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::RegistryError;
use std::fmt;
use std::str::FromStr;

/// Namespace segment introducing a version in a discriminator.
pub const VERSIONS_SEGMENT: &str = "Versions";

/// Three-part schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the `V_<major>_<minor>_<patch>` namespace segment form.
    pub fn from_segment(segment: &str) -> Option<Self> {
        let digits = segment.strip_prefix("V_")?;
        parse_parts(digits.split('_'))
    }

    /// Namespace segment form, e.g. `V_2_0_0`.
    pub fn to_segment(&self) -> String {
        format!("V_{}_{}_{}", self.major, self.minor, self.patch)
    }
}

fn parse_parts<'a>(parts: impl Iterator<Item = &'a str>) -> Option<SchemaVersion> {
    let mut numbers = [0u32; 3];
    let mut count = 0;
    for part in parts {
        if count == 3 {
            return None;
        }
        numbers[count] = part.parse().ok()?;
        count += 1;
    }
    (count > 0).then(|| SchemaVersion::new(numbers[0], numbers[1], numbers[2]))
}

impl FromStr for SchemaVersion {
    type Err = RegistryError;

    /// Accepts `1`, `1.2`, `1.2.3`, an optional `v` prefix, and the
    /// `V_1_2_3` segment form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::from_segment(trimmed)
            .or_else(|| {
                let dotted = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
                parse_parts(dotted.split('.'))
            })
            .ok_or_else(|| RegistryError::InvalidVersion(s.to_string()))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Split a discriminator into its unversioned name and optional version.
///
/// `Objects.Versions.V_1_2_0.Wall` becomes (`Objects.Wall`, `Some(1.2.0)`);
/// names without a version namespace are returned unchanged.
pub fn split_versioned(discriminator: &str) -> (String, Option<SchemaVersion>) {
    let segments: Vec<&str> = discriminator.split('.').collect();
    let found = segments.windows(2).enumerate().find_map(|(i, pair)| {
        (pair[0] == VERSIONS_SEGMENT)
            .then(|| SchemaVersion::from_segment(pair[1]))
            .flatten()
            .map(|v| (i, v))
    });

    match found {
        Some((i, version)) => {
            let name = segments[..i]
                .iter()
                .chain(&segments[i + 2..])
                .copied()
                .collect::<Vec<_>>()
                .join(".");
            (name, Some(version))
        }
        None => (discriminator.to_string(), None),
    }
}
