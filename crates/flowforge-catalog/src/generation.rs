//! `CatalogGeneration`: an immutable snapshot of node descriptors
//! (spec §3). The system advances by replacing the active pointer, never by
//! in-place edit (spec §9 "Global mutable catalog state").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flowforge_core::NodeDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogGeneration {
    pub generation_id: u64,
    pub fetched_at: DateTime<Utc>,
    pub flowise_version_hint: String,
    /// name -> (version -> descriptor), so "latest non-deprecated" and
    /// "specific pinned version" are both O(log n) lookups.
    versions: BTreeMap<String, BTreeMap<u32, NodeDescriptor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    LatestNonDeprecated,
    Pinned(u32),
}

pub struct LookupHit {
    pub descriptor: NodeDescriptor,
    /// Set when a pinned lookup resolved to a deprecated descriptor
    /// (spec §4.2 "emit a warning if it is deprecated").
    pub deprecated_warning: bool,
}

impl CatalogGeneration {
    pub fn empty(generation_id: u64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            generation_id,
            fetched_at,
            flowise_version_hint: String::new(),
            versions: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, descriptor: NodeDescriptor) {
        self.versions
            .entry(descriptor.name.clone())
            .or_default()
            .insert(descriptor.version, descriptor);
    }

    pub fn node_count(&self) -> usize {
        self.versions.values().map(|v| v.len()).sum()
    }

    pub fn lookup(&self, name: &str, selector: VersionSelector) -> Option<LookupHit> {
        let by_version = self.versions.get(name)?;
        match selector {
            VersionSelector::Pinned(v) => by_version.get(&v).map(|d| LookupHit {
                descriptor: d.clone(),
                deprecated_warning: d.deprecated,
            }),
            VersionSelector::LatestNonDeprecated => {
                // Version selection rule (spec §4.2): highest-versioned
                // non-deprecated descriptor for the name; if every version
                // is deprecated, fall back to the highest version overall
                // rather than silently reporting NotFound.
                by_version
                    .values()
                    .rev()
                    .find(|d| !d.deprecated)
                    .or_else(|| by_version.values().next_back())
                    .map(|d| LookupHit {
                        descriptor: d.clone(),
                        deprecated_warning: d.deprecated,
                    })
            }
        }
    }

    /// Non-deprecated descriptors, for semantic indexing (spec §4.2 `iter_active`).
    pub fn iter_active(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.versions
            .values()
            .flat_map(|by_version| by_version.values())
            .filter(|d| !d.deprecated)
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.versions
            .values()
            .flat_map(|by_version| by_version.values())
    }
}
