//! Snapshot: immutable, per-kind versioned bundle of mesh resources.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Serialize;

use meshsync_mesh::{Resource, ResourceKind};

/// Resources of one kind at one version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindResources {
    version: String,
    resources: Vec<Resource>,
}

impl KindResources {
    pub fn new(version: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            version: version.into(),
            resources,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A consistent set of resources, published to the sink as one unit.
///
/// Once built a snapshot is never modified; the publisher builds a new one
/// for every change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    kinds: BTreeMap<ResourceKind, KindResources>,
    created_at: SystemTime,
}

impl Snapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&KindResources> {
        self.kinds.get(&kind)
    }

    pub fn version(&self, kind: ResourceKind) -> Option<&str> {
        self.kinds.get(&kind).map(KindResources::version)
    }

    pub fn resources(&self, kind: ResourceKind) -> &[Resource] {
        self.kinds
            .get(&kind)
            .map(KindResources::resources)
            .unwrap_or(&[])
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.kinds.keys().copied()
    }

    /// kind → version for every kind present.
    pub fn versions(&self) -> BTreeMap<ResourceKind, String> {
        self.kinds
            .iter()
            .map(|(kind, r)| (*kind, r.version.clone()))
            .collect()
    }

    pub fn total_resources(&self) -> usize {
        self.kinds.values().map(KindResources::len).sum()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

/// Builder for [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    kinds: BTreeMap<ResourceKind, KindResources>,
}

impl SnapshotBuilder {
    /// Set the resources of one kind, replacing any set earlier.
    pub fn kind(
        mut self,
        kind: ResourceKind,
        version: impl Into<String>,
        resources: Vec<Resource>,
    ) -> Self {
        self.kinds.insert(kind, KindResources::new(version, resources));
        self
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            kinds: self.kinds,
            created_at: SystemTime::now(),
        }
    }
}
