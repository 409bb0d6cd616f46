//! Domain types shared across meshsync.
//!
//! Desired state (routes, mappings, associations) comes from the routing
//! API; backend sets come from the scheduler; `RouteWithBackends` is the
//! ephemeral join of the two that the translator consumes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Identifier of a route asserted by the routing API.
pub type RouteId = String;

/// Identifier the routing API uses for a routable process.
pub type ProcessId = String;

/// Identifier of one schedulable generation of a process.
pub type SchedulerProcessId = String;

/// Hostnames under this suffix are only reachable inside the mesh.
pub const INTERNAL_DOMAIN_SUFFIX: &str = ".apps.internal";

/// Smallest weight the routing API may declare for a mapping.
pub const MIN_ROUTE_WEIGHT: u32 = 1;

/// Largest weight the routing API may declare for a mapping.
pub const MAX_ROUTE_WEIGHT: u32 = 128;

// ── Route ──────────────────────────────────────────────────────────

/// A desired external or internal hostname (optionally path-qualified).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Mesh-internal route, addressed through its VIP.
    #[serde(default)]
    pub internal: bool,
    /// Virtual IP for internal routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip: Option<String>,
}

impl Route {
    /// An external route for `host` with no path.
    pub fn new(id: impl Into<RouteId>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            path: None,
            internal: false,
            vip: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_vip(mut self, vip: impl Into<String>) -> Self {
        self.internal = true;
        self.vip = Some(vip.into());
        self
    }

    /// Lowercased hostname.
    pub fn hostname(&self) -> String {
        self.host.to_ascii_lowercase()
    }

    /// The path, treating an empty string the same as no path.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether the route is mesh-internal, either flagged explicitly or
    /// because its host lives under [`INTERNAL_DOMAIN_SUFFIX`].
    pub fn is_internal(&self) -> bool {
        self.internal || self.hostname().ends_with(INTERNAL_DOMAIN_SUFFIX)
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.id.is_empty() || self.host.is_empty() {
            return Err(StateError::InvalidRoute(
                "route id and host are required".to_string(),
            ));
        }
        if let Some(path) = self.path()
            && !path.starts_with('/')
        {
            return Err(StateError::InvalidRoute(format!(
                "path {path:?} must start with '/'"
            )));
        }
        Ok(())
    }
}

// ── Route mapping ──────────────────────────────────────────────────

/// Identity of a route mapping: one per (route, routing process) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey {
    pub route_id: RouteId,
    pub process_id: ProcessId,
}

/// A weighted binding of a route to a routing process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteMapping {
    pub route_id: RouteId,
    pub process_id: ProcessId,
    /// Declared (unnormalized) traffic weight.
    pub weight: u32,
}

impl RouteMapping {
    pub fn new(route_id: impl Into<RouteId>, process_id: impl Into<ProcessId>, weight: u32) -> Self {
        Self {
            route_id: route_id.into(),
            process_id: process_id.into(),
            weight,
        }
    }

    pub fn key(&self) -> MappingKey {
        MappingKey {
            route_id: self.route_id.clone(),
            process_id: self.process_id.clone(),
        }
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.route_id.is_empty() || self.process_id.is_empty() {
            return Err(StateError::InvalidMapping(
                "route id and process id are required".to_string(),
            ));
        }
        if !(MIN_ROUTE_WEIGHT..=MAX_ROUTE_WEIGHT).contains(&self.weight) {
            return Err(StateError::InvalidMapping(format!(
                "weight must be between {MIN_ROUTE_WEIGHT} and {MAX_ROUTE_WEIGHT}, got {}",
                self.weight
            )));
        }
        Ok(())
    }
}

// ── Process association ────────────────────────────────────────────

/// Fan-out from one routing process to the scheduler processes backing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessAssociation {
    pub process_id: ProcessId,
    pub scheduler_process_ids: BTreeSet<SchedulerProcessId>,
}

impl ProcessAssociation {
    pub fn new<I, S>(process_id: impl Into<ProcessId>, scheduler_process_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SchedulerProcessId>,
    {
        Self {
            process_id: process_id.into(),
            scheduler_process_ids: scheduler_process_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> StateResult<()> {
        if self.process_id.is_empty() || self.scheduler_process_ids.is_empty() {
            return Err(StateError::InvalidAssociation(
                "process id and scheduler process ids are required".to_string(),
            ));
        }
        if self.scheduler_process_ids.iter().any(String::is_empty) {
            return Err(StateError::InvalidAssociation(
                "scheduler process ids must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Backends ───────────────────────────────────────────────────────

/// A reachable network endpoint for one running instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend {
    pub address: String,
    /// Port the endpoint is reachable on from outside the instance.
    pub port: u16,
    /// Port the workload listens on inside its container.
    pub container_port: u16,
}

impl Backend {
    pub fn new(address: impl Into<String>, port: u16, container_port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            container_port,
        }
    }

    /// `address:port` string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn same_endpoint(&self, other: &Backend) -> bool {
        self.address == other.address && self.port == other.port
    }
}

/// Reachable endpoints for one scheduler process, unique by `address:port`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BackendSet {
    backends: Vec<Backend>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend unless one with the same `address:port` is present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, backend: Backend) -> bool {
        if self.backends.iter().any(|b| b.same_endpoint(&backend)) {
            return false;
        }
        self.backends.push(backend);
        true
    }

    /// Remove the backend with the same `address:port`. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, backend: &Backend) -> bool {
        let before = self.backends.len();
        self.backends.retain(|b| !b.same_endpoint(backend));
        self.backends.len() != before
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}

impl FromIterator<Backend> for BackendSet {
    fn from_iter<T: IntoIterator<Item = Backend>>(iter: T) -> Self {
        let mut set = BackendSet::new();
        for backend in iter {
            set.insert(backend);
        }
        set
    }
}

// ── Derived join result ────────────────────────────────────────────

/// One (route, scheduler process) pair with its live backends.
///
/// Recomputed on every collection cycle and never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteWithBackends {
    pub hostname: String,
    pub path: Option<String>,
    pub process_id: ProcessId,
    pub scheduler_process_id: SchedulerProcessId,
    pub backends: BackendSet,
    /// Normalized weight in percent.
    pub weight: u32,
    pub internal: bool,
    pub vip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_lowercased() {
        let route = Route::new("r1", "A.Example.COM");
        assert_eq!(route.hostname(), "a.example.com");
    }

    #[test]
    fn empty_path_is_no_path() {
        let route = Route::new("r1", "a.example.com").with_path("");
        assert_eq!(route.path(), None);
        assert!(route.validate().is_ok());
    }

    #[test]
    fn internal_by_suffix_or_flag() {
        assert!(Route::new("r1", "db.apps.internal").is_internal());
        assert!(Route::new("r2", "db").with_vip("127.1.2.3").is_internal());
        assert!(!Route::new("r3", "a.example.com").is_internal());
    }

    #[test]
    fn route_validation() {
        assert!(Route::new("", "a.example.com").validate().is_err());
        assert!(Route::new("r1", "").validate().is_err());
        assert!(Route::new("r1", "a.example.com").with_path("api").validate().is_err());
        assert!(Route::new("r1", "a.example.com").with_path("/api").validate().is_ok());
    }

    #[test]
    fn mapping_weight_bounds() {
        assert!(RouteMapping::new("r1", "p1", 0).validate().is_err());
        assert!(RouteMapping::new("r1", "p1", 129).validate().is_err());
        assert!(RouteMapping::new("r1", "p1", 1).validate().is_ok());
        assert!(RouteMapping::new("r1", "p1", 128).validate().is_ok());
        assert!(RouteMapping::new("", "p1", 1).validate().is_err());
    }

    #[test]
    fn association_requires_scheduler_ids() {
        let empty: Vec<String> = Vec::new();
        assert!(ProcessAssociation::new("p1", empty).validate().is_err());
        assert!(ProcessAssociation::new("p1", [""]).validate().is_err());
        assert!(ProcessAssociation::new("p1", ["s1"]).validate().is_ok());
    }

    #[test]
    fn association_has_set_semantics() {
        let assoc = ProcessAssociation::new("p1", ["s1", "s2", "s1"]);
        assert_eq!(assoc.scheduler_process_ids.len(), 2);
    }

    #[test]
    fn backend_set_dedupes_by_endpoint() {
        let mut set = BackendSet::new();
        assert!(set.insert(Backend::new("10.0.0.1", 9001, 8080)));
        assert!(!set.insert(Backend::new("10.0.0.1", 9001, 8080)));
        assert!(set.insert(Backend::new("10.0.0.1", 9002, 8080)));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&Backend::new("10.0.0.1", 9001, 8080)));
        assert!(!set.remove(&Backend::new("10.0.0.9", 9001, 8080)));
        assert_eq!(set.backends(), &[Backend::new("10.0.0.1", 9002, 8080)]);
    }
}
