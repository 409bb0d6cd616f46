//! Read-side seam between the route collector and whatever tracks live
//! backends.

use crate::types::BackendSet;

/// Source of the current backend sets, keyed by scheduler process id.
///
/// Implementations return an empty set for unknown ids; an empty set and an
/// untracked id are indistinguishable to callers.
pub trait BackendLookup: Send + Sync {
    /// Externally reachable backends (host address and host port).
    fn backends(&self, scheduler_process_id: &str) -> BackendSet;

    /// Mesh-internal backends (instance address and container port).
    fn internal_backends(&self, scheduler_process_id: &str) -> BackendSet;
}
