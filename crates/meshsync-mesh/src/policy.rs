//! Traffic-policy edges: which routing process may call which.

use serde::{Deserialize, Serialize};

use meshsync_state::ProcessId;

/// `source` may send traffic to the internal routes of `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyEdge {
    pub source: ProcessId,
    pub destination: ProcessId,
}

impl PolicyEdge {
    pub fn new(source: impl Into<ProcessId>, destination: impl Into<ProcessId>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Source of policy edges, consulted once per sidecar translation.
pub trait PolicySource: Send + Sync {
    fn policies(&self) -> Vec<PolicyEdge>;
}

/// A fixed edge list.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicies {
    edges: Vec<PolicyEdge>,
}

impl StaticPolicies {
    pub fn new(edges: Vec<PolicyEdge>) -> Self {
        Self { edges }
    }
}

impl PolicySource for StaticPolicies {
    fn policies(&self) -> Vec<PolicyEdge> {
        self.edges.clone()
    }
}
