//! Distribution sink: where published snapshots go.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::SinkError;
use crate::snapshot::Snapshot;

/// Boundary to the downstream streaming protocol.
pub trait SnapshotSink: Send + Sync {
    /// Atomically replace the snapshot served to `node_id`.
    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), SinkError>;
}

/// In-memory sink holding the latest snapshot per node.
///
/// Streaming servers read from it; the API uses it to report what was
/// published last.
#[derive(Default)]
pub struct SnapshotCache {
    snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.read().get(node_id).cloned()
    }

    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.snapshots.read().keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn clear(&self, node_id: &str) {
        self.snapshots.write().remove(node_id);
    }
}

impl SnapshotSink for SnapshotCache {
    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), SinkError> {
        debug!(
            %node_id,
            resources = snapshot.total_resources(),
            "snapshot stored"
        );
        self.snapshots.write().insert(node_id.to_string(), snapshot);
        Ok(())
    }
}
