//! meshsync-snapshot — versioned snapshots of mesh configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── SnapshotPublisher ──────────────────────────┐
//! │ every interval:                                                          │
//! │   RouteCollector ─► ConfigTranslator ─► per-kind resources               │
//! │                                              │                           │
//! │                        compare with last published, per kind             │
//! │                                              │ changed?                  │
//! │                          bump that kind's version (first publish = "1")  │
//! │                                              │                           │
//! │                                    Snapshot::builder()...build()         │
//! └──────────────────────────────────────────────┬───────────────────────────┘
//!                                                ▼
//!                               SnapshotSink::set_snapshot(node_id, Arc)
//!                                                │
//!                                       SnapshotCache (in-memory)
//! ```
//!
//! Versions are decimal strings that only grow. A kind whose input failed
//! (certificate discovery, translation) keeps its last published content
//! and version until the next successful tick.

pub mod error;
pub mod publisher;
pub mod sink;
pub mod snapshot;

pub use error::SinkError;
pub use meshsync_mesh::ResourceKind;
pub use publisher::{PublishOutcome, SnapshotPublisher, DEFAULT_NODE_ID};
pub use sink::{SnapshotCache, SnapshotSink};
pub use snapshot::{KindResources, Snapshot, SnapshotBuilder};
