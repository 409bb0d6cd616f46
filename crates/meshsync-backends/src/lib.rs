//! meshsync-backends — live backend sets for scheduler processes.
//!
//! Tracks which workload instances are running and reachable, keyed by
//! scheduler process id. The scheduler's live event feed keeps the sets
//! current; a periodic full listing corrects whatever the feed dropped.
//!
//! # Architecture
//!
//! ```text
//! SchedulerClient
//!   ├── subscribe()    → InstanceEventSource ─┐  event task
//!   └── list_running() → Vec<Instance> ───────┤  reconcile task (interval)
//!                                             ▼
//!                              bounded mpsc<Update>
//!                                             │
//!                                             ▼  apply (single consumer)
//!                     BackendSetReconciler { external, internal }
//!                                             │
//!                                             ▼
//!                          BackendLookup (read by the route collector)
//! ```
//!
//! Producers never touch the backend sets directly. The apply step is
//! idempotent, so an event and a reconciliation pass reporting the same
//! instance converge on one entry.

pub mod client;
pub mod error;
pub mod instance;
pub mod reconciler;
pub mod scheduler;

pub use client::HttpSchedulerClient;
pub use error::{SchedulerError, SchedulerResult};
pub use instance::{Instance, InstanceEvent, InstanceState, PortMapping, DEFAULT_SSH_PORT};
pub use reconciler::{BackendSetReconciler, ReconcilerConfig, Update};
pub use scheduler::{InstanceEventSource, SchedulerClient};
