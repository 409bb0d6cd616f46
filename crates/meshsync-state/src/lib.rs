//! meshsync-state — in-memory desired-state directories for meshsync.
//!
//! Holds what the routing API asserts (routes, weighted route mappings,
//! and routing-process → scheduler-process associations) plus the shared
//! domain types the rest of the workspace joins over.
//!
//! # Architecture
//!
//! Each directory owns one map behind its own lock. Every operation takes
//! the lock for its whole duration, and `sync` swaps the backing map in one
//! critical section so readers never observe a half-replaced directory.
//! Nothing is persisted: all state is rebuilt from the routing API and the
//! scheduler after a restart.
//!
//! ```text
//! RouteDirectory               route id → Route (+ hostname index for VIPs)
//! RouteMappingDirectory        (route id, process id) → RouteMapping
//!                              route id → weight denominator
//! ProcessAssociationDirectory  process id → {scheduler process id}
//! ```
//!
//! Directories are plain values wrapped in `Arc` by the daemon and handed
//! to the components that need them; there is no process-wide registry.

pub mod associations;
pub mod error;
pub mod lookup;
pub mod mappings;
pub mod routes;
pub mod types;
pub mod vip;

pub use associations::ProcessAssociationDirectory;
pub use error::{StateError, StateResult};
pub use lookup::BackendLookup;
pub use mappings::RouteMappingDirectory;
pub use routes::RouteDirectory;
pub use types::*;
pub use vip::vip_for_hostname;
