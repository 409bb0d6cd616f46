//! meshsync-mesh — from desired routes and live backends to mesh config.
//!
//! # Architecture
//!
//! ```text
//! RouteDirectory ─┐
//! RouteMappingDirectory ─┤
//! ProcessAssociationDirectory ─┼─► RouteCollector::collect() ─► Vec<RouteWithBackends>
//! BackendLookup ─┘                                                  │
//!                                                                   ▼
//! CertLocator ──► Vec<CertPair> ─────────────► ConfigTranslator ─► Gateway
//! PolicySource ─► Vec<PolicyEdge> ──────────────────┘  │           VirtualService
//!                                                     │           DestinationRule
//!                                                     │           ServiceEntry
//!                                                     └─────────► Sidecar
//! ```
//!
//! The collector and the translator hold no state between calls. Each
//! translator function returns `Resource` envelopes (a name and a JSON
//! body) sorted by name, ready to be versioned by the snapshot publisher.

pub mod certs;
pub mod collector;
pub mod error;
pub mod policy;
pub mod resources;
pub mod translate;

pub use certs::{CertLocator, CertPair, DirectoryLocator, StaticLocator};
pub use collector::RouteCollector;
pub use error::{CertError, TranslateError, TranslateResult};
pub use policy::{PolicyEdge, PolicySource, StaticPolicies};
pub use resources::{Resource, ResourceKind};
pub use translate::{ConfigTranslator, TranslatorConfig, PROCESS_LABEL};
