//! Snapshot publisher — the periodic collect → translate → version → publish
//! driver.
//!
//! Each kind carries its own version counter. A counter moves only when
//! that kind's translated resources differ structurally from what was last
//! published, so churn in one kind never forces proxies to re-fetch the
//! others. Gateway and sidecar resources follow the same rule: they stay at
//! version "1" until certificate bindings or policy edges change them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use meshsync_mesh::{
    CertLocator, ConfigTranslator, PolicySource, Resource, ResourceKind, RouteCollector,
    TranslateResult,
};

use crate::error::SinkError;
use crate::sink::SnapshotSink;
use crate::snapshot::Snapshot;

/// Node id snapshots are published under unless configured otherwise.
pub const DEFAULT_NODE_ID: &str = "default";

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing changed; the sink was not called.
    Unchanged,
    /// A new snapshot was handed to the sink.
    Published {
        versions: BTreeMap<ResourceKind, String>,
    },
}

#[derive(Debug, Clone)]
struct Published {
    version: u64,
    resources: Vec<Resource>,
}

/// Collects, translates and publishes on a timer.
pub struct SnapshotPublisher {
    collector: RouteCollector,
    translator: ConfigTranslator,
    certs: Arc<dyn CertLocator>,
    policies: Arc<dyn PolicySource>,
    sink: Arc<dyn SnapshotSink>,
    node_id: String,
    /// Last content successfully handed to the sink, per kind.
    published: BTreeMap<ResourceKind, Published>,
}

impl SnapshotPublisher {
    pub fn new(
        collector: RouteCollector,
        translator: ConfigTranslator,
        certs: Arc<dyn CertLocator>,
        policies: Arc<dyn PolicySource>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            collector,
            translator,
            certs,
            policies,
            sink,
            node_id: DEFAULT_NODE_ID.to_string(),
            published: BTreeMap::new(),
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Version last published for `kind`, if any.
    pub fn version(&self, kind: ResourceKind) -> Option<String> {
        self.published.get(&kind).map(|p| p.version.to_string())
    }

    /// Run every translator against the current state.
    ///
    /// A kind whose inputs or translation failed is absent from the map.
    fn translate(&self) -> BTreeMap<ResourceKind, Vec<Resource>> {
        let routes = self.collector.collect();
        debug!(routes = routes.len(), "routes collected");

        let mut results: Vec<(ResourceKind, TranslateResult<Vec<Resource>>)> = Vec::new();
        match self.certs.locate() {
            Ok(certs) => results.push((ResourceKind::Gateway, self.translator.gateways(&certs))),
            Err(e) => warn!(error = %e, "certificate discovery failed, keeping previous gateway"),
        }
        results.push((
            ResourceKind::VirtualService,
            self.translator.virtual_services(&routes),
        ));
        results.push((
            ResourceKind::DestinationRule,
            self.translator.destination_rules(&routes),
        ));
        results.push((
            ResourceKind::ServiceEntry,
            self.translator.service_entries(&routes),
        ));
        let policies = self.policies.policies();
        results.push((
            ResourceKind::Sidecar,
            self.translator.sidecars(&routes, &policies),
        ));

        results
            .into_iter()
            .filter_map(|(kind, result)| match result {
                Ok(resources) => Some((kind, resources)),
                Err(e) => {
                    error!(%kind, error = %e, "translation failed, keeping previous resources");
                    None
                }
            })
            .collect()
    }

    /// One publish cycle.
    ///
    /// On a sink error nothing is committed, so the next tick offers the
    /// same versions again.
    pub fn tick(&mut self) -> Result<PublishOutcome, SinkError> {
        let translated = self.translate();

        let mut next = self.published.clone();
        let mut changed = Vec::new();
        for (kind, resources) in translated {
            let version = match self.published.get(&kind) {
                Some(prev) if prev.resources == resources => continue,
                Some(prev) => prev.version + 1,
                None => 1,
            };
            changed.push(kind);
            next.insert(kind, Published { version, resources });
        }

        if changed.is_empty() {
            debug!("no resource changes, skipping publish");
            return Ok(PublishOutcome::Unchanged);
        }

        let snapshot = next
            .iter()
            .fold(Snapshot::builder(), |builder, (kind, p)| {
                builder.kind(*kind, p.version.to_string(), p.resources.clone())
            })
            .build();
        let versions = snapshot.versions();

        self.sink.set_snapshot(&self.node_id, Arc::new(snapshot))?;
        self.published = next;

        for kind in &changed {
            debug!(%kind, version = %versions[kind], "resource kind changed");
        }
        info!(
            node_id = %self.node_id,
            changed = changed.len(),
            "snapshot published"
        );
        Ok(PublishOutcome::Published { versions })
    }

    /// Tick every `interval` until `shutdown` flips.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?interval, node_id = %self.node_id, "snapshot publisher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        warn!(error = %e, "snapshot publish failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot publisher shutting down");
                    break;
                }
            }
        }
    }
}
