//! Route collector — joins the directories and backend sets into
//! [`RouteWithBackends`] records.
//!
//! Reads are not transactional across directories. A mapping whose route
//! or association vanished between reads is skipped and picked up again on
//! the next cycle.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use meshsync_state::{
    vip_for_hostname, Backend, BackendLookup, BackendSet, ProcessAssociationDirectory,
    RouteDirectory, RouteMappingDirectory, RouteWithBackends,
};

/// Stateless join over the desired-state directories and live backends.
pub struct RouteCollector {
    routes: Arc<RouteDirectory>,
    mappings: Arc<RouteMappingDirectory>,
    associations: Arc<ProcessAssociationDirectory>,
    backends: Arc<dyn BackendLookup>,
}

impl RouteCollector {
    pub fn new(
        routes: Arc<RouteDirectory>,
        mappings: Arc<RouteMappingDirectory>,
        associations: Arc<ProcessAssociationDirectory>,
        backends: Arc<dyn BackendLookup>,
    ) -> Self {
        Self {
            routes,
            mappings,
            associations,
            backends,
        }
    }

    /// One record per (route, scheduler process) reachable through a mapping.
    ///
    /// Ordered by hostname, then path-qualified records (longest path
    /// first) ahead of path-less ones, then routing process id, then
    /// scheduler process id.
    pub fn collect(&self) -> Vec<RouteWithBackends> {
        let mut records = Vec::new();

        for mapping in self.mappings.list() {
            let Some(route) = self.routes.get(&mapping.route_id) else {
                debug!(route_id = %mapping.route_id, "mapping references unknown route, skipped");
                continue;
            };
            let Some(scheduler_ids) = self.associations.get(&mapping.process_id) else {
                debug!(process_id = %mapping.process_id, "mapping has no process association, skipped");
                continue;
            };

            let internal = route.is_internal();
            let hostname = route.hostname();
            let path = route.path().map(str::to_string);
            let weight = self.mappings.calculated_weight(&mapping);
            let vip = internal.then(|| {
                route
                    .vip
                    .clone()
                    .unwrap_or_else(|| vip_for_hostname(&hostname).to_string())
            });

            for scheduler_process_id in scheduler_ids {
                let live = if internal {
                    self.backends.internal_backends(&scheduler_process_id)
                } else {
                    self.backends.backends(&scheduler_process_id)
                };
                records.push(RouteWithBackends {
                    hostname: hostname.clone(),
                    path: path.clone(),
                    process_id: mapping.process_id.clone(),
                    scheduler_process_id,
                    backends: sorted_backends(live),
                    weight,
                    internal,
                    vip: vip.clone(),
                });
            }
        }

        records.sort_by(compare_records);
        records
    }
}

/// Backends ordered by address then port, with unusable ports dropped.
fn sorted_backends(set: BackendSet) -> BackendSet {
    let mut backends: Vec<Backend> = set.iter().filter(|b| b.port != 0).cloned().collect();
    backends.sort();
    backends.into_iter().collect()
}

fn compare_records(a: &RouteWithBackends, b: &RouteWithBackends) -> Ordering {
    a.hostname
        .cmp(&b.hostname)
        .then_with(|| compare_paths(a.path.as_deref(), b.path.as_deref()))
        .then_with(|| a.process_id.cmp(&b.process_id))
        .then_with(|| a.scheduler_process_id.cmp(&b.scheduler_process_id))
}

/// Path-qualified before path-less; longer paths first.
pub(crate) fn compare_paths(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.len().cmp(&a.len()).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
