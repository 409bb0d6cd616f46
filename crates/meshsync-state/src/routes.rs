//! Route directory — route id → route, with a hostname index for VIP lookups.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{Route, RouteId};

#[derive(Default)]
struct Inner {
    routes: HashMap<RouteId, Route>,
    // Path routes share a hostname with their catch-all route.
    by_hostname: HashMap<String, BTreeSet<RouteId>>,
}

impl Inner {
    fn from_routes(routes: Vec<Route>) -> Self {
        let mut inner = Inner::default();
        for route in routes {
            inner.insert(route);
        }
        inner
    }

    fn insert(&mut self, mut route: Route) {
        route.host = route.hostname();
        if let Some(previous) = self.routes.get(&route.id)
            && previous.host != route.host
        {
            let previous_host = previous.host.clone();
            self.unindex(&previous_host, &route.id);
        }
        self.by_hostname
            .entry(route.host.clone())
            .or_default()
            .insert(route.id.clone());
        self.routes.insert(route.id.clone(), route);
    }

    fn remove(&mut self, id: &str) -> Option<Route> {
        let route = self.routes.remove(id)?;
        self.unindex(&route.host, id);
        Some(route)
    }

    fn unindex(&mut self, host: &str, id: &str) {
        if let Some(ids) = self.by_hostname.get_mut(host) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_hostname.remove(host);
            }
        }
    }
}

/// Concurrent map of route id → [`Route`].
///
/// Hostnames are lowercased on storage.
#[derive(Default)]
pub struct RouteDirectory {
    inner: RwLock<Inner>,
}

impl RouteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a route.
    pub fn upsert(&self, route: Route) {
        debug!(route_id = %route.id, host = %route.host, "route upserted");
        self.inner.write().insert(route);
    }

    /// Remove a route. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &str) {
        if self.inner.write().remove(id).is_some() {
            debug!(route_id = %id, "route deleted");
        }
    }

    /// Replace the whole directory with `routes`.
    pub fn sync(&self, routes: Vec<Route>) {
        let replacement = Inner::from_routes(routes);
        let count = replacement.routes.len();
        *self.inner.write() = replacement;
        debug!(routes = count, "routes synced");
    }

    pub fn get(&self, id: &str) -> Option<Route> {
        self.inner.read().routes.get(id).cloned()
    }

    /// All routes, ordered by id.
    pub fn list(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.inner.read().routes.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    pub fn len(&self) -> usize {
        self.inner.read().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the VIP of the route serving `hostname`.
    ///
    /// A trailing dot (fully-qualified form) is ignored. Returns `None` if
    /// no route serves the hostname or the route has no VIP.
    pub fn vip_by_hostname(&self, hostname: &str) -> Option<String> {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        let inner = self.inner.read();
        inner
            .by_hostname
            .get(&hostname)?
            .iter()
            .filter_map(|id| inner.routes.get(id))
            .find_map(|route| route.vip.clone())
    }
}
