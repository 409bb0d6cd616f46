//! Route mapping directory — weighted bindings of routes to routing processes.
//!
//! Alongside the mappings the directory keeps, per route, the sum of the
//! declared weights of every mapping on that route. That sum is the
//! denominator used to normalize a mapping's weight into a percentage.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{MappingKey, RouteId, RouteMapping};

#[derive(Default)]
struct Inner {
    mappings: HashMap<MappingKey, RouteMapping>,
    denominators: HashMap<RouteId, u64>,
}

impl Inner {
    fn insert(&mut self, mapping: RouteMapping) {
        let key = mapping.key();
        if let Some(previous) = self.mappings.remove(&key) {
            self.subtract(&previous);
        }
        *self
            .denominators
            .entry(mapping.route_id.clone())
            .or_default() += u64::from(mapping.weight);
        self.mappings.insert(key, mapping);
    }

    fn remove(&mut self, key: &MappingKey) -> Option<RouteMapping> {
        let mapping = self.mappings.remove(key)?;
        self.subtract(&mapping);
        Some(mapping)
    }

    fn subtract(&mut self, mapping: &RouteMapping) {
        if let Some(sum) = self.denominators.get_mut(&mapping.route_id) {
            *sum = sum.saturating_sub(u64::from(mapping.weight));
            if *sum == 0 && !self.mappings.keys().any(|k| k.route_id == mapping.route_id) {
                self.denominators.remove(&mapping.route_id);
            }
        }
    }
}

/// Concurrent map of (route id, process id) → [`RouteMapping`].
///
/// Re-mapping an existing key replaces its weight in the route's
/// denominator instead of adding to it, so repeated `map` calls with an
/// unchanged mapping are idempotent.
#[derive(Default)]
pub struct RouteMappingDirectory {
    inner: RwLock<Inner>,
}

impl RouteMappingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a mapping.
    pub fn map(&self, mapping: RouteMapping) {
        debug!(
            route_id = %mapping.route_id,
            process_id = %mapping.process_id,
            weight = mapping.weight,
            "route mapped"
        );
        self.inner.write().insert(mapping);
    }

    /// Remove the mapping stored under `key`. Unknown keys are a no-op.
    ///
    /// The stored weight is subtracted from the denominator, whatever
    /// weight the caller believes the mapping had.
    pub fn unmap(&self, key: &MappingKey) {
        if self.inner.write().remove(key).is_some() {
            debug!(route_id = %key.route_id, process_id = %key.process_id, "route unmapped");
        }
    }

    /// Replace every mapping and recompute all denominators.
    pub fn sync(&self, mappings: Vec<RouteMapping>) {
        let mut replacement = Inner::default();
        for mapping in mappings {
            replacement.insert(mapping);
        }
        let count = replacement.mappings.len();
        *self.inner.write() = replacement;
        debug!(mappings = count, "route mappings synced");
    }

    pub fn get(&self, key: &MappingKey) -> Option<RouteMapping> {
        self.inner.read().mappings.get(key).cloned()
    }

    /// All mappings, ordered by key.
    pub fn list(&self) -> Vec<RouteMapping> {
        let mut mappings: Vec<RouteMapping> =
            self.inner.read().mappings.values().cloned().collect();
        mappings.sort_by_key(RouteMapping::key);
        mappings
    }

    pub fn len(&self) -> usize {
        self.inner.read().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the declared weights of every mapping on `route_id`.
    pub fn denominator(&self, route_id: &str) -> u64 {
        self.inner
            .read()
            .denominators
            .get(route_id)
            .copied()
            .unwrap_or(0)
    }

    /// Normalized weight of `mapping` in percent:
    /// `round(weight / denominator * 100)`.
    ///
    /// A zero denominator means the mapping is alone and unweighted, so it
    /// owns all traffic (100).
    pub fn calculated_weight(&self, mapping: &RouteMapping) -> u32 {
        let denominator = self.denominator(&mapping.route_id);
        if denominator == 0 {
            return 100;
        }
        (f64::from(mapping.weight) / denominator as f64 * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_get_returns_last_write() {
        let dir = RouteMappingDirectory::new();
        dir.map(RouteMapping::new("r1", "p1", 1));
        dir.map(RouteMapping::new("r1", "p1", 3));

        let key = RouteMapping::new("r1", "p1", 0).key();
        assert_eq!(dir.get(&key).unwrap().weight, 3);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn repeated_map_does_not_double_count_weight() {
        let dir = RouteMappingDirectory::new();
        let mapping = RouteMapping::new("r1", "p1", 5);
        dir.map(mapping.clone());
        dir.map(mapping.clone());
        dir.map(mapping.clone());

        assert_eq!(dir.denominator("r1"), 5);
        assert_eq!(dir.calculated_weight(&mapping), 100);
    }

    #[test]
    fn remap_replaces_weight_in_denominator() {
        let dir = RouteMappingDirectory::new();
        dir.map(RouteMapping::new("r1", "p1", 5));
        dir.map(RouteMapping::new("r1", "p2", 5));
        dir.map(RouteMapping::new("r1", "p1", 15));

        assert_eq!(dir.denominator("r1"), 20);
    }

    #[test]
    fn unmap_decrements_denominator_by_stored_weight() {
        let dir = RouteMappingDirectory::new();
        let a = RouteMapping::new("r1", "p1", 3);
        let b = RouteMapping::new("r1", "p2", 1);
        dir.map(a.clone());
        dir.map(b.clone());
        assert_eq!(dir.denominator("r1"), 4);

        dir.unmap(&a.key());
        assert_eq!(dir.denominator("r1"), 1);
        assert_eq!(dir.calculated_weight(&b), 100);

        // Unknown key: no-op.
        dir.unmap(&a.key());
        assert_eq!(dir.denominator("r1"), 1);
    }

    #[test]
    fn weights_sum_to_one_hundred() {
        let dir = RouteMappingDirectory::new();
        let mappings = vec![
            RouteMapping::new("r1", "p1", 1),
            RouteMapping::new("r1", "p2", 1),
            RouteMapping::new("r1", "p3", 1),
        ];
        for m in &mappings {
            dir.map(m.clone());
        }
        let total: u32 = mappings.iter().map(|m| dir.calculated_weight(m)).sum();
        // 33 + 33 + 33; rounding may lose at most one point per mapping.
        assert!((97..=103).contains(&total), "total = {total}");

        let dir = RouteMappingDirectory::new();
        let a = RouteMapping::new("r2", "p1", 3);
        let b = RouteMapping::new("r2", "p2", 1);
        dir.map(a.clone());
        dir.map(b.clone());
        assert_eq!(dir.calculated_weight(&a), 75);
        assert_eq!(dir.calculated_weight(&b), 25);
    }

    #[test]
    fn zero_denominator_owns_all_traffic() {
        let dir = RouteMappingDirectory::new();
        let lone = RouteMapping::new("r1", "p1", 0);
        dir.map(lone.clone());
        assert_eq!(dir.denominator("r1"), 0);
        assert_eq!(dir.calculated_weight(&lone), 100);
    }

    #[test]
    fn denominators_are_per_route() {
        let dir = RouteMappingDirectory::new();
        dir.map(RouteMapping::new("r1", "p1", 2));
        dir.map(RouteMapping::new("r2", "p1", 7));
        assert_eq!(dir.denominator("r1"), 2);
        assert_eq!(dir.denominator("r2"), 7);
    }

    #[test]
    fn sync_recomputes_denominators() {
        let dir = RouteMappingDirectory::new();
        dir.map(RouteMapping::new("r1", "p1", 50));

        dir.sync(vec![
            RouteMapping::new("r1", "p2", 1),
            RouteMapping::new("r1", "p3", 3),
            RouteMapping::new("r1", "p3", 3),
        ]);

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.denominator("r1"), 4);
        let keys: Vec<String> = dir.list().into_iter().map(|m| m.process_id).collect();
        assert_eq!(keys, vec!["p2", "p3"]);
    }

    #[test]
    fn sync_is_atomic_for_readers() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let generation = |g: usize| -> Vec<RouteMapping> {
            (0..20)
                .map(|i| RouteMapping::new(format!("r{i}"), format!("p-g{g}"), 1))
                .collect()
        };
        let dir = Arc::new(RouteMappingDirectory::new());
        dir.sync(generation(0));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let mappings = dir.list();
                        assert_eq!(mappings.len(), 20);
                        let process = &mappings[0].process_id;
                        assert!(mappings.iter().all(|m| &m.process_id == process));
                        assert_eq!(dir.denominator("r0"), 1);
                    }
                })
            })
            .collect();

        for g in 1..200 {
            dir.sync(generation(g % 2));
        }
        done.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
