//! Process association directory — routing process → scheduler processes.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{ProcessAssociation, ProcessId, SchedulerProcessId};

/// Concurrent map of process id → set of scheduler process ids.
#[derive(Default)]
pub struct ProcessAssociationDirectory {
    inner: RwLock<HashMap<ProcessId, BTreeSet<SchedulerProcessId>>>,
}

impl ProcessAssociationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scheduler processes associated with a routing process.
    pub fn upsert(&self, association: ProcessAssociation) {
        debug!(
            process_id = %association.process_id,
            scheduler_processes = association.scheduler_process_ids.len(),
            "process association upserted"
        );
        self.inner
            .write()
            .insert(association.process_id, association.scheduler_process_ids);
    }

    /// Remove an association. Unknown ids are a no-op.
    pub fn delete(&self, process_id: &str) {
        if self.inner.write().remove(process_id).is_some() {
            debug!(process_id = %process_id, "process association deleted");
        }
    }

    /// Replace every association. Later entries for the same process win.
    pub fn sync(&self, associations: Vec<ProcessAssociation>) {
        let replacement: HashMap<_, _> = associations
            .into_iter()
            .map(|a| (a.process_id, a.scheduler_process_ids))
            .collect();
        let count = replacement.len();
        *self.inner.write() = replacement;
        debug!(associations = count, "process associations synced");
    }

    /// Scheduler process ids for `process_id`, if any are associated.
    pub fn get(&self, process_id: &str) -> Option<BTreeSet<SchedulerProcessId>> {
        self.inner.read().get(process_id).cloned()
    }

    /// All associations, ordered by process id.
    pub fn list(&self) -> Vec<ProcessAssociation> {
        let mut associations: Vec<ProcessAssociation> = self
            .inner
            .read()
            .iter()
            .map(|(process_id, ids)| ProcessAssociation {
                process_id: process_id.clone(),
                scheduler_process_ids: ids.clone(),
            })
            .collect();
        associations.sort_by(|a, b| a.process_id.cmp(&b.process_id));
        associations
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_whole_set() {
        let dir = ProcessAssociationDirectory::new();
        dir.upsert(ProcessAssociation::new("p1", ["s1", "s2"]));
        dir.upsert(ProcessAssociation::new("p1", ["s3"]));

        let ids: Vec<String> = dir.get("p1").unwrap().into_iter().collect();
        assert_eq!(ids, vec!["s3"]);
    }

    #[test]
    fn delete_missing_is_noop() {
        let dir = ProcessAssociationDirectory::new();
        dir.delete("p1");
        dir.upsert(ProcessAssociation::new("p1", ["s1"]));
        dir.delete("p1");
        assert!(dir.get("p1").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn sync_replaces_everything() {
        let dir = ProcessAssociationDirectory::new();
        dir.upsert(ProcessAssociation::new("stale", ["s0"]));

        dir.sync(vec![
            ProcessAssociation::new("p2", ["s2"]),
            ProcessAssociation::new("p1", ["s1a", "s1b"]),
        ]);

        assert!(dir.get("stale").is_none());
        let listed = dir.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].process_id, "p1");
        assert_eq!(listed[0].scheduler_process_ids.len(), 2);
        assert_eq!(listed[1].process_id, "p2");
    }

    #[test]
    fn sync_is_atomic_for_readers() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let generation = |g: usize| -> Vec<ProcessAssociation> {
            (0..20)
                .map(|i| ProcessAssociation::new(format!("p{i}"), [format!("s-g{g}-{i}")]))
                .collect()
        };
        let dir = Arc::new(ProcessAssociationDirectory::new());
        dir.sync(generation(0));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let listed = dir.list();
                        assert_eq!(listed.len(), 20);
                        let prefix = listed[0]
                            .scheduler_process_ids
                            .iter()
                            .next()
                            .unwrap()
                            .split('-')
                            .nth(1)
                            .unwrap()
                            .to_string();
                        assert!(listed.iter().all(|a| {
                            a.scheduler_process_ids
                                .iter()
                                .all(|s| s.starts_with(&format!("s-{prefix}-")))
                        }));
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
