//! Backend set reconciler — event feed plus periodic full listing.
//!
//! Two producer tasks feed one bounded channel; a single consumer applies
//! every message to the backend store. Per scheduler process id the store
//! moves from *unknown* (never observed) to *tracked* (has backends) to
//! *empty* (observed, currently no routable instances).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use meshsync_state::{BackendLookup, BackendSet, SchedulerProcessId};

use crate::instance::{Instance, InstanceEvent, DEFAULT_SSH_PORT};
use crate::scheduler::{InstanceEventSource, SchedulerClient};

/// Tunables for the reconciler tasks.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often the full instance listing is fetched.
    pub reconcile_interval: Duration,
    /// Pause after a failed subscribe or feed read.
    pub retry_delay: Duration,
    /// Capacity of the producer → apply channel.
    pub channel_capacity: usize,
    /// Container port never used as an app port.
    pub ssh_port: u16,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
            channel_capacity: 1024,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }
}

/// A message on the apply channel.
#[derive(Debug, Clone)]
pub enum Update {
    /// One notice from the live feed.
    Event(InstanceEvent),
    /// A listing fetch is starting. Feed events applied from here on are
    /// replayed over the listing when it lands.
    ListingStarted,
    /// A complete listing; every tracked set is rebuilt from it.
    Reconcile(Vec<Instance>),
}

#[derive(Default)]
struct Store {
    external: HashMap<SchedulerProcessId, BackendSet>,
    internal: HashMap<SchedulerProcessId, BackendSet>,
    journal: Option<Vec<InstanceEvent>>,
}

/// Scheduler process id → live backends, kept current from the scheduler.
pub struct BackendSetReconciler {
    config: ReconcilerConfig,
    store: RwLock<Store>,
}

impl BackendSetReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            store: RwLock::new(Store::default()),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Externally reachable backends. Unknown ids yield an empty set.
    pub fn get(&self, scheduler_process_id: &str) -> BackendSet {
        self.store
            .read()
            .external
            .get(scheduler_process_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Instance-address backends for sidecar-direct routing.
    pub fn internal_backends(&self, scheduler_process_id: &str) -> BackendSet {
        self.store
            .read()
            .internal
            .get(scheduler_process_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the id has ever been observed (its set may be empty).
    pub fn is_tracked(&self, scheduler_process_id: &str) -> bool {
        self.store.read().external.contains_key(scheduler_process_id)
    }

    /// Every tracked id with its external backends, ordered by id.
    pub fn list(&self) -> Vec<(SchedulerProcessId, BackendSet)> {
        let mut sets: Vec<_> = self
            .store
            .read()
            .external
            .iter()
            .map(|(id, set)| (id.clone(), set.clone()))
            .collect();
        sets.sort_by(|a, b| a.0.cmp(&b.0));
        sets
    }

    /// Apply one channel message. Idempotent.
    pub fn apply(&self, update: Update) {
        match update {
            Update::Event(event) => self.apply_event(event),
            Update::ListingStarted => self.store.write().journal = Some(Vec::new()),
            Update::Reconcile(instances) => self.apply_listing(instances),
        }
    }

    fn apply_event(&self, event: InstanceEvent) {
        let mut store = self.store.write();
        self.replay(&mut store, &event);
        if let Some(journal) = store.journal.as_mut() {
            journal.push(event);
        }
    }

    fn replay(&self, store: &mut Store, event: &InstanceEvent) {
        match event {
            InstanceEvent::Created { instance } => self.track(store, instance),
            InstanceEvent::Changed { before, after } => {
                self.untrack(store, before);
                self.track(store, after);
            }
            InstanceEvent::Removed { instance } => self.untrack(store, instance),
        }
    }

    fn track(&self, store: &mut Store, instance: &Instance) {
        let ssh_port = self.config.ssh_port;
        let Some(backend) = instance.external_backend(ssh_port) else {
            debug!(
                scheduler_process_id = %instance.process_id,
                state = ?instance.state,
                evacuating = instance.evacuating,
                "instance not routable, skipped"
            );
            return;
        };
        let id = &instance.process_id;
        if store.external.entry(id.clone()).or_default().insert(backend) {
            debug!(scheduler_process_id = %id, address = %instance.address, "backend added");
        }
        let internal = store.internal.entry(id.clone()).or_default();
        if let Some(backend) = instance.internal_backend(ssh_port) {
            internal.insert(backend);
        }
    }

    fn untrack(&self, store: &mut Store, instance: &Instance) {
        let ssh_port = self.config.ssh_port;
        let id = &instance.process_id;
        if let (Some(backend), Some(set)) = (
            instance.external_endpoint(ssh_port),
            store.external.get_mut(id),
        ) && set.remove(&backend)
        {
            debug!(scheduler_process_id = %id, address = %instance.address, "backend removed");
        }
        if let (Some(backend), Some(set)) = (
            instance.internal_endpoint(ssh_port),
            store.internal.get_mut(id),
        ) {
            set.remove(&backend);
        }
    }

    fn apply_listing(&self, instances: Vec<Instance>) {
        let mut replacement = Store::default();
        for instance in &instances {
            self.track(&mut replacement, instance);
        }

        let mut store = self.store.write();
        // Ids seen before but absent from the listing drop to empty.
        for id in store.external.keys() {
            replacement.external.entry(id.clone()).or_default();
            replacement.internal.entry(id.clone()).or_default();
        }
        // Events applied while the listing was in flight are newer than it.
        let journal = store.journal.take().unwrap_or_default();
        for event in &journal {
            self.replay(&mut replacement, event);
        }
        let tracked = replacement.external.len();
        *store = replacement;
        drop(store);

        debug!(
            instances = instances.len(),
            replayed = journal.len(),
            tracked,
            "backend sets reconciled"
        );
    }

    /// Run the event task, the reconcile task and the apply loop until
    /// `shutdown` flips.
    pub async fn run<C: SchedulerClient>(
        self: Arc<Self>,
        client: Arc<C>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let events = tokio::spawn(run_event_feed(
            Arc::clone(&client),
            tx.clone(),
            self.config.retry_delay,
            shutdown.clone(),
        ));
        let listing = tokio::spawn(run_reconcile_loop(
            client,
            tx,
            self.config.reconcile_interval,
            shutdown.clone(),
        ));

        info!(
            interval = ?self.config.reconcile_interval,
            ssh_port = self.config.ssh_port,
            "backend set reconciler started"
        );

        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Some(update) => self.apply(update),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }

        // Unblock producers waiting on a full channel.
        drop(rx);
        let _ = events.await;
        let _ = listing.await;
        info!("backend set reconciler stopped");
    }
}

impl BackendLookup for BackendSetReconciler {
    fn backends(&self, scheduler_process_id: &str) -> BackendSet {
        self.get(scheduler_process_id)
    }

    fn internal_backends(&self, scheduler_process_id: &str) -> BackendSet {
        BackendSetReconciler::internal_backends(self, scheduler_process_id)
    }
}

/// Sleep for `delay` unless shutdown arrives first. Returns `false` on
/// shutdown.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

/// Forward every feed event onto the apply channel, resubscribing when the
/// feed ends.
async fn run_event_feed<C: SchedulerClient>(
    client: Arc<C>,
    tx: mpsc::Sender<Update>,
    retry_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    'subscribe: loop {
        if *shutdown.borrow() {
            break;
        }
        let subscribed = tokio::select! {
            result = client.subscribe() => result,
            _ = shutdown.changed() => break,
        };
        let mut source = match subscribed {
            Ok(source) => {
                debug!("subscribed to scheduler event feed");
                source
            }
            Err(e) => {
                warn!(error = %e, "scheduler event subscription failed");
                if !pause(retry_delay, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        loop {
            let next = tokio::select! {
                next = source.next() => next,
                _ = shutdown.changed() => break 'subscribe,
            };
            match next {
                Ok(Some(event)) => {
                    if tx.send(Update::Event(event)).await.is_err() {
                        break 'subscribe;
                    }
                }
                Ok(None) => {
                    debug!("scheduler event feed ended, resubscribing");
                    continue 'subscribe;
                }
                Err(e) => {
                    warn!(error = %e, "scheduler event feed read failed");
                    if !pause(retry_delay, &mut shutdown).await {
                        break 'subscribe;
                    }
                }
            }
        }
    }
    debug!("event feed task exiting");
}

/// Periodically list every instance and hand the listing to the apply loop.
async fn run_reconcile_loop<C: SchedulerClient>(
    client: Arc<C>,
    tx: mpsc::Sender<Update>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tx.send(Update::ListingStarted).await.is_err() {
                    break;
                }
                let listed = tokio::select! {
                    result = client.list_running() => result,
                    _ = shutdown.changed() => break,
                };
                match listed {
                    Ok(instances) => {
                        if tx.send(Update::Reconcile(instances)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "reconciliation listing failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("reconcile task exiting");
}
