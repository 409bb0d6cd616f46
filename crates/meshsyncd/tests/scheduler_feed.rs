//! Live-running tests: the reconciler and publisher run as background tasks
//! against an in-process scheduler, the way the daemon wires them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use meshsync_backends::{
    BackendSetReconciler, Instance, InstanceEvent, InstanceEventSource, ReconcilerConfig,
    SchedulerClient, SchedulerResult,
};
use meshsync_mesh::{ConfigTranslator, ResourceKind, RouteCollector, StaticLocator, StaticPolicies};
use meshsync_snapshot::{Snapshot, SnapshotCache, SnapshotPublisher, SnapshotSink};
use meshsync_state::{
    BackendLookup, ProcessAssociation, ProcessAssociationDirectory, Route, RouteDirectory,
    RouteMapping, RouteMappingDirectory,
};

struct FeedScheduler {
    events: broadcast::Sender<InstanceEvent>,
    listing: Mutex<Vec<Instance>>,
}

struct FeedEvents {
    rx: broadcast::Receiver<InstanceEvent>,
}

impl InstanceEventSource for FeedEvents {
    async fn next(&mut self) -> SchedulerResult<Option<InstanceEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

impl SchedulerClient for FeedScheduler {
    type Events = FeedEvents;

    async fn subscribe(&self) -> SchedulerResult<FeedEvents> {
        Ok(FeedEvents {
            rx: self.events.subscribe(),
        })
    }

    async fn list_running(&self) -> SchedulerResult<Vec<Instance>> {
        Ok(self.listing.lock().unwrap().clone())
    }
}

fn make_instance(scheduler_id: &str, address: &str, host_port: u16) -> Instance {
    Instance::running(scheduler_id, address).with_port(8080, host_port)
}

fn endpoint_addresses(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .resources(ResourceKind::ServiceEntry)
        .iter()
        .flat_map(|r| r.body["endpoints"].as_array().cloned().unwrap_or_default())
        .filter_map(|e| e["address"].as_str().map(str::to_string))
        .collect()
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn feed_and_listing_flow_into_snapshots() {
    let routes = Arc::new(RouteDirectory::new());
    let mappings = Arc::new(RouteMappingDirectory::new());
    let associations = Arc::new(ProcessAssociationDirectory::new());
    routes.upsert(Route::new("r1", "a.example.com"));
    mappings.map(RouteMapping::new("r1", "p1", 1));
    mappings.map(RouteMapping::new("r1", "p2", 1));
    associations.upsert(ProcessAssociation::new("p1", ["s1"]));
    associations.upsert(ProcessAssociation::new("p2", ["s2"]));

    let (events, _) = broadcast::channel(64);
    let scheduler = Arc::new(FeedScheduler {
        events,
        listing: Mutex::new(vec![make_instance("s1", "10.0.0.1", 9001)]),
    });
    let reconciler = Arc::new(BackendSetReconciler::new(ReconcilerConfig {
        reconcile_interval: Duration::from_millis(50),
        retry_delay: Duration::from_millis(10),
        channel_capacity: 16,
        ..ReconcilerConfig::default()
    }));
    let cache = Arc::new(SnapshotCache::new());
    let publisher = SnapshotPublisher::new(
        RouteCollector::new(
            routes,
            mappings,
            associations,
            Arc::clone(&reconciler) as Arc<dyn BackendLookup>,
        ),
        ConfigTranslator::default(),
        Arc::new(StaticLocator::default()),
        Arc::new(StaticPolicies::default()),
        Arc::clone(&cache) as Arc<dyn SnapshotSink>,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_task = tokio::spawn(
        Arc::clone(&reconciler).run(Arc::clone(&scheduler), shutdown_rx.clone()),
    );
    let publisher_task = tokio::spawn(publisher.run(Duration::from_millis(20), shutdown_rx));

    // The periodic listing seeds s1.
    wait_for(|| {
        cache
            .get("default")
            .is_some_and(|s| endpoint_addresses(&s) == ["10.0.0.1"])
    })
    .await;

    // s2 arrives over the live feed; resend until the feed is subscribed.
    let created = InstanceEvent::Created {
        instance: make_instance("s2", "10.0.0.2", 9002),
    };
    wait_for(|| {
        let _ = scheduler.events.send(created.clone());
        reconciler.is_tracked("s2")
    })
    .await;
    // The scheduler's listing catches up so the next pass keeps s2.
    scheduler.listing.lock().unwrap().push(make_instance("s2", "10.0.0.2", 9002));
    wait_for(|| {
        cache
            .get("default")
            .is_some_and(|s| endpoint_addresses(&s) == ["10.0.0.1", "10.0.0.2"])
    })
    .await;

    // s1 disappears from the listing: removal by absence.
    *scheduler.listing.lock().unwrap() = vec![make_instance("s2", "10.0.0.2", 9002)];
    wait_for(|| {
        cache
            .get("default")
            .is_some_and(|s| endpoint_addresses(&s) == ["10.0.0.2"])
    })
    .await;
    assert!(reconciler.get("s1").is_empty());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        reconciler_task.await.unwrap();
        publisher_task.await.unwrap();
    })
    .await
    .expect("tasks stop on shutdown");
}
