//! Daemon wiring — builds every subsystem from a [`Config`] and runs them
//! until Ctrl-C.
//!
//! Tasks:
//! 1. Backend set reconciler (only when a scheduler URL is configured)
//! 2. Snapshot publisher on its own interval
//! 3. REST ingestion API
//!
//! All tasks share one `watch` shutdown channel and are awaited before
//! the daemon exits.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use meshsync_api::ApiState;
use meshsync_backends::{BackendSetReconciler, HttpSchedulerClient};
use meshsync_mesh::{
    CertLocator, ConfigTranslator, DirectoryLocator, RouteCollector, StaticLocator,
    StaticPolicies,
};
use meshsync_snapshot::{SnapshotCache, SnapshotPublisher, SnapshotSink};
use meshsync_state::{
    BackendLookup, ProcessAssociationDirectory, RouteDirectory, RouteMappingDirectory,
};

use crate::config::{CertsConfig, Config};

/// Static pairs first, then the discovered directory.
fn cert_locator(certs: &CertsConfig) -> Arc<dyn CertLocator> {
    let mut locators: Vec<Box<dyn CertLocator>> = Vec::new();
    if !certs.pair.is_empty() {
        locators.push(Box::new(StaticLocator::new(certs.pair.clone())));
    }
    if let Some(dir) = &certs.dir {
        info!(dir = %dir.display(), "certificate directory configured");
        locators.push(Box::new(DirectoryLocator::new(dir.clone())));
    }
    Arc::new(locators)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    info!("meshsync daemon starting");

    // ── Desired state ──────────────────────────────────────────
    let routes = Arc::new(RouteDirectory::new());
    let mappings = Arc::new(RouteMappingDirectory::new());
    let associations = Arc::new(ProcessAssociationDirectory::new());
    let reconciler = Arc::new(BackendSetReconciler::new(config.scheduler.reconciler()));
    let snapshots = Arc::new(SnapshotCache::new());

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Backend sets ───────────────────────────────────────────
    let reconciler_handle = match &config.scheduler.url {
        Some(url) => {
            let client = Arc::new(HttpSchedulerClient::new(
                url,
                config.scheduler.request_timeout,
            )?);
            info!(scheduler = %client.authority(), "scheduler client initialized");
            Some(tokio::spawn(
                Arc::clone(&reconciler).run(client, shutdown_rx.clone()),
            ))
        }
        None => {
            warn!("no scheduler configured, backend sets stay empty");
            None
        }
    };

    // ── Snapshot publisher ─────────────────────────────────────
    let collector = RouteCollector::new(
        Arc::clone(&routes),
        Arc::clone(&mappings),
        Arc::clone(&associations),
        Arc::clone(&reconciler) as Arc<dyn BackendLookup>,
    );
    let publisher = SnapshotPublisher::new(
        collector,
        ConfigTranslator::new(config.snapshot.translator()),
        cert_locator(&config.certs),
        Arc::new(StaticPolicies::new(config.policy.clone())),
        Arc::clone(&snapshots) as Arc<dyn SnapshotSink>,
    )
    .with_node_id(config.snapshot.node_id.clone());
    info!(
        interval = ?config.snapshot.interval,
        node_id = %config.snapshot.node_id,
        policies = config.policy.len(),
        "snapshot publisher initialized"
    );
    let publisher_handle = tokio::spawn(publisher.run(config.snapshot.interval, shutdown_rx));

    // ── API server ─────────────────────────────────────────────
    let router = meshsync_api::build_router(ApiState {
        routes,
        mappings,
        associations,
        backends: reconciler,
        snapshots,
        node_id: config.snapshot.node_id.clone(),
    });
    let addr = config.api.listen;
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = publisher_handle.await;
    if let Some(handle) = reconciler_handle {
        let _ = handle.await;
    }

    info!("meshsync daemon stopped");
    Ok(())
}
