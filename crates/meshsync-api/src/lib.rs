//! meshsync-api — REST ingestion API for meshsync.
//!
//! The routing API pushes desired state through these handlers into the
//! three directories; operators read back directories, backend sets, VIPs
//! and the last published snapshot.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/routes` | List routes |
//! | POST | `/api/v1/routes` | Upsert a route |
//! | GET | `/api/v1/routes/{id}` | Get a route |
//! | DELETE | `/api/v1/routes/{id}` | Delete a route |
//! | GET | `/api/v1/mappings` | List mappings with calculated weights |
//! | POST | `/api/v1/mappings` | Map a route to a process |
//! | DELETE | `/api/v1/mappings/{route_id}/{process_id}` | Unmap |
//! | GET | `/api/v1/associations` | List process associations |
//! | POST | `/api/v1/associations` | Upsert an association |
//! | DELETE | `/api/v1/associations/{process_id}` | Delete an association |
//! | POST | `/api/v1/sync` | Replace routes, mappings and/or associations |
//! | GET | `/api/v1/backends` | Live backend sets |
//! | GET | `/api/v1/vips/{fqdn}` | Resolve an internal hostname's VIP |
//! | GET | `/api/v1/snapshot` | Last published snapshot |
//! | GET | `/healthz` | Liveness |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::{delete, get, post};
use serde::Serialize;

use meshsync_backends::BackendSetReconciler;
use meshsync_snapshot::SnapshotCache;
use meshsync_state::{ProcessAssociationDirectory, RouteDirectory, RouteMappingDirectory};

pub use error::{ApiError, ApiResult};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub routes: Arc<RouteDirectory>,
    pub mappings: Arc<RouteMappingDirectory>,
    pub associations: Arc<ProcessAssociationDirectory>,
    pub backends: Arc<BackendSetReconciler>,
    pub snapshots: Arc<SnapshotCache>,
    /// Node whose snapshot `/api/v1/snapshot` reports.
    pub node_id: String,
}

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/routes", get(handlers::list_routes).post(handlers::upsert_route))
        .route("/routes/{id}", get(handlers::get_route).delete(handlers::delete_route))
        .route("/mappings", get(handlers::list_mappings).post(handlers::map_route))
        .route("/mappings/{route_id}/{process_id}", delete(handlers::unmap_route))
        .route(
            "/associations",
            get(handlers::list_associations).post(handlers::upsert_association),
        )
        .route("/associations/{process_id}", delete(handlers::delete_association))
        .route("/sync", post(handlers::sync))
        .route("/backends", get(handlers::list_backends))
        .route("/vips/{fqdn}", get(handlers::resolve_vip))
        .route("/snapshot", get(handlers::get_snapshot))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
