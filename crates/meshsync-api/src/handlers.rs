//! REST API handlers.
//!
//! Mutating handlers validate the whole request before touching a
//! directory, so a rejected request leaves state unchanged.

use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use meshsync_snapshot::{KindResources, ResourceKind};
use meshsync_state::*;

use crate::ApiResponse;
use crate::ApiState;
use crate::error::{ApiError, ApiResult};

/// Validate a route and assign a VIP to internal routes that lack one.
fn admit_route(mut route: Route) -> ApiResult<Route> {
    route.validate()?;
    route.host = route.hostname();
    if route.is_internal() {
        route.internal = true;
        if route.vip.is_none() {
            route.vip = Some(vip_for_hostname(&route.hostname()).to_string());
        }
    }
    Ok(route)
}

// ── Routes ─────────────────────────────────────────────────────

/// GET /api/v1/routes
pub async fn list_routes(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.routes.list())
}

/// GET /api/v1/routes/{id}
pub async fn get_route(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .routes
        .get(&id)
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("route {id}")))
}

/// POST /api/v1/routes
pub async fn upsert_route(
    State(state): State<ApiState>,
    Json(route): Json<Route>,
) -> ApiResult<impl IntoResponse> {
    let route = admit_route(route)?;
    state.routes.upsert(route.clone());
    Ok(ApiResponse::ok(route))
}

/// DELETE /api/v1/routes/{id}
pub async fn delete_route(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.routes.delete(&id);
    ApiResponse::ok("deleted")
}

// ── Mappings ───────────────────────────────────────────────────

/// A mapping together with its share of the route's traffic.
#[derive(Debug, Serialize, Deserialize)]
pub struct MappingView {
    #[serde(flatten)]
    pub mapping: RouteMapping,
    /// Percentage of the route's traffic, rounded.
    pub calculated_weight: u32,
}

/// GET /api/v1/mappings
pub async fn list_mappings(State(state): State<ApiState>) -> impl IntoResponse {
    let views: Vec<MappingView> = state
        .mappings
        .list()
        .into_iter()
        .map(|mapping| MappingView {
            calculated_weight: state.mappings.calculated_weight(&mapping),
            mapping,
        })
        .collect();
    ApiResponse::ok(views)
}

/// POST /api/v1/mappings
pub async fn map_route(
    State(state): State<ApiState>,
    Json(mapping): Json<RouteMapping>,
) -> ApiResult<impl IntoResponse> {
    mapping.validate()?;
    state.mappings.map(mapping.clone());
    Ok(ApiResponse::ok(mapping))
}

/// DELETE /api/v1/mappings/{route_id}/{process_id}
pub async fn unmap_route(
    State(state): State<ApiState>,
    Path((route_id, process_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state.mappings.unmap(&MappingKey {
        route_id,
        process_id,
    });
    ApiResponse::ok("deleted")
}

// ── Associations ───────────────────────────────────────────────

/// GET /api/v1/associations
pub async fn list_associations(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.associations.list())
}

/// POST /api/v1/associations
pub async fn upsert_association(
    State(state): State<ApiState>,
    Json(association): Json<ProcessAssociation>,
) -> ApiResult<impl IntoResponse> {
    association.validate()?;
    state.associations.upsert(association.clone());
    Ok(ApiResponse::ok(association))
}

/// DELETE /api/v1/associations/{process_id}
pub async fn delete_association(
    State(state): State<ApiState>,
    Path(process_id): Path<String>,
) -> impl IntoResponse {
    state.associations.delete(&process_id);
    ApiResponse::ok("deleted")
}

// ── Bulk sync ──────────────────────────────────────────────────

/// Whole-state replacement. Omitted sections are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub routes: Option<Vec<Route>>,
    #[serde(default)]
    pub mappings: Option<Vec<RouteMapping>>,
    #[serde(default)]
    pub associations: Option<Vec<ProcessAssociation>>,
}

/// Directory sizes after a sync.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub routes: usize,
    pub mappings: usize,
    pub associations: usize,
}

/// POST /api/v1/sync
pub async fn sync(
    State(state): State<ApiState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<impl IntoResponse> {
    let routes = req
        .routes
        .map(|routes| routes.into_iter().map(admit_route).collect::<ApiResult<Vec<_>>>())
        .transpose()?;
    if let Some(mappings) = &req.mappings {
        mappings.iter().try_for_each(RouteMapping::validate)?;
    }
    if let Some(associations) = &req.associations {
        associations
            .iter()
            .try_for_each(ProcessAssociation::validate)?;
    }

    if let Some(routes) = routes {
        state.routes.sync(routes);
    }
    if let Some(mappings) = req.mappings {
        state.mappings.sync(mappings);
    }
    if let Some(associations) = req.associations {
        state.associations.sync(associations);
    }

    let summary = SyncSummary {
        routes: state.routes.len(),
        mappings: state.mappings.len(),
        associations: state.associations.len(),
    };
    info!(
        routes = summary.routes,
        mappings = summary.mappings,
        associations = summary.associations,
        "desired state synced"
    );
    Ok(ApiResponse::ok(summary))
}

// ── Backends ───────────────────────────────────────────────────

/// Live endpoints for one scheduler process.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackendSetView {
    pub scheduler_process_id: SchedulerProcessId,
    pub backends: BackendSet,
    pub internal_backends: BackendSet,
}

/// GET /api/v1/backends
pub async fn list_backends(State(state): State<ApiState>) -> impl IntoResponse {
    let views: Vec<BackendSetView> = state
        .backends
        .list()
        .into_iter()
        .map(|(id, backends)| BackendSetView {
            internal_backends: state.backends.internal_backends(&id),
            scheduler_process_id: id,
            backends,
        })
        .collect();
    ApiResponse::ok(views)
}

// ── VIPs ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct VipView {
    pub hostname: String,
    pub vip: String,
}

/// GET /api/v1/vips/{fqdn}
pub async fn resolve_vip(
    State(state): State<ApiState>,
    Path(fqdn): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let vip = state
        .routes
        .vip_by_hostname(&fqdn)
        .ok_or_else(|| ApiError::NotFound(format!("vip for {fqdn}")))?;
    debug!(%fqdn, %vip, "vip resolved");
    Ok(ApiResponse::ok(VipView {
        hostname: fqdn.trim_end_matches('.').to_ascii_lowercase(),
        vip,
    }))
}

// ── Snapshot ───────────────────────────────────────────────────

/// The snapshot last published for the configured node.
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub node_id: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub versions: BTreeMap<ResourceKind, String>,
    pub kinds: BTreeMap<ResourceKind, KindResources>,
}

/// GET /api/v1/snapshot
pub async fn get_snapshot(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let snapshot = state
        .snapshots
        .get(&state.node_id)
        .ok_or_else(|| ApiError::NotFound(format!("snapshot for node {}", state.node_id)))?;

    let kinds = snapshot
        .kinds()
        .filter_map(|kind| snapshot.get(kind).map(|r| (kind, r.clone())))
        .collect();
    Ok(ApiResponse::ok(SnapshotView {
        node_id: state.node_id.clone(),
        created_at: snapshot
            .created_at()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        versions: snapshot.versions(),
        kinds,
    }))
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use meshsync_backends::{BackendSetReconciler, ReconcilerConfig};
    use meshsync_snapshot::SnapshotCache;

    fn test_state() -> ApiState {
        ApiState {
            routes: Arc::new(RouteDirectory::new()),
            mappings: Arc::new(RouteMappingDirectory::new()),
            associations: Arc::new(ProcessAssociationDirectory::new()),
            backends: Arc::new(BackendSetReconciler::new(ReconcilerConfig::default())),
            snapshots: Arc::new(SnapshotCache::new()),
            node_id: "default".to_string(),
        }
    }

    #[test]
    fn internal_route_gets_vip() {
        let route = admit_route(Route::new("r1", "Db.apps.internal")).unwrap();
        assert!(route.internal);
        assert_eq!(
            route.vip,
            Some(vip_for_hostname("db.apps.internal").to_string())
        );

        let external = admit_route(Route::new("r2", "a.example.com")).unwrap();
        assert!(!external.internal);
        assert!(external.vip.is_none());
    }

    #[test]
    fn explicit_vip_is_kept() {
        let route = admit_route(Route::new("r1", "db").with_vip("127.9.9.9")).unwrap();
        assert_eq!(route.vip.as_deref(), Some("127.9.9.9"));
    }

    #[test]
    fn admitted_host_is_lowercased() {
        let route = admit_route(Route::new("r1", "DB.Apps.Internal")).unwrap();
        assert_eq!(route.host, "db.apps.internal");
        assert!(route.internal);
    }

    #[tokio::test]
    async fn upsert_route_rejects_missing_host() {
        let state = test_state();
        let result = upsert_route(State(state.clone()), Json(Route::new("r1", ""))).await;
        let resp = result.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.routes.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_route_is_not_found() {
        let state = test_state();
        let resp = get_route(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn map_rejects_out_of_range_weight() {
        let state = test_state();
        for weight in [0, 129] {
            let resp = map_route(
                State(state.clone()),
                Json(RouteMapping::new("r1", "p1", weight)),
            )
            .await
            .into_response();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(state.mappings.is_empty());
    }

    #[tokio::test]
    async fn association_requires_scheduler_ids() {
        let state = test_state();
        let empty: [&str; 0] = [];
        let resp = upsert_association(
            State(state.clone()),
            Json(ProcessAssociation::new("p1", empty)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.associations.is_empty());
    }

    #[tokio::test]
    async fn sync_is_all_or_nothing() {
        let state = test_state();
        state.routes.upsert(Route::new("old", "old.example.com"));

        let req = SyncRequest {
            routes: Some(vec![Route::new("r1", "a.example.com")]),
            mappings: Some(vec![RouteMapping::new("r1", "p1", 500)]),
            associations: None,
        };
        let resp = sync(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.routes.get("old").is_some());
        assert!(state.routes.get("r1").is_none());
    }

    #[tokio::test]
    async fn sync_replaces_only_given_sections() {
        let state = test_state();
        state.routes.upsert(Route::new("old", "old.example.com"));
        state
            .associations
            .upsert(ProcessAssociation::new("p1", ["s1"]));

        let req = SyncRequest {
            routes: Some(vec![Route::new("r1", "a.example.com")]),
            mappings: Some(vec![RouteMapping::new("r1", "p1", 1)]),
            associations: None,
        };
        let resp = sync(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.routes.get("old").is_none());
        assert!(state.routes.get("r1").is_some());
        assert_eq!(state.mappings.len(), 1);
        assert_eq!(state.associations.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_not_found_before_first_publish() {
        let state = test_state();
        let resp = get_snapshot(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
