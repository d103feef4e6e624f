use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::ErrorResponse;
use crate::sync::{RefreshTrigger, Snapshot, SnapshotStore};

#[derive(Clone)]
pub struct DeparturesState {
    pub store: Arc<SnapshotStore>,
    pub refresh_trigger: RefreshTrigger,
}

/// Acknowledgement for a requested refresh cycle
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub message: String,
}

/// Get the current departure snapshot
#[utoipa::path(
    get,
    path = "/api/departures",
    responses(
        (status = 200, description = "Current departure snapshot", body = Snapshot),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "departures"
)]
pub async fn get_departures(State(state): State<DeparturesState>) -> Json<Arc<Snapshot>> {
    Json(state.store.current())
}

/// Request an out-of-band refresh cycle
///
/// Returns immediately; the refresh loop runs the cycle without moving its
/// periodic schedule. Requests arriving while one is pending coalesce.
#[utoipa::path(
    post,
    path = "/api/refresh",
    responses(
        (status = 200, description = "Refresh requested", body = RefreshResponse)
    ),
    tag = "departures"
)]
pub async fn trigger_refresh(State(state): State<DeparturesState>) -> Json<RefreshResponse> {
    state.refresh_trigger.notify_one();
    Json(RefreshResponse {
        message: "Refresh triggered".to_string(),
    })
}

pub fn router(store: Arc<SnapshotStore>, refresh_trigger: RefreshTrigger) -> Router {
    let state = DeparturesState {
        store,
        refresh_trigger,
    };
    Router::new()
        .route("/departures", get(get_departures))
        .route("/refresh", post(trigger_refresh))
        .with_state(state)
}
