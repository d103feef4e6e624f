use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::sync::{SnapshotSource, SnapshotStore, SubscriberRegistry};

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<SubscriberRegistry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// When the current snapshot was generated
    pub last_updated: String,
    /// Whether the current snapshot holds live or demonstration data
    pub source: SnapshotSource,
    /// Number of connected live subscribers
    pub active_subscribers: usize,
    /// Number of departures delivered in the current snapshot
    pub total_departures: usize,
    /// Delivered departure count per expected group
    pub group_counts: BTreeMap<String, usize>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let snapshot = state.store.current();

    Json(HealthResponse {
        healthy: true,
        last_updated: snapshot.generated_at.clone(),
        source: snapshot.source,
        active_subscribers: state.registry.count().await,
        total_departures: snapshot.departures.len(),
        group_counts: snapshot
            .groups
            .iter()
            .map(|(key, members)| (key.clone(), members.len()))
            .collect(),
    })
}

pub fn router(store: Arc<SnapshotStore>, registry: Arc<SubscriberRegistry>) -> Router {
    let state = HealthState { store, registry };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Departure, Snapshot};

    #[tokio::test]
    async fn health_reports_snapshot_and_subscriber_counts() {
        let store = Arc::new(SnapshotStore::new(Snapshot::pending("t0".to_string())));
        let registry = Arc::new(SubscriberRegistry::new());
        let (_id, _rx) = registry.register().await;

        let mut groups = BTreeMap::new();
        groups.insert(
            "Fridhemsplan".to_string(),
            vec![Departure {
                line: "1".to_string(),
                destination: "Fridhemsplan".to_string(),
                expected_time: Some("2026-03-01T12:04:00+01:00".to_string()),
                direction: "1".to_string(),
                real_time: true,
            }],
        );
        groups.insert("Stora Essingen".to_string(), Vec::new());
        store.replace(Arc::new(Snapshot {
            departures: groups["Fridhemsplan"].clone(),
            groups,
            generated_at: "2026-03-01T12:00:00+01:00".to_string(),
            source: SnapshotSource::Live,
            error: None,
        }));

        let state = HealthState {
            store,
            registry: registry.clone(),
        };
        let Json(health) = health_check(State(state)).await;

        assert!(health.healthy);
        assert_eq!(health.last_updated, "2026-03-01T12:00:00+01:00");
        assert_eq!(health.source, SnapshotSource::Live);
        assert_eq!(health.active_subscribers, 1);
        assert_eq!(health.total_departures, 1);
        assert_eq!(health.group_counts["Fridhemsplan"], 1);
        assert_eq!(health.group_counts["Stora Essingen"], 0);
    }
}
