pub mod departures;
pub mod error;
pub mod health;
pub mod ws;

pub use error::ErrorResponse;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::sync::{RefreshTrigger, SnapshotStore, SubscriberRegistry};

pub fn router(
    store: Arc<SnapshotStore>,
    registry: Arc<SubscriberRegistry>,
    refresh_trigger: RefreshTrigger,
) -> Router {
    let ws_state = ws::WsState {
        store: store.clone(),
        registry: registry.clone(),
    };

    Router::new()
        .merge(departures::router(store.clone(), refresh_trigger))
        .nest("/health", health::router(store, registry))
        .route("/ws", get(ws::ws_departures).with_state(ws_state))
}
