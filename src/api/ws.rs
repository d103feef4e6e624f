use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::sync::{SnapshotStore, SubscriberRegistry};

#[derive(Clone)]
pub struct WsState {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<SubscriberRegistry>,
}

/// WebSocket endpoint for departure updates
pub async fn ws_departures(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Register before the initial send so a refresh landing in between is
    // queued on the channel rather than missed
    let (id, mut snapshots) = state.registry.register().await;
    debug!(subscriber = id, "WebSocket client connected");

    // Send the current snapshot so new clients render without waiting for
    // the next refresh cycle
    let current = state.store.current();
    if let Ok(json) = serde_json::to_string(current.as_ref()) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Channel to pass liveness probes from the reader to the task owning
    // the sender half
    let (probe_tx, mut probe_rx) = tokio::sync::mpsc::channel::<()>(4);

    // Spawn task to forward pushed snapshots to the WebSocket
    let forward_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                snapshot = snapshots.recv() => {
                    let Some(snapshot) = snapshot else { break };
                    let Ok(json) = serde_json::to_string(snapshot.as_ref()) else { continue };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                probe = probe_rx.recv() => {
                    if probe.is_none() {
                        break;
                    }
                    if sender.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Handle incoming messages from the client
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.as_str() == "ping" && probe_tx.send(()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    state.registry.unregister(id).await;
    forward_task.abort();
    debug!(subscriber = id, "WebSocket client disconnected");
}
