//! Background refresh of the departure board.
//!
//! This module handles:
//! - Periodic fetching of raw departures through the source fallback chain
//! - Assembly of the published snapshot (grouping, capping, backfill)
//! - Fan-out of every new snapshot to live subscribers

mod board;
mod registry;
mod types;

pub use registry::SubscriberRegistry;
pub use types::{Departure, RefreshTrigger, Snapshot, SnapshotSource, SnapshotStore};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::providers::sl::{SlClient, SlError};

/// Owns the refresh pipeline: upstream client, snapshot store, subscriber
/// registry and the manual-refresh trigger.
pub struct RefreshManager {
    client: SlClient,
    config: Config,
    store: Arc<SnapshotStore>,
    registry: Arc<SubscriberRegistry>,
    refresh_requests: RefreshTrigger,
}

impl RefreshManager {
    pub fn new(config: Config) -> Result<Self, SlError> {
        let client = SlClient::new(&config)?;
        let now = Utc::now().with_timezone(&config.refresh.timezone);
        let store = Arc::new(SnapshotStore::new(Snapshot::pending(now.to_rfc3339())));

        Ok(Self {
            client,
            config,
            store,
            registry: Arc::new(SubscriberRegistry::new()),
            refresh_requests: Arc::new(Notify::new()),
        })
    }

    /// Get a reference to the snapshot store for API access
    pub fn snapshot_store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    /// Get a reference to the subscriber registry for API access
    pub fn subscriber_registry(&self) -> Arc<SubscriberRegistry> {
        self.registry.clone()
    }

    /// Get the trigger handle for passing to API handlers
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh_requests.clone()
    }

    /// Run one refresh cycle: fetch, assemble or synthesize a snapshot,
    /// then publish it to the store and every subscriber. Fetch exhaustion
    /// degrades to the synthetic dataset instead of failing the cycle.
    pub async fn refresh_once(&self) {
        let now = Utc::now().with_timezone(&self.config.refresh.timezone);

        let snapshot = match self.client.fetch_departures().await {
            Ok(payload) => {
                board::build_snapshot(&payload, now, &self.config.stop, &self.config.board)
            }
            Err(e) => {
                warn!(error = %e, "Falling back to demonstration data");
                board::synthetic_snapshot(now, &self.config.stop, &self.config.board)
            }
        };

        info!(
            departures = snapshot.departures.len(),
            source = ?snapshot.source,
            "Refresh cycle completed"
        );

        let snapshot = Arc::new(snapshot);
        self.store.replace(snapshot.clone());
        self.registry.broadcast(snapshot).await;
    }

    /// Refresh loop: one cycle per interval tick plus one cycle per manual
    /// request. Manual cycles run out of band and never move the periodic
    /// schedule. Cancelling the token stops the loop; an in-flight cycle is
    /// aborted rather than awaited.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.refresh.interval_secs,
            "Starting refresh loop"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.refresh.interval_secs));
        // Skip the first tick which fires immediately (the startup refresh
        // already populated the store)
        interval.tick().await;

        loop {
            let reason = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => "scheduled",
                _ = self.refresh_requests.notified() => "manual",
            };
            debug!(reason, "Starting refresh cycle");

            tokio::select! {
                _ = self.refresh_once() => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Refresh loop stopped");
    }
}
