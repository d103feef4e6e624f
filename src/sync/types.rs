//! Type definitions for the departure pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use utoipa::ToSchema;

/// Where the data in a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Fetched from a real upstream source
    Live,
    /// Fabricated demonstration data, served when every source failed
    Synthetic,
}

/// A single upcoming departure of the tracked line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Departure {
    /// Line designation, e.g. "1"
    pub line: String,
    /// Destination shown on the vehicle
    pub destination: String,
    /// Best known departure time as an ISO 8601 string, live estimate over plan.
    /// Absent when the provider sent neither.
    pub expected_time: Option<String>,
    /// Direction identifier as sent by the provider
    pub direction: String,
    /// True when expected_time is a live estimate rather than the plan
    pub real_time: bool,
}

/// An immutable view of the departure board, replaced whole on every refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Snapshot {
    /// Every delivered departure, ascending by expected_time
    pub departures: Vec<Departure>,
    /// Capped departure lists per expected group key
    pub groups: BTreeMap<String, Vec<Departure>>,
    /// When this snapshot was generated (RFC 3339, configured timezone)
    pub generated_at: String,
    pub source: SnapshotSource,
    /// Degradation notice, set when source is synthetic
    pub error: Option<String>,
}

impl Snapshot {
    /// Placeholder installed at startup, replaced by the first refresh
    pub fn pending(generated_at: String) -> Self {
        Self {
            departures: Vec::new(),
            groups: BTreeMap::new(),
            generated_at,
            source: SnapshotSource::Synthetic,
            error: Some("Awaiting first refresh".to_string()),
        }
    }
}

/// Handle used to request an out-of-band refresh cycle
pub type RefreshTrigger = Arc<Notify>;

/// Holds the single current snapshot.
///
/// Writers install a fully built snapshot as one unit; readers get a
/// consistent reference without taking a lock. A reader never observes a
/// half-replaced snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// The current snapshot. The returned reference stays valid and
    /// unchanged even if a replace happens concurrently.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Install a new snapshot for all subsequent reads
    pub fn replace(&self, snapshot: Arc<Snapshot>) {
        self.current.store(snapshot);
    }
}
