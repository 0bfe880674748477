/**
 * INGEST PIPELINE - Applies incoming partial snapshots to stored state
 *
 * FLOW (per snapshot):
 * 1. take the lock of the entity ID (one in-flight merge per entity)
 * 2. load the stored state, or start from an empty one carrying the ID
 * 3. merge, persist `merged` only if something changed
 * 4. forward the sparse diff to the downstream sink only if something changed
 *
 * Transports (MQTT listener, HTTP handlers) all go through the same `Ingestor`
 * so the per-entity ordering holds whatever the entry point.
 */

use crate::health::HealthTracker;
use crate::merge::{merge_device_state, merge_room_state, MergeOutcome};
use crate::models::{DeviceState, RoomState};
use crate::store::{StateStore, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What downstream consumers (indexing, alerting) receive for every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StateDelta {
    Device { id: String, diff: DeviceState },
    Room { id: String, diff: RoomState },
}

impl StateDelta {
    pub fn id(&self) -> &str {
        match self {
            StateDelta::Device { id, .. } | StateDelta::Room { id, .. } => id,
        }
    }
}

/// Downstream consumer of diffs.
pub trait DiffSink: Send + Sync {
    fn forward(&self, delta: &StateDelta) -> Result<(), SinkError>;
}

/// Drops every delta.
pub struct NullSink;

impl DiffSink for NullSink {
    fn forward(&self, _delta: &StateDelta) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Hands deltas to an in-process consumer.
pub struct ChannelSink(UnboundedSender<StateDelta>);

impl ChannelSink {
    pub fn new(sender: UnboundedSender<StateDelta>) -> Self {
        Self(sender)
    }
}

impl DiffSink for ChannelSink {
    fn forward(&self, delta: &StateDelta) -> Result<(), SinkError> {
        self.0
            .send(delta.clone())
            .map_err(|_| SinkError::Unavailable("delta channel closed".into()))
    }
}

/// Result of applying one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome<T> {
    pub changed: bool,
    pub diff: T,
}

/// One mutex per entity ID. Entries live only while some merge holds or waits
/// on them.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn with_lock<R>(&self, id: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.locks.lock().entry(id.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.release(id);
        result
    }

    fn release(&self, id: &str) {
        let mut locks = self.locks.lock();
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}

pub struct Ingestor {
    devices: Arc<dyn StateStore<DeviceState>>,
    rooms: Arc<dyn StateStore<RoomState>>,
    sink: Arc<dyn DiffSink>,
    health: HealthTracker,
    device_locks: KeyedLocks,
    room_locks: KeyedLocks,
}

impl Ingestor {
    pub fn new(
        devices: Arc<dyn StateStore<DeviceState>>,
        rooms: Arc<dyn StateStore<RoomState>>,
        sink: Arc<dyn DiffSink>,
        health: HealthTracker,
    ) -> Self {
        Self {
            devices,
            rooms,
            sink,
            health,
            device_locks: KeyedLocks::default(),
            room_locks: KeyedLocks::default(),
        }
    }

    pub fn devices(&self) -> &Arc<dyn StateStore<DeviceState>> {
        &self.devices
    }

    pub fn rooms(&self) -> &Arc<dyn StateStore<RoomState>> {
        &self.rooms
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn apply_device(
        &self,
        id: &str,
        incoming: &DeviceState,
    ) -> Result<IngestOutcome<DeviceState>, IngestError> {
        self.device_locks.with_lock(id, || -> Result<_, IngestError> {
            let outcome = self.merge_and_persist(
                self.devices.as_ref(),
                id,
                incoming,
                |id| DeviceState::new(id),
                merge_device_state,
            )?;
            if outcome.changed {
                let diff = outcome.diff.clone();
                self.forward(StateDelta::Device { id: id.to_string(), diff });
            }
            Ok(outcome)
        })
    }

    pub fn apply_room(
        &self,
        id: &str,
        incoming: &RoomState,
    ) -> Result<IngestOutcome<RoomState>, IngestError> {
        self.room_locks.with_lock(id, || -> Result<_, IngestError> {
            let outcome = self.merge_and_persist(
                self.rooms.as_ref(),
                id,
                incoming,
                |id| RoomState::new(id),
                merge_room_state,
            )?;
            if outcome.changed {
                let diff = outcome.diff.clone();
                self.forward(StateDelta::Room { id: id.to_string(), diff });
            }
            Ok(outcome)
        })
    }

    fn merge_and_persist<T>(
        &self,
        store: &dyn StateStore<T>,
        id: &str,
        incoming: &T,
        fresh: fn(String) -> T,
        merge: fn(&T, &T) -> MergeOutcome<T>,
    ) -> Result<IngestOutcome<T>, IngestError> {
        let base = match store.load(id) {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!(id, "first snapshot for entity");
                fresh(id.to_string())
            }
            Err(e) => {
                self.health.record_store_error();
                return Err(e.into());
            }
        };

        let MergeOutcome { diff, merged, changed } = merge(&base, incoming);
        self.health.record_merge(changed);

        if !changed {
            debug!(id, "snapshot brought nothing new");
            return Ok(IngestOutcome { changed, diff });
        }

        if let Err(e) = store.save(id, &merged) {
            self.health.record_store_error();
            return Err(e.into());
        }
        debug!(id, "merged state persisted");

        Ok(IngestOutcome { changed, diff })
    }

    fn forward(&self, delta: StateDelta) {
        if let Err(e) = self.sink.forward(&delta) {
            self.health.record_sink_error();
            warn!(id = delta.id(), error = %e, "failed to forward delta");
        }
    }
}
