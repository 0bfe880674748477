//! End-to-end: producer envelopes -> MQTT dispatch -> ingest -> store + deltas.

use fleetstate_devkit::{at, field_at, SnapshotBuilder};
use fleetstate_kernel::config::TopicsConf;
use fleetstate_kernel::health::HealthTracker;
use fleetstate_kernel::ingest::{ChannelSink, Ingestor, StateDelta};
use fleetstate_kernel::models::{DeviceState, RoomState};
use fleetstate_kernel::mqtt::handle_publish;
use fleetstate_kernel::store::{JsonFileStore, MemoryStore, StateStore};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Harness {
    ingestor: Ingestor,
    deltas: UnboundedReceiver<StateDelta>,
    topics: TopicsConf,
}

impl Harness {
    fn in_memory() -> Self {
        Self::with_stores(
            Arc::new(MemoryStore::<DeviceState>::new()),
            Arc::new(MemoryStore::<RoomState>::new()),
        )
    }

    fn on_disk(dir: &Path) -> Self {
        let devices: JsonFileStore<DeviceState> =
            JsonFileStore::open(dir.join("devices.json")).unwrap();
        let rooms: JsonFileStore<RoomState> = JsonFileStore::open(dir.join("rooms.json")).unwrap();
        Self::with_stores(Arc::new(devices), Arc::new(rooms))
    }

    fn with_stores(
        devices: Arc<dyn StateStore<DeviceState>>,
        rooms: Arc<dyn StateStore<RoomState>>,
    ) -> Self {
        let (tx, deltas) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink::new(tx));
        let ingestor = Ingestor::new(devices, rooms, sink, HealthTracker::new());
        Self { ingestor, deltas, topics: TopicsConf::default() }
    }

    fn publish(&self, snapshot: &SnapshotBuilder) -> Option<bool> {
        let payload = snapshot.to_bytes().unwrap();
        handle_publish(&self.ingestor, &self.topics, snapshot.topic(), &payload)
    }

    fn next_delta(&mut self) -> Option<Value> {
        self.deltas.try_recv().ok().map(|d| serde_json::to_value(d).unwrap())
    }

    fn device(&self, id: &str) -> DeviceState {
        self.ingestor.devices().load(id).unwrap().unwrap()
    }
}

#[test]
fn late_snapshot_does_not_roll_back_newer_values() {
    let mut h = Harness::in_memory();

    let newer = SnapshotBuilder::device("ITB-1101-D1").set_string("power", "standby", 10);
    let older = SnapshotBuilder::device("ITB-1101-D1")
        .set_string("power", "on", 5)
        .set_string("input", "hdmi1", 5);

    assert_eq!(h.publish(&newer), Some(true));
    assert_eq!(h.publish(&older), Some(true));

    let device = h.device("ITB-1101-D1");
    assert_eq!(device.display.power, "standby");
    assert_eq!(device.display.input, "hdmi1");

    let first = h.next_delta().unwrap();
    assert_eq!(first["kind"], "device");
    assert_eq!(field_at(&first, "diff.power"), Some(&Value::from("standby")));

    let second = h.next_delta().unwrap();
    assert!(field_at(&second, "diff.power").is_none());
    assert_eq!(field_at(&second, "diff.input"), Some(&Value::from("hdmi1")));
    assert!(h.next_delta().is_none());
}

#[test]
fn replayed_snapshot_is_silent() {
    let mut h = Harness::in_memory();
    let snapshot = SnapshotBuilder::device("ITB-1101-D1")
        .set_bool("blanked", true, 3)
        .set_tags(&["projector", "ceiling"], 3);

    assert_eq!(h.publish(&snapshot), Some(true));
    assert_eq!(h.publish(&snapshot), Some(false));
    assert!(h.next_delta().is_some());
    assert!(h.next_delta().is_none());

    let health = h.ingestor.health().snapshot(1, 0);
    assert_eq!(health.merges_applied, 2);
    assert_eq!(health.merges_unchanged, 1);
}

#[test]
fn alert_lifecycle_reaches_the_delta_stream() {
    let mut h = Harness::in_memory();

    let device = || SnapshotBuilder::device("ITB-1101-D1");
    h.publish(&device().alert("lamp", true, "lamp hours exceeded", 1));
    h.publish(&device().alert("lamp", false, "lamp replaced", 20));
    h.publish(&device().alert("lamp", true, "stale report", 15));

    let raised = h.next_delta().unwrap();
    assert_eq!(field_at(&raised, "diff.alerts.lamp.alerting"), Some(&Value::Bool(true)));

    let cleared = h.next_delta().unwrap();
    assert_eq!(field_at(&cleared, "diff.alerts.lamp.alerting"), Some(&Value::Bool(false)));
    assert_eq!(field_at(&cleared, "diff.alerts.lamp.message"), Some(&Value::from("lamp replaced")));
    assert!(h.next_delta().is_none());

    let alert = &h.device("ITB-1101-D1").alerts["lamp"];
    assert!(!alert.alerting);
    assert_eq!(alert.message, "lamp replaced");
}

#[test]
fn diff_never_carries_the_clock() {
    let mut h = Harness::in_memory();
    h.publish(&SnapshotBuilder::device("ITB-1101-D1").set_number("temperature_celsius", 41.5, 2));

    let delta = h.next_delta().unwrap();
    assert_eq!(delta["id"], "ITB-1101-D1");
    assert!(field_at(&delta, "diff.field_clock").is_none());
    assert_eq!(field_at(&delta, "diff.temperature_celsius"), Some(&Value::from(41.5)));
}

#[test]
fn rooms_follow_the_same_rules() {
    let mut h = Harness::in_memory();

    h.publish(&SnapshotBuilder::room("ITB-1101").set_bool("alerting", true, 8));
    h.publish(&SnapshotBuilder::room("ITB-1101").set_bool("alerting", false, 4));

    let room = h.ingestor.rooms().load("ITB-1101").unwrap().unwrap();
    assert_eq!(room.alerting, Some(true));
    let stamped = room.field_clock.get("alerting").map(|t| t.unix_timestamp());
    assert_eq!(stamped, Some(at(8).timestamp()));

    let delta = h.next_delta().unwrap();
    assert_eq!(delta["kind"], "room");
    assert!(h.next_delta().is_none());
}

#[test]
fn merged_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let h = Harness::on_disk(dir.path());
        h.publish(
            &SnapshotBuilder::device("ITB-1101-D1")
                .set_string("power", "on", 5)
                .set_integer("lamp_hours", 1200, 5),
        );
    }

    let mut h = Harness::on_disk(dir.path());
    let device = h.device("ITB-1101-D1");
    assert_eq!(device.display.power, "on");
    assert_eq!(device.display.lamp_hours, Some(1200));

    // clock reloaded from disk still gates stale updates
    let stale = SnapshotBuilder::device("ITB-1101-D1").set_string("power", "off", 1);
    assert_eq!(h.publish(&stale), Some(false));
    assert!(h.next_delta().is_none());
}
