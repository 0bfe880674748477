/**
 * MODELS - Device and room state records held by the aggregator
 *
 * ROLE: One `DeviceState` per device and one `RoomState` per room, each carrying
 * a `FieldClock` that records, per field, when the value was last authoritative.
 *
 * WIRE FORMAT: flat JSON objects. Absent values are omitted on serialization so
 * the same types describe a full snapshot, a partial incoming update and a sparse
 * diff. Timestamps are RFC 3339 strings.
 *
 * REPRESENTATION:
 * - strings: empty means "not supplied"
 * - bool / int / float / timestamp: `None` means "not supplied"
 * - tags: `None` means "not supplied", compared as a set
 */

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Prefix of the clock keys gating entries of the alert collection.
pub const ALERT_CLOCK_PREFIX: &str = "alerts.";

/// Clock key for a single alert, e.g. `alerts.projector-lamp`.
pub fn alert_clock_key(alert_id: &str) -> String {
    format!("{ALERT_CLOCK_PREFIX}{alert_id}")
}

/// Per-field timestamps of the last accepted update.
///
/// The clock is the only ordering oracle: transport receive times never take
/// part in merge decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldClock(BTreeMap<String, OffsetDateTime>);

impl FieldClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<OffsetDateTime> {
        self.0.get(key).copied()
    }

    /// Records `at` for `key`, replacing whatever was there.
    pub fn stamp(&mut self, key: impl Into<String>, at: OffsetDateTime) {
        self.0.insert(key.into(), at);
    }

    /// Builder flavour of [`FieldClock::stamp`].
    pub fn with(mut self, key: impl Into<String>, at: OffsetDateTime) -> Self {
        self.stamp(key, at);
        self
    }

    /// True when this clock holds an entry for `key` strictly after the one in `other`.
    ///
    /// A missing entry on our side is never newer; a missing entry on the other
    /// side is older than any present one.
    pub fn is_newer(&self, key: &str, other: &FieldClock) -> bool {
        match (self.get(key), other.get(key)) {
            (Some(mine), Some(theirs)) => mine > theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Folds `other` into this clock keeping the later timestamp per key.
    pub fn advance(&mut self, other: &FieldClock) {
        for (key, &at) in &other.0 {
            match self.0.get_mut(key) {
                Some(current) if *current >= at => {}
                Some(current) => *current = at,
                None => {
                    self.0.insert(key.clone(), at);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, OffsetDateTime)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct Rfc3339Ref<'a>(&'a OffsetDateTime);

impl Serialize for Rfc3339Ref<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(self.0, serializer)
    }
}

#[derive(Deserialize)]
#[serde(transparent)]
struct Rfc3339Owned(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Serialize for FieldClock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, Rfc3339Ref(v))))
    }
}

impl<'de> Deserialize<'de> for FieldClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Rfc3339Owned>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(|(k, v)| (k, v.0)).collect()))
    }
}

/// A single named alert on a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRecord {
    pub alerting: bool,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub alert_sent: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Alerts of one device keyed by alert identifier.
pub type AlertMap = BTreeMap<String, AlertRecord>;

/// Crestron-style control processor telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlProcessorFields {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub broadcast_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_gateway: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_enabled: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub firmware_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hardware_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub part_number: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_uptime_seconds: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub websocket_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket_count: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status_message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_codes: String,
}

/// Projectors, flat panels and other displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayFields {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub power: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blanked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_signal: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lamp_hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub audio_input: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub audio_output: String,
}

/// Wireless microphones and their batteries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_charge_bars: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_charge_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_charge_percentage: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub battery_charge_hours_minutes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_cycles: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub battery_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub microphone_channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub interference: String,
}

/// Wireless presentation (VIA) session counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViaFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presenter_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_session_count: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub via_version: String,
}

/// Metrics reported by Linux hosts (pis, servers) sitting in a room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxHostFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average_1m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_uptime_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_count: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
}

/// Digital media presentation switchers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmpsFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_input_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_output_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sync: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hdcp_status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dm_network_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed_rpm: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_panel_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chassis_temperature_celsius: Option<f64>,
}

/// Links used by dashboards to deep-link into control UIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaLinks {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub control_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub enable_notifications_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub suppress_notifications_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub view_dashboard_link: String,
}

/// Current known state of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub building_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub room_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_class: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_state_received: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_user_input: Option<OffsetDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting: Option<bool>,
    #[serde(skip_serializing_if = "AlertMap::is_empty")]
    pub alerts: AlertMap,

    #[serde(flatten)]
    pub control_processor: ControlProcessorFields,
    #[serde(flatten)]
    pub display: DisplayFields,
    #[serde(flatten)]
    pub audio: AudioFields,
    #[serde(flatten)]
    pub microphone: MicrophoneFields,
    #[serde(flatten)]
    pub via: ViaFields,
    #[serde(flatten)]
    pub linux_host: LinuxHostFields,
    #[serde(flatten)]
    pub dmps: DmpsFields,
    #[serde(flatten)]
    pub meta: MetaLinks,

    #[serde(skip_serializing_if = "FieldClock::is_empty")]
    pub field_clock: FieldClock,
}

impl DeviceState {
    /// Empty state for a device seen for the first time.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self { device_id: device_id.into(), ..Default::default() }
    }
}

/// Current known state of one room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomState {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub building_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerting: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub power: String,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_user_input: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_state_received: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub meta: MetaLinks,
    #[serde(skip_serializing_if = "FieldClock::is_empty")]
    pub field_clock: FieldClock,
}

impl RoomState {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_clock_is_newer() {
        let t1 = datetime!(2024-03-01 10:00 UTC);
        let t2 = datetime!(2024-03-01 10:05 UTC);
        let older = FieldClock::new().with("power", t1);
        let newer = FieldClock::new().with("power", t2);

        assert!(newer.is_newer("power", &older));
        assert!(!older.is_newer("power", &newer));
        assert!(!older.is_newer("power", &older));
        assert!(newer.is_newer("power", &FieldClock::new()));
        assert!(!FieldClock::new().is_newer("power", &older));
    }

    #[test]
    fn test_clock_advance_keeps_later_entry() {
        let t1 = datetime!(2024-03-01 10:00 UTC);
        let t2 = datetime!(2024-03-01 10:05 UTC);
        let mut clock = FieldClock::new().with("power", t2).with("input", t1);
        clock.advance(&FieldClock::new().with("power", t1).with("input", t2).with("volume", t1));

        assert_eq!(clock.get("power"), Some(t2));
        assert_eq!(clock.get("input"), Some(t2));
        assert_eq!(clock.get("volume"), Some(t1));
        assert_eq!(clock.len(), 3);
    }

    #[test]
    fn test_device_state_wire_format_is_flat_and_sparse() {
        let mut state = DeviceState::new("ITB-1101-D1");
        state.display.power = "on".into();
        state.audio.volume = Some(0);
        state.field_clock.stamp("power", datetime!(2024-03-01 10:00 UTC));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["device_id"], "ITB-1101-D1");
        assert_eq!(json["power"], "on");
        assert_eq!(json["volume"], 0);
        assert_eq!(json["field_clock"]["power"], "2024-03-01T10:00:00Z");
        assert!(json.get("input").is_none());
        assert!(json.get("alerts").is_none());
        assert!(json.get("muted").is_none());
    }

    #[test]
    fn test_device_state_parses_partial_snapshot() {
        let json = serde_json::json!({
            "device_id": "ITB-1101-MIC1",
            "battery_charge_percentage": 42,
            "last_heartbeat": "2024-03-01T10:00:00Z",
            "tags": ["shure", "wireless"],
            "alerts": { "low-battery": { "alerting": true, "message": "below 20%" } },
            "field_clock": {
                "battery_charge_percentage": "2024-03-01T10:00:00Z",
                "alerts.low-battery": "2024-03-01T10:00:00Z"
            }
        });
        let state: DeviceState = serde_json::from_value(json).unwrap();

        assert_eq!(state.microphone.battery_charge_percentage, Some(42));
        assert_eq!(state.last_heartbeat, Some(datetime!(2024-03-01 10:00 UTC)));
        assert_eq!(state.tags.as_deref(), Some(&["shure".to_string(), "wireless".to_string()][..]));
        assert!(state.alerts["low-battery"].alerting);
        assert_eq!(
            state.field_clock.get(&alert_clock_key("low-battery")),
            Some(datetime!(2024-03-01 10:00 UTC))
        );
        assert_eq!(state.display.power, "");
    }

    #[test]
    fn test_room_state_round_trips_meta_links() {
        let mut room = RoomState::new("ITB-1101");
        room.building_id = "ITB".into();
        room.meta.control_link = "https://control.example/ITB-1101".into();

        let back: RoomState = serde_json::from_str(&serde_json::to_string(&room).unwrap()).unwrap();
        assert_eq!(back, room);
    }
}
