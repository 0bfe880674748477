/*!
Snapshot envelopes as producers publish them.

A builder accumulates field values and stamps the field clock for each one,
then renders `{ "id": ..., "state": { ...fields, "field_clock": {...} } }`.
Clock entries can also be written without a value, which is how a producer
re-asserts an absent field.
*/

use crate::clock::at;
use anyhow::Result;
use serde_json::{json, Map, Value};

pub const DEVICE_STATE_TOPIC: &str = "fleet/devices/state@v1";
pub const ROOM_STATE_TOPIC: &str = "fleet/rooms/state@v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Device,
    Room,
}

/// Builder for one partial snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    kind: Kind,
    id: String,
    fields: Map<String, Value>,
    alerts: Map<String, Value>,
    clock: Map<String, Value>,
}

impl SnapshotBuilder {
    pub fn device<S: Into<String>>(id: S) -> Self {
        Self::new(Kind::Device, id.into())
    }

    pub fn room<S: Into<String>>(id: S) -> Self {
        Self::new(Kind::Room, id.into())
    }

    fn new(kind: Kind, id: String) -> Self {
        Self {
            kind,
            id,
            fields: Map::new(),
            alerts: Map::new(),
            clock: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Topic this snapshot is published on.
    pub fn topic(&self) -> &'static str {
        match self.kind {
            Kind::Device => DEVICE_STATE_TOPIC,
            Kind::Room => ROOM_STATE_TOPIC,
        }
    }

    /// Sets a field and stamps it `offset_secs` after the reference instant.
    pub fn set_field<S: Into<String>>(mut self, field: S, value: Value, offset_secs: i64) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), value);
        self.stamp(field, offset_secs)
    }

    pub fn set_string<S: Into<String>, V: Into<String>>(
        self,
        field: S,
        value: V,
        offset_secs: i64,
    ) -> Self {
        self.set_field(field, Value::String(value.into()), offset_secs)
    }

    pub fn set_bool<S: Into<String>>(self, field: S, value: bool, offset_secs: i64) -> Self {
        self.set_field(field, Value::Bool(value), offset_secs)
    }

    pub fn set_number<S: Into<String>>(self, field: S, value: f64, offset_secs: i64) -> Self {
        self.set_field(field, Value::from(value), offset_secs)
    }

    pub fn set_integer<S: Into<String>>(self, field: S, value: i64, offset_secs: i64) -> Self {
        self.set_field(field, Value::from(value), offset_secs)
    }

    /// Sets a timestamp-valued field (e.g. `last_heartbeat`).
    pub fn set_time<S: Into<String>>(
        self,
        field: S,
        value_offset_secs: i64,
        offset_secs: i64,
    ) -> Self {
        self.set_field(field, Value::String(at(value_offset_secs).to_rfc3339()), offset_secs)
    }

    pub fn set_tags(self, tags: &[&str], offset_secs: i64) -> Self {
        let tags = tags.iter().map(|t| Value::String(t.to_string())).collect();
        self.set_field("tags", Value::Array(tags), offset_secs)
    }

    /// Writes a clock entry only.
    pub fn stamp<S: Into<String>>(mut self, field: S, offset_secs: i64) -> Self {
        self.clock.insert(field.into(), Value::String(at(offset_secs).to_rfc3339()));
        self
    }

    /// Adds a named alert and stamps `alerts.<alert_id>`.
    pub fn alert<S: Into<String>, M: Into<String>>(
        mut self,
        alert_id: S,
        alerting: bool,
        message: M,
        offset_secs: i64,
    ) -> Self {
        let alert_id = alert_id.into();
        self.alerts.insert(
            alert_id.clone(),
            json!({
                "alerting": alerting,
                "alert_sent": at(offset_secs).to_rfc3339(),
                "message": message.into(),
            }),
        );
        self.stamp(format!("alerts.{alert_id}"), offset_secs)
    }

    /// The `state` object alone, as POSTed to the HTTP API.
    pub fn state(&self) -> Value {
        let mut state = self.fields.clone();
        if !self.alerts.is_empty() {
            state.insert("alerts".into(), Value::Object(self.alerts.clone()));
        }
        state.insert("field_clock".into(), Value::Object(self.clock.clone()));
        Value::Object(state)
    }

    /// Full MQTT envelope.
    pub fn build(&self) -> Value {
        json!({ "id": self.id, "state": self.state() })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.build())?)
    }
}

/// Looks up a dotted path (`diff.alerts.hdmi.message`) in a JSON document.
pub fn field_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(obj) => obj.get(part),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::rfc3339;

    #[test]
    fn test_device_envelope_shape() {
        let snapshot = SnapshotBuilder::device("ITB-1101-D1")
            .set_string("power", "on", 5)
            .set_bool("blanked", false, 5)
            .stamp("input", 4);

        let envelope = snapshot.build();
        assert_eq!(snapshot.topic(), DEVICE_STATE_TOPIC);
        assert_eq!(envelope["id"], "ITB-1101-D1");
        assert_eq!(envelope["state"]["power"], "on");
        assert_eq!(envelope["state"]["blanked"], false);
        assert!(envelope["state"].get("input").is_none());
        assert_eq!(envelope["state"]["field_clock"]["power"], rfc3339(5));
        assert_eq!(envelope["state"]["field_clock"]["input"], rfc3339(4));
    }

    #[test]
    fn test_alerts_are_stamped_under_their_prefix() {
        let state = SnapshotBuilder::device("ITB-1101-D1")
            .alert("lamp", true, "lamp hours exceeded", 7)
            .state();

        assert_eq!(field_at(&state, "alerts.lamp.alerting"), Some(&Value::Bool(true)));
        assert_eq!(state["field_clock"]["alerts.lamp"], rfc3339(7));
    }

    #[test]
    fn test_room_topic() {
        let snapshot = SnapshotBuilder::room("ITB-1101").set_string("power", "standby", 0);
        assert_eq!(snapshot.topic(), ROOM_STATE_TOPIC);
        assert_eq!(snapshot.id(), "ITB-1101");
        assert!(snapshot.to_bytes().unwrap().starts_with(b"{"));
    }

    #[test]
    fn test_field_at_misses() {
        let doc = json!({ "diff": { "power": "on" } });
        assert_eq!(field_at(&doc, "diff.power"), Some(&json!("on")));
        assert!(field_at(&doc, "diff.power.deeper").is_none());
        assert!(field_at(&doc, "diff.input").is_none());
    }
}
