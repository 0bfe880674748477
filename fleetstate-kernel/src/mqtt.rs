/**
 * MQTT TRANSPORT - Snapshots in, deltas out
 *
 * INBOUND: `{ "id": "<entity id>", "state": { ...partial state + field_clock } }`
 * on the device / room state topics. Payloads that do not parse are logged and
 * dropped; no schema validation beyond that.
 *
 * OUTBOUND: every `StateDelta` produced by the ingest pipeline is published as
 * JSON on the matching delta topic.
 */

use crate::config::{KernelConfig, TopicsConf};
use crate::health::HealthTracker;
use crate::ingest::{DiffSink, Ingestor, SinkError, StateDelta};
use crate::models::{DeviceState, RoomState};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Wire envelope of one partial snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope<T> {
    pub id: String,
    pub state: T,
}

pub fn decode_device_message(
    payload: &[u8],
) -> Result<SnapshotEnvelope<DeviceState>, serde_json::Error> {
    serde_json::from_slice(payload)
}

pub fn decode_room_message(
    payload: &[u8],
) -> Result<SnapshotEnvelope<RoomState>, serde_json::Error> {
    serde_json::from_slice(payload)
}

pub fn create_mqtt_client(cfg: &KernelConfig) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(&cfg.mqtt.client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs));
    AsyncClient::new(opts, 64)
}

/// Publishes deltas without waiting for the broker.
pub struct MqttDiffSink {
    client: AsyncClient,
    device_topic: String,
    room_topic: String,
}

impl MqttDiffSink {
    pub fn new(client: AsyncClient, topics: &TopicsConf) -> Self {
        Self {
            client,
            device_topic: topics.device_delta.clone(),
            room_topic: topics.room_delta.clone(),
        }
    }
}

impl DiffSink for MqttDiffSink {
    fn forward(&self, delta: &StateDelta) -> Result<(), SinkError> {
        let topic = match delta {
            StateDelta::Device { .. } => &self.device_topic,
            StateDelta::Room { .. } => &self.room_topic,
        };
        let payload = serde_json::to_vec(delta)?;
        self.client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}

/// Routes one inbound publish to the ingest pipeline.
///
/// Returns `Some(changed)` when a snapshot was applied, `None` when the message
/// was dropped (unknown topic, malformed payload, store failure).
pub fn handle_publish(
    ingestor: &Ingestor,
    topics: &TopicsConf,
    topic: &str,
    payload: &[u8],
) -> Option<bool> {
    let applied = if topic == topics.device_state {
        let envelope = match decode_device_message(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(topic, error = %e, "malformed device snapshot dropped");
                return None;
            }
        };
        ingestor.apply_device(&envelope.id, &envelope.state).map(|o| o.changed)
    } else if topic == topics.room_state {
        let envelope = match decode_room_message(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(topic, error = %e, "malformed room snapshot dropped");
                return None;
            }
        };
        ingestor.apply_room(&envelope.id, &envelope.state).map(|o| o.changed)
    } else {
        debug!(topic, "ignoring message on unrelated topic");
        return None;
    };

    match applied {
        Ok(changed) => Some(changed),
        Err(e) => {
            error!(topic, error = %e, "snapshot could not be applied");
            None
        }
    }
}

/// Drives the MQTT event loop: (re)subscribes on every connection and feeds
/// inbound snapshots to the ingest pipeline, one message at a time.
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: TopicsConf,
    ingestor: Arc<Ingestor>,
    health: HealthTracker,
) -> task::JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    for topic in [&topics.device_state, &topics.room_state] {
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            error!(topic = %topic, error = %e, "subscribe failed");
                        }
                    }
                    info!(
                        device = %topics.device_state,
                        room = %topics.room_state,
                        "subscribed to snapshot topics"
                    );
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    handle_publish(&ingestor, &topics, &p.topic, &p.payload);
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    health.mark_mqtt_disconnected();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
