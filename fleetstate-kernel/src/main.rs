/**
 * FLEETSTATE KERNEL - Service entry point
 *
 * Wires config, state stores, the ingest pipeline, the MQTT transport and the
 * HTTP API together. Snapshots arrive over MQTT or HTTP, deltas leave over MQTT.
 */

use anyhow::{Context, Result};
use fleetstate_kernel::config::load_config;
use fleetstate_kernel::health::HealthTracker;
use fleetstate_kernel::http::{build_router, AppState};
use fleetstate_kernel::ingest::Ingestor;
use fleetstate_kernel::models::{DeviceState, RoomState};
use fleetstate_kernel::mqtt::{create_mqtt_client, spawn_mqtt_listener, MqttDiffSink};
use fleetstate_kernel::store::{JsonFileStore, MemoryStore, StateStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config().await;
    info!(
        broker = %cfg.mqtt.host,
        port = cfg.mqtt.port,
        data_dir = %cfg.storage.data_dir.display(),
        "fleetstate kernel starting"
    );

    let devices = open_store::<DeviceState>(&cfg.storage.devices_path());
    let rooms = open_store::<RoomState>(&cfg.storage.rooms_path());
    let health = HealthTracker::new();

    let (client, eventloop) = create_mqtt_client(&cfg);
    let sink = Arc::new(MqttDiffSink::new(client.clone(), &cfg.topics));
    let ingestor = Arc::new(Ingestor::new(devices, rooms, sink, health.clone()));

    spawn_mqtt_listener(client, eventloop, cfg.topics.clone(), ingestor.clone(), health);

    let app = build_router(AppState { ingestor });
    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", cfg.http.bind))?;
    info!(bind = %cfg.http.bind, "HTTP API listening");

    axum::serve(listener, app).await.context("HTTP server stopped")?;
    Ok(())
}

/// Opens the file-backed store, falling back to an in-memory one so the
/// kernel keeps merging when the data directory is unusable.
fn open_store<T>(path: &Path) -> Arc<dyn StateStore<T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    match JsonFileStore::<T>::open(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "state file unusable, keeping state in memory only"
            );
            Arc::new(MemoryStore::<T>::new())
        }
    }
}
