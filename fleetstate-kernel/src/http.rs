/**
 * HTTP API - Read access to merged state, snapshot ingest over REST
 *
 * ROUTES:
 * - GET  /health, /system/health
 * - GET  /devices, /devices/{id}, /rooms, /rooms/{id}   stored merged state
 * - POST /devices/{id}, /rooms/{id}                      partial snapshot in,
 *                                                        `{ changed, diff }` out
 *
 * POST goes through the same `Ingestor` as MQTT, so per-entity ordering and
 * persistence rules are identical whatever the entry point.
 */

use crate::health::KernelHealth;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::models::{DeviceState, RoomState};
use crate::store::StateStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse<T> {
    pub changed: bool,
    pub diff: T,
}

impl<T> From<IngestOutcome<T>> for IngestResponse<T> {
    fn from(outcome: IngestOutcome<T>) -> Self {
        Self { changed: outcome.changed, diff: outcome.diff }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/devices", get(list_devices))
        .route("/devices/{id}", get(get_device).post(post_device))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{id}", get(get_room).post(post_room))
        .with_state(app_state)
}

async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    let ingestor = &app.ingestor;
    Json(ingestor.health().snapshot(ingestor.devices().count(), ingestor.rooms().count()))
}

// GET /devices
async fn list_devices(State(app): State<AppState>) -> Result<Json<Vec<DeviceState>>, StatusCode> {
    list_all(app.ingestor.devices().as_ref()).map(Json)
}

// GET /devices/{id}
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceState>, StatusCode> {
    load_one(app.ingestor.devices().as_ref(), &id).map(Json)
}

// POST /devices/{id}
async fn post_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(incoming): Json<DeviceState>,
) -> Result<Json<IngestResponse<DeviceState>>, StatusCode> {
    match app.ingestor.apply_device(&id, &incoming) {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            error!(id, error = %e, "device snapshot rejected");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /rooms
async fn list_rooms(State(app): State<AppState>) -> Result<Json<Vec<RoomState>>, StatusCode> {
    list_all(app.ingestor.rooms().as_ref()).map(Json)
}

// GET /rooms/{id}
async fn get_room(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomState>, StatusCode> {
    load_one(app.ingestor.rooms().as_ref(), &id).map(Json)
}

// POST /rooms/{id}
async fn post_room(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(incoming): Json<RoomState>,
) -> Result<Json<IngestResponse<RoomState>>, StatusCode> {
    match app.ingestor.apply_room(&id, &incoming) {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            error!(id, error = %e, "room snapshot rejected");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn list_all<T>(store: &dyn StateStore<T>) -> Result<Vec<T>, StatusCode> {
    store.list().map_err(|e| {
        error!(error = %e, "store listing failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn load_one<T>(store: &dyn StateStore<T>, id: &str) -> Result<T, StatusCode> {
    match store.load(id) {
        Ok(Some(state)) => Ok(state),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(id, error = %e, "store read failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTracker;
    use crate::ingest::NullSink;
    use crate::models::FieldClock;
    use crate::store::MemoryStore;
    use time::macros::datetime;

    fn app() -> AppState {
        let ingestor = Ingestor::new(
            Arc::new(MemoryStore::<DeviceState>::new()),
            Arc::new(MemoryStore::<RoomState>::new()),
            Arc::new(NullSink),
            HealthTracker::new(),
        );
        AppState { ingestor: Arc::new(ingestor) }
    }

    fn display_power(value: &str) -> DeviceState {
        let mut state = DeviceState::default();
        state.display.power = value.into();
        state.field_clock = FieldClock::new().with("power", datetime!(2024-03-01 10:00 UTC));
        state
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let result = get_device(State(app()), Path("ITB-1101-D1".to_string())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_then_get_device() {
        let app = app();

        let device = Path("ITB-1101-D1".to_string());
        let Json(response) =
            post_device(State(app.clone()), device, Json(display_power("on"))).await.unwrap();
        assert!(response.changed);
        assert_eq!(response.diff.display.power, "on");

        let Json(stored) =
            get_device(State(app.clone()), Path("ITB-1101-D1".to_string())).await.unwrap();
        assert_eq!(stored.device_id, "ITB-1101-D1");
        assert_eq!(stored.display.power, "on");

        let Json(all) = list_devices(State(app)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_post_reports_unchanged() {
        let app = app();
        let id = || Path("ITB-1101-D1".to_string());

        let Json(first) =
            post_device(State(app.clone()), id(), Json(display_power("on"))).await.unwrap();
        assert!(first.changed);
        let Json(response) =
            post_device(State(app.clone()), id(), Json(display_power("on"))).await.unwrap();
        assert!(!response.changed);

        let Json(health) = get_system_health(State(app)).await;
        assert_eq!(health.merges_applied, 2);
        assert_eq!(health.merges_unchanged, 1);
        assert_eq!(health.devices_tracked, 1);
    }

    #[tokio::test]
    async fn test_post_room() {
        let app = app();
        let mut incoming = RoomState::default();
        incoming.power = "standby".into();
        incoming.field_clock = FieldClock::new().with("power", datetime!(2024-03-01 10:00 UTC));

        let room = Path("ITB-1101".to_string());
        let Json(response) = post_room(State(app.clone()), room, Json(incoming)).await.unwrap();
        assert!(response.changed);

        let Json(rooms) = list_rooms(State(app.clone())).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].power, "standby");
        assert!(get_room(State(app), Path("ITB-9999".to_string())).await.is_err());
    }
}
