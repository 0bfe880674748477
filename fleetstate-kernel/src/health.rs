use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub rooms_tracked: u32,
    pub merges_applied: u64,
    pub merges_changed: u64,
    pub merges_unchanged: u64,
    pub store_errors: u64,
    pub sink_errors: u64,
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Default)]
struct Counters {
    merges_applied: AtomicU64,
    merges_changed: AtomicU64,
    store_errors: AtomicU64,
    sink_errors: AtomicU64,
    mqtt_reconnects: AtomicU32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn record_merge(&self, changed: bool) {
        self.counters.merges_applied.fetch_add(1, Ordering::Relaxed);
        if changed {
            self.counters.merges_changed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_store_error(&self) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.counters.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    /// Point-in-time view; entity counts come from the stores.
    pub fn snapshot(&self, devices_tracked: usize, rooms_tracked: usize) -> KernelHealth {
        let applied = self.counters.merges_applied.load(Ordering::Relaxed);
        let changed = self.counters.merges_changed.load(Ordering::Relaxed);

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: devices_tracked as u32,
            rooms_tracked: rooms_tracked as u32,
            merges_applied: applied,
            merges_changed: changed,
            merges_unchanged: applied.saturating_sub(changed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            sink_errors: self.counters.sink_errors.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.counters.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    let kb = line.split_whitespace().nth(1).and_then(|s| s.parse::<u64>().ok());
                    if let Some(kb) = kb {
                        return (kb as f32) / 1024.0;
                    }
                }
            }
        }
    }

    0.0
}
