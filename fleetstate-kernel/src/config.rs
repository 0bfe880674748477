use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Environment variable pointing at the YAML configuration file.
pub const CONFIG_ENV: &str = "FLEETSTATE_CONFIG";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub mqtt: MqttConf,
    pub topics: TopicsConf,
    pub storage: StorageConf,
    pub http: HttpConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TopicsConf {
    pub device_state: String,
    pub room_state: String,
    pub device_delta: String,
    pub room_delta: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConf {
    pub data_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "fleetstate-kernel".into(),
            keep_alive_secs: 15,
        }
    }
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self {
            device_state: "fleet/devices/state@v1".into(),
            room_state: "fleet/rooms/state@v1".into(),
            device_delta: "fleet/devices/delta@v1".into(),
            room_delta: "fleet/rooms/delta@v1".into(),
        }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data") }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl StorageConf {
    pub fn devices_path(&self) -> PathBuf {
        self.data_dir.join("devices.json")
    }

    pub fn rooms_path(&self) -> PathBuf {
        self.data_dir.join("rooms.json")
    }
}

/// Loads the configuration file named by `FLEETSTATE_CONFIG` (default
/// `fleetstate.yaml`). A missing, empty or invalid file yields the defaults.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "fleetstate.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        info!(path = %path.display(), "no configuration file, using defaults");
        return KernelConfig::default();
    }

    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read configuration, using defaults");
            return KernelConfig::default();
        }
    };
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }

    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid configuration, using defaults");
        KernelConfig::default()
    })
}
