//! Agent settings, read from `FLEETSTATE_AGENT_*` environment variables.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub topic: String,
    pub interval: Duration,
    pub identity: Identity,
}

/// Static identity fields reported with every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub device_id: String,
    pub hostname: String,
    pub building_id: String,
    pub room_id: String,
    pub device_type: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        Self::from_lookup(hostname, |key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `hostname` seeds the defaults.
    pub fn from_lookup<F>(hostname: String, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("FLEETSTATE_AGENT_{name}")).filter(|v| !v.trim().is_empty())
        };

        let broker_port = match var("BROKER_PORT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid FLEETSTATE_AGENT_BROKER_PORT: {v}"))?,
            None => 1883,
        };
        let interval_secs: u64 = match var("INTERVAL_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid FLEETSTATE_AGENT_INTERVAL_SECS: {v}"))?,
            None => 30,
        };
        if interval_secs == 0 {
            anyhow::bail!("FLEETSTATE_AGENT_INTERVAL_SECS must be at least 1");
        }

        let device_id = var("DEVICE_ID").unwrap_or_else(|| hostname.clone());

        Ok(Self {
            broker_host: var("BROKER_HOST").unwrap_or_else(|| "localhost".into()),
            broker_port,
            client_id: var("CLIENT_ID").unwrap_or_else(|| format!("fleetstate-agent-{device_id}")),
            keep_alive_secs: 30,
            topic: var("TOPIC").unwrap_or_else(|| "fleet/devices/state@v1".into()),
            interval: Duration::from_secs(interval_secs),
            identity: Identity {
                device_id,
                hostname,
                building_id: var("BUILDING_ID").unwrap_or_default(),
                room_id: var("ROOM_ID").unwrap_or_default(),
                device_type: var("DEVICE_TYPE").unwrap_or_else(|| "linux_host".into()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AgentConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AgentConfig::from_lookup("lab-pc-07".into(), |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_from_hostname() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.identity.device_id, "lab-pc-07");
        assert_eq!(cfg.client_id, "fleetstate-agent-lab-pc-07");
        assert_eq!(cfg.broker_port, 1883);
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert_eq!(cfg.identity.device_type, "linux_host");
        assert!(cfg.identity.room_id.is_empty());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("FLEETSTATE_AGENT_DEVICE_ID", "ITB-1101-CP1"),
            ("FLEETSTATE_AGENT_ROOM_ID", "ITB-1101"),
            ("FLEETSTATE_AGENT_BROKER_HOST", "broker.lan"),
            ("FLEETSTATE_AGENT_INTERVAL_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(cfg.identity.device_id, "ITB-1101-CP1");
        assert_eq!(cfg.identity.hostname, "lab-pc-07");
        assert_eq!(cfg.identity.room_id, "ITB-1101");
        assert_eq!(cfg.broker_host, "broker.lan");
        assert_eq!(cfg.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(config(&[("FLEETSTATE_AGENT_BROKER_PORT", "mqtt")]).is_err());
        assert!(config(&[("FLEETSTATE_AGENT_INTERVAL_SECS", "0")]).is_err());
    }
}
