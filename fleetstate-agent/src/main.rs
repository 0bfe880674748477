/**
 * FLEETSTATE AGENT - Reference snapshot producer
 *
 * Samples the local Linux host on a fixed interval and publishes a partial
 * device snapshot (linux_host fields + last_heartbeat) on the device-state
 * topic. Each reported field is stamped with the sampling instant.
 */

mod config;
mod metrics;
mod snapshot;

use anyhow::{Context, Result};
use config::AgentConfig;
use metrics::Sampler;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use time::OffsetDateTime;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AgentConfig::from_env().context("Failed to read agent configuration")?;
    info!(
        device_id = %cfg.identity.device_id,
        broker = %cfg.broker_host,
        interval = ?cfg.interval,
        "fleetstate agent starting"
    );

    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.broker_host, cfg.broker_port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("connected to broker"),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let mut sampler = Sampler::new();
    let mut ticker = interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let sampled_at = OffsetDateTime::now_utc();
        let state = snapshot::build_snapshot(&cfg.identity, &sampler.sample(), sampled_at);
        let payload = serde_json::to_vec(&snapshot::envelope(&cfg.identity, state))
            .context("Failed to encode snapshot")?;

        match client.publish(cfg.topic.as_str(), QoS::AtLeastOnce, false, payload).await {
            Ok(()) => debug!(topic = %cfg.topic, "snapshot published"),
            Err(e) => warn!(error = %e, "snapshot publish failed"),
        }
    }
}
