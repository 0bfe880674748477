//! Turns a host sample into a partial `DeviceState`.
//!
//! Only the fields actually reported get a clock entry, all stamped with the
//! sampling instant, so missing readings never overwrite stored values.

use crate::config::Identity;
use crate::metrics::HostSample;
use fleetstate_kernel::models::DeviceState;
use fleetstate_kernel::mqtt::SnapshotEnvelope;
use time::OffsetDateTime;

pub fn build_snapshot(
    identity: &Identity,
    sample: &HostSample,
    sampled_at: OffsetDateTime,
) -> DeviceState {
    let mut state = DeviceState::new(identity.device_id.clone());
    let mut reported: Vec<&'static str> = vec!["device_id", "last_heartbeat"];

    state.last_heartbeat = Some(sampled_at);

    text("hostname", &mut state.hostname, &identity.hostname, &mut reported);
    text("building_id", &mut state.building_id, &identity.building_id, &mut reported);
    text("room_id", &mut state.room_id, &identity.room_id, &mut reported);
    text("device_type", &mut state.device_type, &identity.device_type, &mut reported);
    text(
        "os_version",
        &mut state.linux_host.os_version,
        sample.os_version.as_deref().unwrap_or_default(),
        &mut reported,
    );
    text(
        "kernel_version",
        &mut state.linux_host.kernel_version,
        sample.kernel_version.as_deref().unwrap_or_default(),
        &mut reported,
    );

    let host = &mut state.linux_host;
    for (key, slot, value) in [
        ("cpu_usage_percent", &mut host.cpu_usage_percent, sample.cpu_usage_percent),
        ("memory_usage_percent", &mut host.memory_usage_percent, sample.memory_usage_percent),
        ("swap_usage_percent", &mut host.swap_usage_percent, sample.swap_usage_percent),
        ("disk_usage_percent", &mut host.disk_usage_percent, sample.disk_usage_percent),
        ("load_average_1m", &mut host.load_average_1m, sample.load_average_1m),
        (
            "cpu_temperature_celsius",
            &mut host.cpu_temperature_celsius,
            sample.cpu_temperature_celsius,
        ),
    ] {
        if value.is_some() {
            *slot = value;
            reported.push(key);
        }
    }
    for (key, slot, value) in [
        ("host_uptime_seconds", &mut host.host_uptime_seconds, sample.uptime_seconds),
        ("process_count", &mut host.process_count, sample.process_count),
    ] {
        if value.is_some() {
            *slot = value;
            reported.push(key);
        }
    }

    for key in reported {
        state.field_clock.stamp(key, sampled_at);
    }
    state
}

fn text(key: &'static str, slot: &mut String, value: &str, reported: &mut Vec<&'static str>) {
    if !value.is_empty() {
        *slot = value.to_string();
        reported.push(key);
    }
}

pub fn envelope(identity: &Identity, state: DeviceState) -> SnapshotEnvelope<DeviceState> {
    SnapshotEnvelope { id: identity.device_id.clone(), state }
}
