//! Field-by-field merge of a [`DeviceState`].

use super::alerts::merge_alerts;
use super::fields::ClockGate;
use super::MergeOutcome;
use crate::models::DeviceState;

/// Declares the clock key of every mergeable device field next to its path in
/// the struct. The same table drives the key list and the merge.
macro_rules! device_fields {
    ($($key:literal => $($path:ident).+;)*) => {
        /// Clock keys understood by [`merge_device_state`]. The alert collection
        /// is gated separately under `alerts.<id>`.
        pub const DEVICE_FIELDS: &[&str] = &[$($key),*];

        fn merge_scalar_fields(
            gate: &mut ClockGate<'_>,
            base: &DeviceState,
            incoming: &DeviceState,
            diff: &mut DeviceState,
            merged: &mut DeviceState,
        ) {
            $(
                gate.field(
                    $key,
                    &base.$($path).+,
                    &incoming.$($path).+,
                    &mut diff.$($path).+,
                    &mut merged.$($path).+,
                );
            )*
        }
    };
}

device_fields! {
    "device_id" => device_id;
    "building_id" => building_id;
    "room_id" => room_id;
    "hostname" => hostname;
    "device_type" => device_type;
    "device_class" => device_class;
    "device_name" => device_name;
    "tags" => tags;
    "last_state_received" => last_state_received;
    "last_heartbeat" => last_heartbeat;
    "last_user_input" => last_user_input;
    "update_required" => update_required;
    "enable_notifications" => enable_notifications;
    "suppress_notifications" => suppress_notifications;
    "alerting" => alerting;

    "broadcast_address" => control_processor.broadcast_address;
    "default_gateway" => control_processor.default_gateway;
    "dhcp_enabled" => control_processor.dhcp_enabled;
    "firmware_version" => control_processor.firmware_version;
    "hardware_version" => control_processor.hardware_version;
    "ip_address" => control_processor.ip_address;
    "mac_address" => control_processor.mac_address;
    "model_name" => control_processor.model_name;
    "part_number" => control_processor.part_number;
    "serial_number" => control_processor.serial_number;
    "build_date" => control_processor.build_date;
    "protocol_version" => control_processor.protocol_version;
    "processor_uptime_seconds" => control_processor.processor_uptime_seconds;
    "websocket_status" => control_processor.websocket_status;
    "websocket_count" => control_processor.websocket_count;
    "status_message" => control_processor.status_message;
    "error_codes" => control_processor.error_codes;

    "power" => display.power;
    "input" => display.input;
    "blanked" => display.blanked;
    "active_signal" => display.active_signal;
    "lamp_hours" => display.lamp_hours;
    "temperature_celsius" => display.temperature_celsius;
    "error_status" => display.error_status;

    "volume" => audio.volume;
    "muted" => audio.muted;
    "audio_input" => audio.audio_input;
    "audio_output" => audio.audio_output;

    "battery_charge_bars" => microphone.battery_charge_bars;
    "battery_charge_minutes" => microphone.battery_charge_minutes;
    "battery_charge_percentage" => microphone.battery_charge_percentage;
    "battery_charge_hours_minutes" => microphone.battery_charge_hours_minutes;
    "battery_cycles" => microphone.battery_cycles;
    "battery_type" => microphone.battery_type;
    "microphone_channel" => microphone.microphone_channel;
    "interference" => microphone.interference;

    "current_user_count" => via.current_user_count;
    "presenter_count" => via.presenter_count;
    "media_session_count" => via.media_session_count;
    "via_version" => via.via_version;

    "cpu_usage_percent" => linux_host.cpu_usage_percent;
    "memory_usage_percent" => linux_host.memory_usage_percent;
    "swap_usage_percent" => linux_host.swap_usage_percent;
    "disk_usage_percent" => linux_host.disk_usage_percent;
    "load_average_1m" => linux_host.load_average_1m;
    "cpu_temperature_celsius" => linux_host.cpu_temperature_celsius;
    "host_uptime_seconds" => linux_host.host_uptime_seconds;
    "process_count" => linux_host.process_count;
    "os_version" => linux_host.os_version;
    "kernel_version" => linux_host.kernel_version;

    "dm_input_count" => dmps.dm_input_count;
    "dm_output_count" => dmps.dm_output_count;
    "input_sync" => dmps.input_sync;
    "hdcp_status" => dmps.hdcp_status;
    "dm_network_status" => dmps.dm_network_status;
    "fan_speed_rpm" => dmps.fan_speed_rpm;
    "front_panel_locked" => dmps.front_panel_locked;
    "chassis_temperature_celsius" => dmps.chassis_temperature_celsius;

    "control_link" => meta.control_link;
    "enable_notifications_link" => meta.enable_notifications_link;
    "suppress_notifications_link" => meta.suppress_notifications_link;
    "view_dashboard_link" => meta.view_dashboard_link;
}

/// Folds a partial device update into the stored state.
///
/// `base` and `incoming` are never modified: `merged` starts as a deep copy of
/// `base`. The returned diff only carries values that changed. The merged clock
/// holds, per key, the later of both clocks, including keys of fields this
/// version does not know about.
pub fn merge_device_state(base: &DeviceState, incoming: &DeviceState) -> MergeOutcome<DeviceState> {
    let mut diff = DeviceState::default();
    let mut merged = base.clone();

    if incoming.field_clock.is_empty() {
        return MergeOutcome { diff, merged, changed: false };
    }

    let mut gate = ClockGate::new(&base.field_clock, &incoming.field_clock);
    merge_scalar_fields(&mut gate, base, incoming, &mut diff, &mut merged);

    if !incoming.alerts.is_empty() {
        let alerts =
            merge_alerts(&base.alerts, &incoming.alerts, &base.field_clock, &incoming.field_clock);
        diff.alerts = alerts.diff;
        merged.alerts = alerts.merged;
        gate.record(alerts.changed);
    }

    let changed = gate.changed();
    merged.field_clock.advance(&incoming.field_clock);

    MergeOutcome { diff, merged, changed }
}
