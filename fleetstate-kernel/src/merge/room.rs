//! Field-by-field merge of a [`RoomState`]. Rooms carry no alert collection.

use super::fields::ClockGate;
use super::MergeOutcome;
use crate::models::RoomState;

macro_rules! room_fields {
    ($($key:literal => $($path:ident).+;)*) => {
        /// Clock keys understood by [`merge_room_state`].
        pub const ROOM_FIELDS: &[&str] = &[$($key),*];

        fn merge_scalar_fields(
            gate: &mut ClockGate<'_>,
            base: &RoomState,
            incoming: &RoomState,
            diff: &mut RoomState,
            merged: &mut RoomState,
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

room_fields! {
    "building_id" => building_id;
    "room_id" => room_id;
    "suppress_notifications" => suppress_notifications;
    "alerting" => alerting;
    "power" => power;
    "last_heartbeat" => last_heartbeat;
    "last_user_input" => last_user_input;
    "last_state_received" => last_state_received;
    "control_link" => meta.control_link;
    "enable_notifications_link" => meta.enable_notifications_link;
    "suppress_notifications_link" => meta.suppress_notifications_link;
    "view_dashboard_link" => meta.view_dashboard_link;
}

/// Folds a partial room update into the stored state. Same rules as
/// [`super::merge_device_state`].
pub fn merge_room_state(base: &RoomState, incoming: &RoomState) -> MergeOutcome<RoomState> {
    let mut diff = RoomState::default();
    let mut merged = base.clone();

    if incoming.field_clock.is_empty() {
        return MergeOutcome { diff, merged, changed: false };
    }

    let mut gate = ClockGate::new(&base.field_clock, &incoming.field_clock);
    merge_scalar_fields(&mut gate, base, incoming, &mut diff, &mut merged);

    let changed = gate.changed();
    merged.field_clock.advance(&incoming.field_clock);

    MergeOutcome { diff, merged, changed }
}
