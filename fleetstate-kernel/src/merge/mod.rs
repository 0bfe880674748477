/**
 * MERGE ENGINE - Per-field last-writer-wins reconciliation of partial snapshots
 *
 * ROLE: fold an incoming partial state into the stored state of the same entity,
 * producing the merged state plus a sparse diff of what actually changed.
 *
 * RULES:
 * - a field is only considered when its incoming clock entry is strictly newer
 * - an unsupplied incoming value (empty string, `None`, zero time) never clears
 * - the merged clock takes the later timestamp per key, changed or not
 *
 * The functions are pure: no I/O, no shared mutable state. Callers must still
 * serialize merges per entity ID, otherwise two merges against the same stale
 * base silently drop one of the updates (see `ingest`).
 */

pub mod alerts;
pub mod device;
pub mod fields;
pub mod room;

pub use alerts::merge_alerts;
pub use device::{merge_device_state, DEVICE_FIELDS};
pub use fields::{merge_value, ClockGate, FieldMerge, FieldValue};
pub use room::{merge_room_state, ROOM_FIELDS};

/// What a merge produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    /// Only the values that changed; everything else at its default.
    pub diff: T,
    /// Full state to persist.
    pub merged: T,
    pub changed: bool,
}
