/*!
# Fleetstate DevKit - Test tooling for snapshot producers and consumers

- Builders for wire-format snapshot envelopes with their field clocks
- Fixed reference instants so tests read as "t+5s beats t+3s"
- Lookup helpers over published deltas
*/

pub mod clock;
pub mod snapshot;

pub use clock::{at, rfc3339};
pub use snapshot::{field_at, SnapshotBuilder, DEVICE_STATE_TOPIC, ROOM_STATE_TOPIC};
