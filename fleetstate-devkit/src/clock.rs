/*!
Reference instants for tests.

Every helper is an offset from one fixed instant, 2024-03-01T10:00:00Z, so
fixtures stay deterministic and ordering is obvious from the offset alone.
*/

use chrono::{DateTime, Duration, TimeZone, Utc};

const REFERENCE_UNIX_SECONDS: i64 = 1_709_287_200;

/// Reference instant shifted by `offset_secs` (may be negative).
pub fn at(offset_secs: i64) -> DateTime<Utc> {
    let reference = Utc
        .timestamp_opt(REFERENCE_UNIX_SECONDS, 0)
        .single()
        .unwrap_or_default();
    reference + Duration::seconds(offset_secs)
}

/// Same instant as [`at`], formatted the way field clocks carry it.
pub fn rfc3339(offset_secs: i64) -> String {
    at(offset_secs).to_rfc3339()
}
