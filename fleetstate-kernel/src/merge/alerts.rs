//! Merge of a device's keyed alert collection.

use super::MergeOutcome;
use crate::models::{alert_clock_key, AlertMap, AlertRecord, FieldClock};

/// Merges `incoming` alerts into `base`.
///
/// - an alert unknown to `base` is inserted
/// - a known alert is only considered when its `alerts.<id>` clock entry is
///   strictly newer, and then replaced wholesale by the incoming record
/// - alerts only present in `base` are kept and never reported in the diff
pub fn merge_alerts(
    base: &AlertMap,
    incoming: &AlertMap,
    base_clock: &FieldClock,
    incoming_clock: &FieldClock,
) -> MergeOutcome<AlertMap> {
    let mut diff = AlertMap::new();
    let mut merged = base.clone();
    let mut changed = false;

    for (id, record) in incoming {
        let Some(current) = base.get(id) else {
            diff.insert(id.clone(), record.clone());
            merged.insert(id.clone(), record.clone());
            changed = true;
            continue;
        };

        if !incoming_clock.is_newer(&alert_clock_key(id), base_clock) {
            continue;
        }

        if record_differs(current, record) {
            diff.insert(id.clone(), record.clone());
            changed = true;
        }
        merged.insert(id.clone(), record.clone());
    }

    MergeOutcome { diff, merged, changed }
}

fn record_differs(base: &AlertRecord, incoming: &AlertRecord) -> bool {
    base.alerting != incoming.alerting
        || base.alert_sent != incoming.alert_sent
        || base.message != incoming.message
}
