//! Per-value last-writer-wins primitives.
//!
//! A primitive only answers "does `incoming` supersede `base`"; clock gating is
//! layered on top by [`ClockGate`].

use crate::models::FieldClock;
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// A mergeable scalar value.
pub trait FieldValue: Clone {
    /// False when the producer did not report this value in the update.
    fn is_supplied(&self) -> bool;

    /// Value equality as seen by the merge.
    fn same_as(&self, other: &Self) -> bool;
}

impl FieldValue for String {
    fn is_supplied(&self) -> bool {
        !self.is_empty()
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

macro_rules! optional_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for Option<$ty> {
                fn is_supplied(&self) -> bool {
                    self.is_some()
                }

                fn same_as(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

optional_field_value!(bool, i64, f64);

/// Timestamps at or before the Unix epoch are producers' "zero time".
impl FieldValue for Option<OffsetDateTime> {
    fn is_supplied(&self) -> bool {
        matches!(self, Some(at) if *at > OffsetDateTime::UNIX_EPOCH)
    }

    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// Tags compare by membership only: order and repetition are ignored.
impl FieldValue for Option<Vec<String>> {
    fn is_supplied(&self) -> bool {
        self.is_some()
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => {
                a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
            }
            (None, None) => true,
            _ => false,
        }
    }
}

/// Result of merging one value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMerge<T> {
    /// `Some(incoming)` when the value changed.
    pub diff: Option<T>,
    pub merged: T,
    pub changed: bool,
}

/// Decides whether `incoming` replaces `base`.
///
/// An unsupplied incoming value never clears the base value.
pub fn merge_value<T: FieldValue>(base: &T, incoming: &T) -> FieldMerge<T> {
    if incoming.is_supplied() && !incoming.same_as(base) {
        FieldMerge { diff: Some(incoming.clone()), merged: incoming.clone(), changed: true }
    } else {
        FieldMerge { diff: None, merged: base.clone(), changed: false }
    }
}

/// Applies [`merge_value`] field by field, gated on the two clocks, and
/// accumulates the `changed` flag across all fields of one entity.
pub struct ClockGate<'a> {
    base_clock: &'a FieldClock,
    incoming_clock: &'a FieldClock,
    changed: bool,
}

impl<'a> ClockGate<'a> {
    pub fn new(base_clock: &'a FieldClock, incoming_clock: &'a FieldClock) -> Self {
        Self { base_clock, incoming_clock, changed: false }
    }

    /// True when the incoming clock entry for `key` is strictly after the base one.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.incoming_clock.is_newer(key, self.base_clock)
    }

    /// Merges one field. `diff` and `merged` are left untouched when the
    /// incoming entry is stale or the value did not change.
    pub fn field<T: FieldValue>(
        &mut self,
        key: &str,
        base: &T,
        incoming: &T,
        diff: &mut T,
        merged: &mut T,
    ) {
        if !self.is_fresh(key) {
            return;
        }
        let outcome = merge_value(base, incoming);
        if let Some(value) = outcome.diff {
            *diff = value;
        }
        *merged = outcome.merged;
        self.changed |= outcome.changed;
    }

    /// Folds a sub-merge result (e.g. the alert collection) into the accumulator.
    pub fn record(&mut self, changed: bool) {
        self.changed |= changed;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }
}
