use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::settings::Settings;
use crate::slots;

/// The oldest pending slot that has outlived the reminder threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleSlot {
    pub key: String,
    pub age_minutes: i64,
}

/// Evaluate the oldest stale pending slot, if any.
///
/// Only same-day slots qualify: a pending key from a previous calendar day is
/// ordinary backlog, surfaced by the rebuild rather than escalated here. The
/// threshold falls back to twice the slot length when unset.
pub fn compute_stale_slot(
    pending: &BTreeSet<String>,
    now: NaiveDateTime,
    settings: &Settings,
) -> Option<StaleSlot> {
    let oldest = pending.iter().next()?;

    let threshold = if settings.stale_threshold_minutes > 0 {
        settings.stale_threshold_minutes
    } else {
        2 * slots::slot_minutes(settings)
    };
    if threshold == 0 {
        return None;
    }

    let slot_start = slots::parse_slot_key(oldest)?;
    if slot_start.date() != now.date() {
        return None;
    }

    let age_minutes = (now - slot_start).num_minutes();
    if age_minutes > i64::from(threshold) {
        Some(StaleSlot {
            key: oldest.clone(),
            age_minutes,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(threshold: u32) -> Settings {
        Settings {
            stale_threshold_minutes: threshold,
            ..Settings::default()
        }
    }

    fn pending(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn empty_queue_is_never_stale() {
        let result = compute_stale_slot(&pending(&[]), dt("2025-11-04T10:00:00"), &settings(20));
        assert_eq!(result, None);
    }

    #[test]
    fn age_below_threshold_is_not_stale() {
        let result = compute_stale_slot(
            &pending(&["2025-11-04T09:30"]),
            dt("2025-11-04T10:00:00"),
            &settings(60),
        );
        assert_eq!(result, None);
    }

    #[test]
    fn detects_oldest_slot_over_threshold() {
        let result = compute_stale_slot(
            &pending(&["2025-11-04T09:45", "2025-11-04T09:30"]),
            dt("2025-11-04T10:00:00"),
            &settings(20),
        );
        assert_eq!(
            result,
            Some(StaleSlot {
                key: "2025-11-04T09:30".into(),
                age_minutes: 30,
            })
        );
    }

    #[test]
    fn previous_day_backlog_is_ignored() {
        let result = compute_stale_slot(
            &pending(&["2025-11-04T15:00"]),
            dt("2025-11-05T09:00:00"),
            &settings(20),
        );
        assert_eq!(result, None);
    }

    #[test]
    fn zero_threshold_falls_back_to_twice_slot_length() {
        // 15-minute slots: threshold resolves to 30.
        let result = compute_stale_slot(
            &pending(&["2025-11-04T09:30"]),
            dt("2025-11-04T10:00:00"),
            &settings(0),
        );
        assert_eq!(result, None); // age 30 is not > 30

        let result = compute_stale_slot(
            &pending(&["2025-11-04T09:30"]),
            dt("2025-11-04T10:01:00"),
            &settings(0),
        );
        assert_eq!(result.unwrap().age_minutes, 31);
    }

    #[test]
    fn unparseable_key_is_ignored() {
        let result = compute_stale_slot(
            &pending(&["not-a-slot-key"]),
            dt("2025-11-04T10:00:00"),
            &settings(20),
        );
        assert_eq!(result, None);
    }
}
