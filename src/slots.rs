//! Pure slot-boundary math over local wall-clock time.
//!
//! Every function takes an explicit [`Settings`] snapshot so the math stays
//! referentially transparent; callers re-fetch the snapshot once per ticker
//! firing or queue rebuild so saved changes apply on the next computation.
//! Daylight-saving transitions are not corrected for: a transition day simply
//! has a shorter or longer apparent working window.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::settings::{Settings, DEFAULT_SLOT_MINUTES};

/// Format used for slot keys and for the day part of entry keys.
pub const SLOT_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Current slot granularity, falling back to the default when the stored
/// value is invalid. Read from the snapshot on every call, never cached.
pub fn slot_minutes(settings: &Settings) -> u32 {
    if settings.slot_minutes > 0 {
        settings.slot_minutes
    } else {
        DEFAULT_SLOT_MINUTES
    }
}

/// Parse an "HH:MM" wall-clock string; non-numeric components read as 0.
pub fn parse_hm(hm: &str) -> (u32, u32) {
    let mut parts = hm.splitn(2, ':');
    let h = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    let m = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    (h, m)
}

fn minute_of_day(t: NaiveDateTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Working window as minutes-of-day `(start, end)`.
pub fn work_window_minutes(settings: &Settings) -> (u32, u32) {
    let (sh, sm) = parse_hm(&settings.work_start);
    let (eh, em) = parse_hm(&settings.work_end);
    (sh * 60 + sm, eh * 60 + em)
}

pub fn is_workday_enabled(settings: &Settings, date: NaiveDate) -> bool {
    let bit = 1u32 << date.weekday().num_days_from_sunday();
    settings.weekdays_mask & bit != 0
}

/// True iff `at` falls on an enabled weekday inside `[work_start, work_end)`.
pub fn is_work_time(settings: &Settings, at: NaiveDateTime) -> bool {
    let (start, end) = work_window_minutes(settings);
    let mins = minute_of_day(at);
    is_workday_enabled(settings, at.date()) && mins >= start && mins < end
}

/// Start of the slot containing `at`: minute-of-day floored to the nearest
/// lower multiple of the granularity, seconds zeroed.
pub fn current_slot_start(settings: &Settings, at: NaiveDateTime) -> NaiveDateTime {
    let gran = i64::from(slot_minutes(settings));
    let floored = (i64::from(minute_of_day(at)) / gran) * gran;
    midnight(at.date()) + Duration::minutes(floored)
}

/// Start of the slot immediately preceding the slot containing `at`.
/// Holds as `current_slot_start(at - gran)` for any granularity.
pub fn previous_slot_start(settings: &Settings, at: NaiveDateTime) -> NaiveDateTime {
    let gran = i64::from(slot_minutes(settings));
    current_slot_start(settings, at - Duration::minutes(gran))
}

/// The next slot boundary strictly after the floor of `at`; used to schedule
/// the ticker's next wake. May cross midnight.
pub fn next_slot_boundary(settings: &Settings, at: NaiveDateTime) -> NaiveDateTime {
    let gran = i64::from(slot_minutes(settings));
    current_slot_start(settings, at) + Duration::minutes(gran)
}

/// Ordered slot starts covering `[work_start, work_end)` for `date`.
/// Empty when the weekday is disabled.
pub fn day_slots(settings: &Settings, date: NaiveDate) -> Vec<NaiveDateTime> {
    if !is_workday_enabled(settings, date) {
        return Vec::new();
    }
    let gran = i64::from(slot_minutes(settings));
    let (start, end) = work_window_minutes(settings);
    let mut slots = Vec::new();
    let mut t = i64::from(start);
    while t < i64::from(end) {
        slots.push(midnight(date) + Duration::minutes(t));
        t += gran;
    }
    slots
}

/// `YYYY-MM-DDTHH:MM` — lexicographic order coincides with chronological
/// order, which the stale detector relies on.
pub fn slot_key(at: NaiveDateTime) -> String {
    at.format(SLOT_KEY_FORMAT).to_string()
}

/// Inverse of [`slot_key`] (minute precision).
pub fn parse_slot_key(key: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(key, SLOT_KEY_FORMAT).ok()
}

/// Local calendar date string, the partition key for "today" comparisons.
pub fn to_local_date_ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).expect("midnight is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(gran: u32) -> Settings {
        Settings {
            slot_minutes: gran,
            ..Settings::default()
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn previous_slot_matches_spec_examples() {
        let s = settings(15);
        let prev = previous_slot_start(&s, dt("2025-11-03T10:30:00"));
        assert_eq!(slot_key(prev), "2025-11-03T10:15");

        let s = settings(30);
        let prev = previous_slot_start(&s, dt("2025-11-03T11:30:00"));
        assert_eq!(slot_key(prev), "2025-11-03T11:00");
    }

    #[test]
    fn previous_slot_is_current_slot_of_shifted_instant() {
        for gran in [5u32, 10, 15, 20, 30, 45, 60, 90] {
            let s = settings(gran);
            for probe in [
                "2025-11-03T00:00:00",
                "2025-11-03T00:07:13",
                "2025-11-03T09:59:59",
                "2025-11-03T10:00:00",
                "2025-11-03T12:34:56",
                "2025-11-03T23:59:59",
            ] {
                let t = dt(probe);
                let shifted = t - Duration::minutes(i64::from(gran));
                assert_eq!(
                    previous_slot_start(&s, t),
                    current_slot_start(&s, shifted),
                    "gran={gran} probe={probe}"
                );
            }
        }
    }

    #[test]
    fn slot_starts_snap_to_boundaries() {
        for gran in [5u32, 15, 30, 45] {
            let s = settings(gran);
            for probe in ["2025-11-03T10:37:42", "2025-11-03T00:01:01", "2025-11-03T23:59:59"] {
                let start = current_slot_start(&s, dt(probe));
                assert_eq!(start.second(), 0);
                assert_eq!(minute_of_day(start) % gran, 0, "gran={gran} probe={probe}");
                assert!(start <= dt(probe));
            }
        }
    }

    #[test]
    fn next_boundary_is_one_granularity_past_the_floor() {
        let s = settings(15);
        let next = next_slot_boundary(&s, dt("2025-11-03T10:37:42"));
        assert_eq!(slot_key(next), "2025-11-03T10:45");

        // At an exact boundary the next wake is a full slot away.
        let next = next_slot_boundary(&s, dt("2025-11-03T10:45:00"));
        assert_eq!(slot_key(next), "2025-11-03T11:00");
    }

    #[test]
    fn next_boundary_crosses_midnight() {
        let s = settings(15);
        let next = next_slot_boundary(&s, dt("2025-11-03T23:50:00"));
        assert_eq!(slot_key(next), "2025-11-04T00:00");
    }

    #[test]
    fn disabled_weekday_yields_no_slots() {
        // Mon-Fri mask; 2025-01-05 is a Sunday.
        let s = settings(15);
        assert!(!is_workday_enabled(&s, date("2025-01-05")));
        assert!(day_slots(&s, date("2025-01-05")).is_empty());
    }

    #[test]
    fn workday_slots_cover_the_window_strictly_increasing() {
        let s = settings(30);
        // 2025-11-03 is a Monday.
        let slots = day_slots(&s, date("2025-11-03"));
        assert_eq!(slots.len(), 16); // 08:00..16:00 at 30m
        assert_eq!(slot_key(slots[0]), "2025-11-03T08:00");
        assert_eq!(slot_key(*slots.last().unwrap()), "2025-11-03T15:30");
        for pair in slots.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        let (_, end) = work_window_minutes(&s);
        assert!(slots.iter().all(|t| minute_of_day(*t) < end));
    }

    #[test]
    fn work_time_excludes_window_end() {
        let s = settings(15);
        assert!(is_work_time(&s, dt("2025-11-03T08:00:00")));
        assert!(is_work_time(&s, dt("2025-11-03T15:59:59")));
        assert!(!is_work_time(&s, dt("2025-11-03T16:00:00")));
        assert!(!is_work_time(&s, dt("2025-11-03T07:59:59")));
        // Saturday is outside the default mask.
        assert!(!is_work_time(&s, dt("2025-11-08T10:00:00")));
    }

    #[test]
    fn slot_key_roundtrip() {
        let t = dt("2025-11-03T09:15:00");
        assert_eq!(slot_key(t), "2025-11-03T09:15");
        assert_eq!(parse_slot_key("2025-11-03T09:15"), Some(t));
        assert_eq!(parse_slot_key("junk"), None);
    }

    #[test]
    fn parse_hm_defaults_bad_components_to_zero() {
        assert_eq!(parse_hm("08:30"), (8, 30));
        assert_eq!(parse_hm("x:30"), (0, 30));
        assert_eq!(parse_hm("8"), (8, 0));
        assert_eq!(parse_hm(""), (0, 0));
    }

    #[test]
    fn zero_granularity_snapshot_falls_back_to_default() {
        // Normalization should prevent this, but the math must not divide by
        // zero if a raw snapshot slips through.
        let s = settings(0);
        assert_eq!(slot_minutes(&s), DEFAULT_SLOT_MINUTES);
        let start = current_slot_start(&s, dt("2025-11-03T10:37:42"));
        assert_eq!(slot_key(start), "2025-11-03T10:30");
    }
}
