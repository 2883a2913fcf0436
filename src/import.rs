//! Expansion of externally exported time segments into slot-aligned entries.
//!
//! Input is JSON-lines, one record per line:
//! `{"task":"Desc","segment_start":"2025-11-11T08:41:00","segment_end":"2025-11-11T08:56:00"}`
//! Each record expands into slot-sized entries fully contained in its
//! interval; partial leading/trailing fragments shorter than one slot are
//! dropped, not rounded.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::store::Entry;

pub const REASON_INVALID_JSON: &str = "Invalid JSON";
pub const REASON_MISSING_FIELD: &str = "Missing required field task/segment_start/segment_end";
pub const REASON_UNPARSEABLE_DATES: &str = "Unparseable dates";
pub const REASON_END_BEFORE_START: &str = "End before start";
pub const REASON_TOO_SHORT: &str = "Interval shorter than slot granularity – ignored";

/// Category stamped on every expanded entry.
pub const IMPORT_CATEGORY: &str = "Import";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkipDetail {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub details: Vec<SkipDetail>,
}

/// Expand raw JSON-lines into entries plus per-line skip details.
///
/// Line numbers count non-blank lines only, starting at 1. Validation
/// failures skip the offending line and continue; nothing here aborts the
/// batch.
pub fn expand_lines(
    raw: &str,
    slot_minutes: u32,
    imported_at: DateTime<Utc>,
) -> (Vec<Entry>, ImportResult) {
    let gran = i64::from(slot_minutes.max(1));
    let mut imported: Vec<Entry> = Vec::new();
    let mut details: Vec<SkipDetail> = Vec::new();

    let lines = raw.lines().filter(|l| !l.trim().is_empty());
    for (idx, line) in lines.enumerate() {
        let line_no = idx + 1;
        let mut skip = |reason: &str| {
            details.push(SkipDetail {
                line: line_no,
                reason: reason.to_string(),
            });
        };

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                skip(REASON_INVALID_JSON);
                continue;
            }
        };

        let task = value.get("task").and_then(Value::as_str).unwrap_or("");
        let seg_start = value.get("segment_start").and_then(Value::as_str);
        let seg_end = value.get("segment_end").and_then(Value::as_str);
        let (seg_start, seg_end) = match (seg_start, seg_end) {
            (Some(s), Some(e)) if !task.is_empty() => (s, e),
            _ => {
                skip(REASON_MISSING_FIELD);
                continue;
            }
        };

        let (start, end) = match (parse_local_timestamp(seg_start), parse_local_timestamp(seg_end))
        {
            (Some(s), Some(e)) => (s, e),
            _ => {
                skip(REASON_UNPARSEABLE_DATES);
                continue;
            }
        };
        if end <= start {
            skip(REASON_END_BEFORE_START);
            continue;
        }

        // Floor the start to a slot boundary, then emit only slots whose end
        // stays inside the interval.
        let minute_of_day = i64::from(start.hour() * 60 + start.minute());
        let mut cursor = start.date().and_hms_opt(0, 0, 0).expect("midnight is valid")
            + Duration::minutes((minute_of_day / gran) * gran);

        let mut produced = 0usize;
        while cursor + Duration::minutes(gran) <= end {
            let slot_end = cursor + Duration::minutes(gran);
            imported.push(Entry {
                day: cursor.format("%Y-%m-%d").to_string(),
                start: cursor.format("%H:%M").to_string(),
                end: slot_end.format("%H:%M").to_string(),
                description: task.to_string(),
                category: IMPORT_CATEGORY.to_string(),
                created_at: Some(imported_at),
            });
            produced += 1;
            cursor = slot_end;
        }

        if produced == 0 && (end - start).num_seconds() < gran * 60 {
            skip(REASON_TOO_SHORT);
        }
    }

    let result = ImportResult {
        imported: imported.len(),
        skipped: details.len(),
        details,
    };
    (imported, result)
}

/// Parse an ISO-8601-ish timestamp as local wall-clock time. Offset-carrying
/// values are converted into the host's local zone first.
fn parse_local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    None
}
