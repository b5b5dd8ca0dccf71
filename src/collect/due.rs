// src/collect/due.rs
//! Due-check: is a source eligible to run at `now`?

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::model::Source;

/// Storage format for timestamps (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts the storage format and RFC 3339.
pub fn parse_last_run(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Never-run sources are due; otherwise due once `interval_minutes` have elapsed.
/// An unparseable `last_run` is treated as due.
pub fn is_due(source: &Source, now: DateTime<Utc>) -> bool {
    let Some(raw) = source.last_run.as_deref() else {
        return true;
    };
    if raw.trim().is_empty() {
        return true;
    }
    match parse_last_run(raw) {
        Some(last) => now - last >= Duration::minutes(source.effective_interval_minutes()),
        None => true,
    }
}
