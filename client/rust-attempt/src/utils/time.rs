use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses a server timestamp. Offsets are honoured; naive timestamps are taken as UTC.
pub fn parse_server_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Whole seconds elapsed between `started_at` and `now`.
///
/// Unparseable timestamps and start times in the future count as zero.
pub fn elapsed_seconds_since(started_at: &str, now: DateTime<Utc>) -> u64 {
    parse_server_timestamp(started_at)
        .map(|started| (now - started).num_seconds().max(0) as u64)
        .unwrap_or(0)
}
