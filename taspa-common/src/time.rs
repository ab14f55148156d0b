//! Timestamp utilities

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a loosely formatted date as found in scraped exports
///
/// Accepts `YYYY-MM-DD` and `YYYY:MM:DD`, optionally followed by a time
/// (`T` or space separated, seconds optional). Colons in the date part are
/// treated as dashes. Returns `None` for empty or unparseable input.
pub fn parse_export_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Only the first 10 characters can be the date; later colons belong to the time
    let (date_part, time_part) = match raw.char_indices().nth(10) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, ""),
    };
    let normalized = format!("{}{}", date_part.replace(':', "-"), time_part);

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
