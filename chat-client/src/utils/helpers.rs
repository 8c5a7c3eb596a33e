use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Format a timestamp the way chat rows display it: `YYYY-MM-DD HH:mm`
pub fn format_display_time<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Parse a timestamp as the store or relay sends it.
///
/// Accepts RFC 3339 and offset-less ISO 8601; the latter is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
