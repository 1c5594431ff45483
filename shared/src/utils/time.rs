//! Time-related utilities

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};

/// Convert epoch seconds (as found in rate-limit headers) to a UTC instant.
/// Out-of-range values fall back to the epoch.
pub fn from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Start of the calendar day containing `now`, in a zone `offset_minutes`
/// east of UTC, expressed back in UTC.
///
/// Invalid offsets (beyond ±24h) are treated as UTC.
pub fn day_start_utc(now: DateTime<Utc>, offset_minutes: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now - Duration::hours(24))
}

/// Format an instant the way the GitHub API expects `since` parameters.
pub fn to_api_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
