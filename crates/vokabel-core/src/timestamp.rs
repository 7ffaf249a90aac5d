//! Timestamp helpers shared by the entry store, the sync client, and the
//! server merge.
//!
//! All comparisons are strict: a record "changed since" a watermark only when
//! its timestamp is greater than the watermark, and a remote copy replaces a
//! local one only when it is strictly newer.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Wall-clock instant used for `updatedAt`, `deletedAt` and watermarks.
pub type Timestamp = DateTime<Utc>;

/// Current wall-clock time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `value` lies strictly after `since`. An absent watermark admits
/// everything.
pub fn changed_since(value: Timestamp, since: Option<Timestamp>) -> bool {
    since.map_or(true, |since| value > since)
}

/// Stamp for a local mutation: `now`, moved one microsecond past
/// `watermark` when the local clock has not caught up with it yet.
pub fn stamp_after(now: Timestamp, watermark: Option<Timestamp>) -> Timestamp {
    match watermark {
        Some(watermark) if now <= watermark => watermark + Duration::microseconds(1),
        _ => now,
    }
}

/// Fixed-width RFC 3339 rendering whose lexical order matches chronological
/// order. Used for indexed text columns.
pub fn to_sortable(value: Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
