//! Timestamp utilities
//!
//! All persisted timestamps are unix epoch milliseconds (INTEGER columns) so that
//! range comparisons in SQL are exact.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to unix epoch milliseconds for storage
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored unix epoch milliseconds back to a timestamp
///
/// Out-of-range values clamp to the unix epoch rather than failing a whole row decode.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}
