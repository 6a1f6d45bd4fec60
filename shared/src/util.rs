//! Small time utilities

use chrono::Utc;

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds for `minutes` ago (saturating)
pub fn millis_ago(minutes: i64) -> i64 {
    now_millis().saturating_sub(minutes.saturating_mul(60_000))
}
