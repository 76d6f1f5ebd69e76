use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds left before `started_at + duration_minutes`, floored at zero.
pub fn seconds_remaining(started_at: DateTime<Utc>, duration_minutes: i32, at: DateTime<Utc>) -> i64 {
    let end = started_at + chrono::Duration::minutes(duration_minutes as i64);
    (end - at).num_seconds().max(0)
}
