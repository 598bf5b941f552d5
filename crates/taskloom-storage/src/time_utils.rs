use chrono::Utc;

/// Get current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds in `days` days.
pub fn days_to_ms(days: u32) -> i64 {
    i64::from(days) * 24 * 60 * 60 * 1000
}
