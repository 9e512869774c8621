use crate::error::{data_error, BridgeResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};

/// Parse an RFC 3339 timestamp into a UTC instant
pub fn parse_rfc3339(value: &str) -> BridgeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| data_error(&format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an all-day date (YYYY-MM-DD) as midnight UTC
pub fn parse_all_day(value: &str) -> BridgeResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| data_error(&format!("Failed to parse date '{}': {}", value, e)))?;
    Ok(DateTime::from_naive_utc_and_offset(
        date.and_time(NaiveTime::MIN),
        Utc,
    ))
}

/// Round an instant down to the start of its hour
pub fn floor_to_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_minute(0)
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(instant)
}
