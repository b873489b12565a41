// Component-array timestamps
//
// Producers serialize instants as `[year, month, day, hour, minute, second]`
// with an optional trailing nanosecond field. Components arrive as JSON
// numbers and may carry a fractional `.0`; they are truncated to integers.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

const REQUIRED_COMPONENTS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("invalid timestamp array length: {0}")]
    TooShort(usize),

    #[error("timestamp component {index} is not a number: {value}")]
    NonNumeric { index: usize, value: String },

    #[error("timestamp components do not form a valid instant: {0:?}")]
    OutOfRange(Vec<i64>),
}

/// Parse a component array into a UTC instant.
pub fn parse_timestamp(components: &[JsonValue]) -> Result<DateTime<Utc>, TimestampError> {
    if components.len() < REQUIRED_COMPONENTS {
        return Err(TimestampError::TooShort(components.len()));
    }

    let take = components.len().min(REQUIRED_COMPONENTS + 1);
    let mut parts = Vec::with_capacity(REQUIRED_COMPONENTS + 1);
    for (index, value) in components[..take].iter().enumerate() {
        let number = value.as_f64().ok_or_else(|| TimestampError::NonNumeric {
            index,
            value: value.to_string(),
        })?;
        parts.push(number as i64);
    }
    let nanosecond = parts.get(REQUIRED_COMPONENTS).copied().unwrap_or(0);

    let out_of_range = || TimestampError::OutOfRange(parts.clone());
    let year = i32::try_from(parts[0]).map_err(|_| out_of_range())?;
    let [month, day, hour, minute, second, nano] =
        [parts[1], parts[2], parts[3], parts[4], parts[5], nanosecond]
            .map(|part| u32::try_from(part).ok());

    let naive = match (month, day, hour, minute, second, nano) {
        (Some(month), Some(day), Some(hour), Some(minute), Some(second), Some(nano)) => {
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|date| date.and_hms_nano_opt(hour, minute, second, nano))
        }
        _ => None,
    };

    naive
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(out_of_range)
}
