//! Millisecond timestamps shared by the SQLite rows, the preferences file and
//! the wire format.

use crate::error::AppError;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const NANOS_PER_MILLI: i128 = 1_000_000;

pub fn to_millis(value: OffsetDateTime) -> i64 {
    value.unix_timestamp_nanos().div_euclid(NANOS_PER_MILLI) as i64
}

pub fn from_millis(millis: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI)
        .map_err(|err| AppError::invalid_data(format!("timestamp {millis} out of range: {err}")))
}

/// Drops sub-millisecond precision so a value survives a store round trip unchanged.
pub fn truncate_to_millis(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = value.unix_timestamp_nanos();
    let truncated = nanos - nanos.rem_euclid(NANOS_PER_MILLI);
    OffsetDateTime::from_unix_timestamp_nanos(truncated).unwrap_or(value)
}

pub fn epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, AppError> {
    value
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

pub fn parse_rfc3339(field: &str, value: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map(truncate_to_millis)
        .map_err(|_| AppError::invalid_data(format!("{field} must be RFC3339")))
}
