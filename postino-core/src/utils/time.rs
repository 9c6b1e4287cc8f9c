use time::{
    error::ComponentRange,
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use crate::validation::ValidationError;

const LEGACY_WITH_FRACTION: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");
const LEGACY: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Current instant in UTC, at microsecond resolution (the resolution of the store).
pub fn now_timestamp() -> OffsetDateTime {
    truncate_to_micros(OffsetDateTime::now_utc())
}

pub fn truncate_to_micros(ts: OffsetDateTime) -> OffsetDateTime {
    let nanos = ts.nanosecond();
    ts.to_offset(UtcOffset::UTC)
        .replace_nanosecond(nanos - nanos % 1_000)
        .unwrap_or(ts)
}

pub fn to_unix_micros(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000) as i64
}

pub fn from_unix_micros(micros: i64) -> Result<OffsetDateTime, ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
}

/// Parses a client supplied timestamp. Accepts RFC 3339 and the older
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form, which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Empty("min_timestamp"));
    }
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| PrimitiveDateTime::parse(raw, LEGACY_WITH_FRACTION).map(|t| t.assume_utc()))
        .or_else(|_| PrimitiveDateTime::parse(raw, LEGACY).map(|t| t.assume_utc()))
        .map_err(|_| ValidationError::Timestamp(raw.to_string()))?;
    Ok(truncate_to_micros(parsed))
}
