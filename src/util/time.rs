//! Timestamp encoding.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with nanosecond
//! precision and a `Z` suffix, so string order in the engine equals
//! chronological order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Encode a timestamp for storage.
#[must_use]
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Encode an optional timestamp for storage.
#[must_use]
pub fn format_opt_ts(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(format_ts)
}

/// Decode a stored timestamp.
///
/// Accepts RFC 3339 and the engine's `CURRENT_TIMESTAMP` layout.
#[must_use]
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Read a timestamp column, failing the row on garbage.
pub(crate) fn ts_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| bad_ts(idx, &raw))
}

/// Read a nullable timestamp column.
pub(crate) fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw).map(Some).ok_or_else(|| bad_ts(idx, &raw)),
        None => Ok(None),
    }
}

fn bad_ts(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("invalid timestamp: {raw}").into(),
    )
}
