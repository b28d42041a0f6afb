//! Freshness heuristic for timestamp-bearing facts.
//!
//! The clock is always passed in, so callers and tests decide what "now" is.

use crate::error::GatewayError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlgate_core::ColumnMeta;
use std::time::Duration;

/// Whether `value` is older than `threshold` relative to `now`.
///
/// Accepts ISO-8601 strings (with or without an offset; naive values are
/// read as UTC, bare dates as midnight UTC) and Unix epoch seconds as JSON
/// numbers. Anything else fails with [`GatewayError::InvalidTimestamp`].
pub fn is_stale(
    value: &Value,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Result<bool, GatewayError> {
    let ts = parse_timestamp(value)?;
    let threshold =
        chrono::Duration::from_std(threshold).map_err(|_| GatewayError::InvalidTimestamp)?;
    Ok(now.signed_duration_since(ts) > threshold)
}

/// Parse a timestamp in any of the accepted shapes.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, GatewayError> {
    match value {
        Value::String(s) => parse_iso8601(s.trim()).ok_or(GatewayError::InvalidTimestamp),
        Value::Number(n) => {
            let parsed = if let Some(secs) = n.as_i64() {
                Utc.timestamp_opt(secs, 0).single()
            } else {
                n.as_f64().and_then(|secs| {
                    let whole = secs.trunc();
                    let nanos = ((secs - whole) * 1e9) as u32;
                    Utc.timestamp_opt(whole as i64, nanos).single()
                })
            };
            parsed.ok_or(GatewayError::InvalidTimestamp)
        }
        _ => Err(GatewayError::InvalidTimestamp),
    }
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Staleness of a result set, judged on its first temporal column.
///
/// `None` when no column is temporal; otherwise true if any row's value in
/// that column is stale. Nulls and unparseable cells do not count.
pub fn rows_stale(
    columns: &[ColumnMeta],
    rows: &[Map<String, Value>],
    now: DateTime<Utc>,
    threshold: Duration,
) -> Option<bool> {
    let column = columns.iter().find(|c| c.is_temporal())?;
    let stale = rows
        .iter()
        .filter_map(|row| row.get(&column.name))
        .filter(|value| !value.is_null())
        .any(|value| is_stale(value, now, threshold).unwrap_or(false));
    Some(stale)
}
