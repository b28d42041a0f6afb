//! Row decoding into JSON values, driven by the column types Postgres reports.
//!
//! A non-NULL value is never turned into JSON `null`: a column whose type has
//! no JSON mapping fails the whole query with an error naming the column.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Value, json};
use sqlgate_core::{BackendError, ColumnMeta};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgHasArrayType, PgRow};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Postgres, Row, ValueRef};
use std::fmt::Write;
use uuid::Uuid;

/// Decode every column of `row`, in column order.
pub fn decode_row(row: &PgRow, columns: &[ColumnMeta]) -> Result<Vec<Value>, BackendError> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_column(row, idx, column))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, column: &ColumnMeta) -> Result<Value, BackendError> {
    let is_null = row
        .try_get_raw(idx)
        .map(|raw| raw.is_null())
        .map_err(|e| undecodable(column, e))?;
    if is_null {
        return Ok(Value::Null);
    }

    let decoded = match column.type_name.as_str() {
        "BOOL" => get::<bool>(row, idx).map(|v| v.map(Value::Bool)),
        "INT2" => get::<i16>(row, idx).map(|v| v.map(|n| json!(n))),
        "INT4" => get::<i32>(row, idx).map(|v| v.map(|n| json!(n))),
        "INT8" => get::<i64>(row, idx).map(|v| v.map(|n| json!(n))),
        "FLOAT4" => get::<f32>(row, idx).map(|v| v.map(|n| json!(n))),
        "FLOAT8" => get::<f64>(row, idx).map(|v| v.map(|n| json!(n))),
        // Kept as text so no precision is lost on the way to JSON.
        "NUMERIC" => get::<BigDecimal>(row, idx).map(|v| v.map(|n| json!(n.to_string()))),
        "JSON" | "JSONB" => get::<Value>(row, idx),
        "UUID" => get::<Uuid>(row, idx).map(|v| v.map(|u| json!(u.to_string()))),
        "TIMESTAMPTZ" => {
            get::<DateTime<Utc>>(row, idx).map(|v| v.map(|t| json!(t.to_rfc3339())))
        }
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx).map(|v| v.map(|t| json!(naive_timestamp(t)))),
        "DATE" => get::<NaiveDate>(row, idx).map(|v| v.map(|d| json!(d.to_string()))),
        "TIME" => get::<NaiveTime>(row, idx).map(|v| v.map(|t| json!(t.to_string()))),
        "INTERVAL" => get::<PgInterval>(row, idx).map(|v| v.map(|i| json!(iso8601_interval(&i)))),
        "INET" | "CIDR" => get::<IpNetwork>(row, idx).map(|v| v.map(|n| json!(network_text(&n)))),

        "BOOL[]" => get_array::<bool>(row, idx, Value::Bool),
        "INT2[]" => get_array::<i16>(row, idx, |n| json!(n)),
        "INT4[]" => get_array::<i32>(row, idx, |n| json!(n)),
        "INT8[]" => get_array::<i64>(row, idx, |n| json!(n)),
        "FLOAT4[]" => get_array::<f32>(row, idx, |n| json!(n)),
        "FLOAT8[]" => get_array::<f64>(row, idx, |n| json!(n)),
        "NUMERIC[]" => get_array::<BigDecimal>(row, idx, |n| json!(n.to_string())),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            get_array::<String>(row, idx, Value::String)
        }
        "UUID[]" => get_array::<Uuid>(row, idx, |u| json!(u.to_string())),
        "JSONB[]" => get_array::<Value>(row, idx, |v| v),
        "TIMESTAMPTZ[]" => get_array::<DateTime<Utc>>(row, idx, |t| json!(t.to_rfc3339())),
        "DATE[]" => get_array::<NaiveDate>(row, idx, |d| json!(d.to_string())),

        _ => get::<String>(row, idx).map(|v| v.map(Value::String)),
    };

    match decoded {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(Value::Null),
        Err(e) => Err(undecodable(column, e)),
    }
}

fn undecodable(column: &ColumnMeta, err: sqlx::Error) -> BackendError {
    tracing::debug!(column = %column.name, type_name = %column.type_name, error = %err, "Column not decodable");
    BackendError::Fatal(format!(
        "column '{}' has type {} which cannot be returned as JSON; cast it to text in the template",
        column.name, column.type_name
    ))
}

fn get<T>(row: &PgRow, idx: usize) -> Result<Option<T>, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
}

fn get_array<T>(
    row: &PgRow,
    idx: usize,
    to_json: impl Fn(T) -> Value,
) -> Result<Option<Value>, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + PgHasArrayType,
{
    let items = get::<Vec<Option<T>>>(row, idx)?;
    Ok(items.map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map(&to_json).unwrap_or(Value::Null))
                .collect(),
        )
    }))
}

fn naive_timestamp(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`.
fn iso8601_interval(interval: &PgInterval) -> String {
    let mut out = String::from("P");
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        let _ = write!(out, "{years}Y");
    }
    if months != 0 {
        let _ = write!(out, "{months}M");
    }
    if interval.days != 0 {
        let _ = write!(out, "{}D", interval.days);
    }

    let micros = interval.microseconds;
    if micros != 0 {
        out.push('T');
        let hours = micros / 3_600_000_000;
        let minutes = (micros % 3_600_000_000) / 60_000_000;
        let seconds = micros % 60_000_000;
        if hours != 0 {
            let _ = write!(out, "{hours}H");
        }
        if minutes != 0 {
            let _ = write!(out, "{minutes}M");
        }
        if seconds != 0 {
            let _ = write!(out, "{}S", seconds as f64 / 1_000_000.0);
        }
    }

    if out == "P" { "PT0S".to_string() } else { out }
}

/// Host addresses print without a prefix, as `psql` shows them.
fn network_text(network: &IpNetwork) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(months: i32, days: i32, microseconds: i64) -> PgInterval {
        PgInterval {
            months,
            days,
            microseconds,
        }
    }

    #[test]
    fn intervals_render_as_iso8601() {
        assert_eq!(iso8601_interval(&interval(0, 1, 0)), "P1D");
        assert_eq!(iso8601_interval(&interval(14, 3, 0)), "P1Y2M3D");
        assert_eq!(
            iso8601_interval(&interval(0, 0, 3_600_000_000 + 5 * 60_000_000 + 6_500_000)),
            "PT1H5M6.5S"
        );
        assert_eq!(iso8601_interval(&interval(0, 0, 0)), "PT0S");
        assert_eq!(iso8601_interval(&interval(0, -2, 0)), "P-2D");
    }

    #[test]
    fn host_addresses_drop_prefix() {
        let host: IpNetwork = "10.0.0.1/32".parse().unwrap();
        assert_eq!(network_text(&host), "10.0.0.1");
        let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert_eq!(network_text(&net), "10.0.0.0/8");
    }
}
