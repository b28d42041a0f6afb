//! Positional parameter binding.
//!
//! JSON values are encoded as the type Postgres inferred for each `$n` when
//! the statement was prepared, so `$1` compared with an `int4` column binds
//! an `i32` rather than text.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlgate_core::BackendError;
use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use std::str::FromStr;
use uuid::Uuid;

fn args_add<T>(args: &mut PgArguments, position: usize, v: T) -> Result<(), BackendError>
where
    T: Send + Sync + 'static,
    for<'q> T: sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    args.add(v).map_err(|e| {
        tracing::debug!(position, error = %e, "Failed to encode parameter");
        BackendError::InvalidParameter {
            position,
            expected: "encodable value".to_string(),
        }
    })
}

/// Encode `params` for the parameter types of a prepared statement.
///
/// `types` holds the upper-case type name of each `$n`; missing entries bind
/// as text.
pub fn bind_params(params: &[Value], types: &[String]) -> Result<PgArguments, BackendError> {
    let mut args = PgArguments::default();
    for (idx, value) in params.iter().enumerate() {
        let position = idx + 1;
        let type_name = types.get(idx).map(String::as_str).unwrap_or("TEXT");
        bind_one(&mut args, position, type_name, value)?;
    }
    Ok(args)
}

fn bind_one(
    args: &mut PgArguments,
    position: usize,
    type_name: &str,
    value: &Value,
) -> Result<(), BackendError> {
    if value.is_null() {
        return args_add(args, position, None::<String>);
    }

    let invalid = |expected: &str| BackendError::InvalidParameter {
        position,
        expected: expected.to_string(),
    };

    match type_name {
        "BOOL" => {
            let v = match value {
                Value::Bool(b) => *b,
                Value::String(s) => bool::from_str(&s.to_ascii_lowercase())
                    .map_err(|_| invalid("boolean"))?,
                _ => return Err(invalid("boolean")),
            };
            args_add(args, position, v)
        }
        "INT2" => {
            let v = as_i64(value).ok_or_else(|| invalid("smallint"))?;
            args_add(args, position, i16::try_from(v).map_err(|_| invalid("smallint"))?)
        }
        "INT4" => {
            let v = as_i64(value).ok_or_else(|| invalid("integer"))?;
            args_add(args, position, i32::try_from(v).map_err(|_| invalid("integer"))?)
        }
        "INT8" => {
            let v = as_i64(value).ok_or_else(|| invalid("bigint"))?;
            args_add(args, position, v)
        }
        "FLOAT4" => {
            let v = as_f64(value).ok_or_else(|| invalid("real"))?;
            args_add(args, position, v as f32)
        }
        "FLOAT8" => {
            let v = as_f64(value).ok_or_else(|| invalid("double precision"))?;
            args_add(args, position, v)
        }
        "NUMERIC" => {
            let text = scalar_text(value).ok_or_else(|| invalid("numeric"))?;
            let v = BigDecimal::from_str(&text).map_err(|_| invalid("numeric"))?;
            args_add(args, position, v)
        }
        "JSON" | "JSONB" => args_add(args, position, sqlx::types::Json(value.clone())),
        "UUID" => {
            let text = value.as_str().ok_or_else(|| invalid("uuid"))?;
            let v = Uuid::parse_str(text).map_err(|_| invalid("uuid"))?;
            args_add(args, position, v)
        }
        "TIMESTAMPTZ" => {
            let text = value.as_str().ok_or_else(|| invalid("timestamptz"))?;
            let v = DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid("timestamptz"))?;
            args_add(args, position, v)
        }
        "TIMESTAMP" => {
            let text = value.as_str().ok_or_else(|| invalid("timestamp"))?;
            let v = parse_naive_datetime(text).ok_or_else(|| invalid("timestamp"))?;
            args_add(args, position, v)
        }
        "DATE" => {
            let text = value.as_str().ok_or_else(|| invalid("date"))?;
            let v = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid("date"))?;
            args_add(args, position, v)
        }
        _ => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            args_add(args, position, text)
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
