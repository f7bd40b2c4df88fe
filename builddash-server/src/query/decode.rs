//! Render PostgreSQL rows as JSON objects
//!
//! Values pass through with their native shape where JSON has one. Numerics
//! become exact decimal strings, temporal values use ISO 8601, bytea becomes
//! base64, and other scalar types use their PostgreSQL text form. A type with
//! no known rendering becomes `null` and is logged, never reinterpreted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::Uuid;
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo};

use super::pg_text::{interval_text, money_text, InetText, LabelText, NumericText};
use super::ResultColumn;

pub fn result_columns(columns: &[PgColumn]) -> Vec<ResultColumn> {
    columns
        .iter()
        .map(|c| ResultColumn {
            name: c.name().to_owned(),
            data_type: c.type_info().name().to_owned(),
        })
        .collect()
}

pub fn row_to_json(row: &PgRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|c| (c.name().to_owned(), cell_to_json(row, c.ordinal(), c.type_info())))
        .collect()
}

fn cell_to_json(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Value {
    match type_info.kind() {
        // Domains share the wire format of their base type
        PgTypeKind::Domain(base) => return cell_to_json(row, idx, base),
        PgTypeKind::Enum(_) => {
            return unchecked::<LabelText>(row, idx).map_or(Value::Null, |l| Value::String(l.0))
        }
        _ => {}
    }

    match type_info.name() {
        "BOOL" => get::<bool>(row, idx).map_or(Value::Null, Value::Bool),
        "INT2" => get::<i16>(row, idx).map_or(Value::Null, Value::from),
        "INT4" => get::<i32>(row, idx).map_or(Value::Null, Value::from),
        "INT8" => get::<i64>(row, idx).map_or(Value::Null, Value::from),
        "OID" => get::<Oid>(row, idx).map_or(Value::Null, |o| Value::from(o.0)),
        "FLOAT4" => get::<f32>(row, idx).map_or(Value::Null, |f| float(f64::from(f))),
        "FLOAT8" => get::<f64>(row, idx).map_or(Value::Null, float),
        "NUMERIC" => unchecked::<NumericText>(row, idx).map_or(Value::Null, |n| Value::String(n.0)),
        "MONEY" => get::<PgMoney>(row, idx).map_or(Value::Null, |m| Value::String(money_text(&m))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            get::<String>(row, idx).map_or(Value::Null, Value::String)
        }
        "\"CHAR\"" => get::<i8>(row, idx)
            .map_or(Value::Null, |c| Value::String(char::from(c as u8).to_string())),
        "UUID" => get::<Uuid>(row, idx).map_or(Value::Null, |u| Value::String(u.to_string())),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx)
            .map_or(Value::Null, |t| Value::String(t.to_rfc3339())),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx)
            .map_or(Value::Null, |t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => get::<NaiveDate>(row, idx).map_or(Value::Null, |d| Value::String(d.to_string())),
        "TIME" => get::<NaiveTime>(row, idx).map_or(Value::Null, |t| Value::String(t.to_string())),
        "TIMETZ" => get::<PgTimeTz<NaiveTime, FixedOffset>>(row, idx)
            .map_or(Value::Null, |t| Value::String(format!("{}{}", t.time, t.offset))),
        "INTERVAL" => get::<PgInterval>(row, idx)
            .map_or(Value::Null, |iv| Value::String(interval_text(&iv))),
        "INET" | "CIDR" => unchecked::<InetText>(row, idx).map_or(Value::Null, |i| Value::String(i.0)),
        "JSON" | "JSONB" => get::<Value>(row, idx).unwrap_or(Value::Null),
        "BYTEA" => get::<Vec<u8>>(row, idx)
            .map_or(Value::Null, |b| Value::String(BASE64.encode(b))),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => get::<Vec<String>>(row, idx).map_or(Value::Null, Value::from),
        "INT2[]" => get::<Vec<i16>>(row, idx).map_or(Value::Null, Value::from),
        "INT4[]" => get::<Vec<i32>>(row, idx).map_or(Value::Null, Value::from),
        "INT8[]" => get::<Vec<i64>>(row, idx).map_or(Value::Null, Value::from),
        "BOOL[]" => get::<Vec<bool>>(row, idx).map_or(Value::Null, Value::from),
        "FLOAT4[]" => get::<Vec<f32>>(row, idx).map_or(Value::Null, |v| {
            Value::Array(v.into_iter().map(|f| float(f64::from(f))).collect())
        }),
        "FLOAT8[]" => get::<Vec<f64>>(row, idx)
            .map_or(Value::Null, |v| Value::Array(v.into_iter().map(float).collect())),
        "UUID[]" => get::<Vec<Uuid>>(row, idx).map_or(Value::Null, |v| {
            Value::Array(v.into_iter().map(|u| Value::String(u.to_string())).collect())
        }),
        "JSONB[]" | "JSON[]" => get::<Vec<Value>>(row, idx).map_or(Value::Null, Value::Array),
        other => {
            if !is_null(row, idx) {
                tracing::warn!(column = idx, type_name = other, "No JSON rendering for column type");
            }
            Value::Null
        }
    }
}

/// Decode a nullable value; decode failures render as `null`.
fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "Failed to decode column value");
            None
        }
    }
}

/// Decode through one of the text renderers, which accept any wire type.
fn unchecked<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres>,
{
    match row.try_get_unchecked::<Option<T>, _>(idx) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "Failed to decode column value");
            None
        }
    }
}

fn is_null(row: &PgRow, idx: usize) -> bool {
    row.try_get_raw(idx).map_or(true, |v| sqlx::ValueRef::is_null(&v))
}

/// NaN and infinities have no JSON form.
fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_floats_are_numbers() {
        assert_eq!(float(1.5), Value::from(1.5));
    }

    #[test]
    fn non_finite_floats_are_null() {
        assert_eq!(float(f64::NAN), Value::Null);
        assert_eq!(float(f64::INFINITY), Value::Null);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn renders_common_types() {
        let url = std::env::var("AM_TEST_DATABASE_URL").expect("AM_TEST_DATABASE_URL required");
        let pool = sqlx::PgPool::connect(&url).await.expect("connect failed");

        let row = sqlx::query(
            "SELECT 1::int4 AS a, 'x'::text AS b, NULL::int8 AS c, 2.50::numeric AS d, \
             '{\"k\": 1}'::jsonb AS e, ARRAY['p', 'q'] AS f",
        )
        .fetch_one(&pool)
        .await
        .expect("query failed");

        let obj = row_to_json(&row);
        assert_eq!(obj["a"], 1);
        assert_eq!(obj["b"], "x");
        assert_eq!(obj["c"], Value::Null);
        assert_eq!(obj["d"], "2.50");
        assert_eq!(obj["e"]["k"], 1);
        assert_eq!(obj["f"], serde_json::json!(["p", "q"]));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn renders_types_without_json_shape_as_text() {
        let url = std::env::var("AM_TEST_DATABASE_URL").expect("AM_TEST_DATABASE_URL required");
        let pool = sqlx::PgPool::connect(&url).await.expect("connect failed");

        let row = sqlx::query(
            "SELECT 12345678901234567890123456789012345.5::numeric AS big, \
             'NaN'::numeric AS nan, '1 day 02:00:00'::interval AS iv, 77::oid AS o, \
             '10.1.0.0/16'::cidr AS net, '12.34'::money AS m, \
             '1 mon'::interval AS mon, '10:00:00+02'::timetz AS tz",
        )
        .fetch_one(&pool)
        .await
        .expect("query failed");

        let obj = row_to_json(&row);
        assert_eq!(obj["big"], "12345678901234567890123456789012345.5");
        assert_eq!(obj["nan"], "NaN");
        assert_eq!(obj["iv"], "1 day 02:00:00");
        assert_eq!(obj["o"], 77);
        assert_eq!(obj["net"], "10.1.0.0/16");
        assert_eq!(obj["m"], "12.34");
        assert_eq!(obj["mon"], "1 mon");
        assert_eq!(obj["tz"], "10:00:00+02:00");
    }
}
