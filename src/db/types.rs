//! Row decoding.
//!
//! Turns driver rows into ordered JSON maps. Decoding is two-phase:
//! [`categorize_type`] maps the driver's column type name to a
//! [`TypeCategory`], then a dialect-specific decoder extracts the value.
//! A value that cannot be decoded under its category falls back to a looser
//! decode rather than failing the whole query.

use crate::db::dialect::Dialect;
use crate::models::Row as JsonRow;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::BigDecimal;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Logical category for a result column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    /// Dates, times and timestamps, rendered as ISO 8601 strings.
    Temporal,
    Unknown,
}

/// Classify a driver type name.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores plain floats or integers
        if dialect == Dialect::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // before the integer check: "interval" contains "int"
    if lower == "interval" {
        return TypeCategory::Text;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Binary values are always base64, so blobs never read as text.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

/// Exact DECIMAL/NUMERIC text, so no precision is lost to floats.
fn decimal_to_json(v: BigDecimal) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Convert a driver row to an ordered JSON map.
pub trait RowToJson {
    /// Column name to value, in cursor order. Duplicate names keep the last
    /// value.
    fn to_json_map(&self) -> JsonRow;

    fn column_names(&self) -> Vec<String>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $dialect:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> JsonRow {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let type_name = col.type_info().name();
                        let category = categorize_type(type_name, $dialect);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect()
            }

            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, Dialect::MySql, mysql::decode_column);
impl_row_to_json!(PgRow, Dialect::Postgres, postgres::decode_column);
impl_row_to_json!(SqliteRow, Dialect::Sqlite, sqlite::decode_column);

fn is_null<R: Row>(row: &R, idx: usize) -> bool
where
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        if is_null(row, idx) {
            return JsonValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => None,
        };
        value.or_else(|| fallback(row, idx)).unwrap_or(JsonValue::Null)
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<BigDecimal, _>(idx).ok().map(decimal_to_json)
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Some(v.into());
        }
        row.try_get::<u8, _>(idx).ok().map(JsonValue::from)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_to_json(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_to_json(f64::from(v)))
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| binary_to_json(&v))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<JsonValue, _>(idx).ok()
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Some(JsonValue::String(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        row.try_get::<NaiveTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string()))
    }

    fn fallback(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Some(JsonValue::String(v));
        }
        // VARBINARY-backed text from information_schema and similar
        let bytes = row.try_get::<Vec<u8>, _>(idx).ok()?;
        Some(match String::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s),
            Err(e) => binary_to_json(e.as_bytes()),
        })
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        if is_null(row, idx) {
            return JsonValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => None,
        };
        value
            .or_else(|| row.try_get::<String, _>(idx).ok().map(JsonValue::String))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        match row.try_get::<BigDecimal, _>(idx) {
            Ok(v) => Some(decimal_to_json(v)),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to decode NUMERIC");
                None
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(v.into());
        }
        row.try_get::<i16, _>(idx).ok().map(JsonValue::from)
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_to_json(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_to_json(f64::from(v)))
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| binary_to_json(&v))
    }

    fn decode_json(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<JsonValue, _>(idx).ok()
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<uuid::Uuid, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string()))
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Some(JsonValue::String(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        row.try_get::<NaiveTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(v.to_string()))
    }
}

mod sqlite {
    use super::*;

    /// SQLite columns are dynamically typed; the declared type is only a
    /// hint, so every category falls back through the storage classes.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        if is_null(row, idx) {
            return JsonValue::Null;
        }
        let value = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_text(row, idx).map(|v| match v {
                JsonValue::String(s) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
                other => other,
            }),
            _ => decode_text(row, idx),
        };
        value
            .or_else(|| decode_integer(row, idx))
            .or_else(|| decode_float(row, idx))
            .or_else(|| decode_text(row, idx))
            .or_else(|| decode_binary(row, idx))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<i64, _>(idx).ok().map(JsonValue::from)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<f64, _>(idx).ok().map(float_to_json)
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<String, _>(idx).ok().map(JsonValue::String)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
        row.try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| binary_to_json(&v))
    }
}
