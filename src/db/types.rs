//! Database-agnostic type mappings.
//!
//! Type conversion uses a two-phase approach:
//! 1. [`categorize_type`] classifies a declared type name into a [`SqlType`]
//! 2. Database-specific decoders extract a [`SqlValue`] for that category
//!
//! Parameter slots and result columns share the same classification, which is
//! what the binder and the row mapper use to treat temporal values specially.

use crate::config::DriverKind;
use crate::error::DbResult;
use crate::models::SqlValue;
use sqlx::mysql::{MySqlTypeInfo, MySqlValueRef};
use sqlx::{Decode, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical declared type of a parameter slot or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SqlType {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    Time,
    Timestamp,
    /// SQLite reports expression columns without a declared type as NULL.
    Null,
    #[default]
    Unknown,
}

impl SqlType {
    /// Date-only and date-time types, the ones rendered through the fixed
    /// timestamp format and bound as native temporal values.
    pub fn is_date_or_timestamp(self) -> bool {
        matches!(self, SqlType::Date | SqlType::Timestamp)
    }
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, kind: DriverKind) -> SqlType {
    let lower = type_name.to_lowercase();

    if lower == "null" {
        return SqlType::Null;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if kind == DriverKind::Sqlite && lower == "numeric" {
            return SqlType::Float;
        }
        return SqlType::Decimal;
    }

    // Temporal - before integers so "datetime" never falls through
    if lower.contains("timestamp") || lower.contains("datetime") {
        return SqlType::Timestamp;
    }
    if lower == "date" {
        return SqlType::Date;
    }
    if lower == "time" {
        return SqlType::Time;
    }

    // Boolean (MySQL reports TINYINT(1) as BOOLEAN)
    if lower == "bool" || lower == "boolean" {
        return SqlType::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") || lower == "year" {
        return SqlType::Integer;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return SqlType::Float;
    }

    if lower == "json" {
        return SqlType::Json;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") {
        return SqlType::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return SqlType::Text;
    }

    SqlType::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

pub(crate) mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::mysql::MySqlRow;
    use sqlx::{Row, ValueRef};

    pub fn decode_column(row: &MySqlRow, idx: usize, sql_type: SqlType) -> DbResult<SqlValue> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(SqlValue::Null);
        }
        match sql_type {
            SqlType::Decimal => decode_decimal(row, idx),
            SqlType::Integer => decode_integer(row, idx),
            SqlType::Boolean => decode_boolean(row, idx),
            SqlType::Float => decode_float(row, idx),
            SqlType::Binary => Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            SqlType::Json => decode_json(row, idx),
            SqlType::Date => decode_date(row, idx),
            SqlType::Time => decode_time(row, idx),
            SqlType::Timestamp => decode_timestamp(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        match row.try_get::<RawDecimal, _>(idx) {
            Ok(v) => Ok(SqlValue::Decimal(v.0)),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(SqlValue::from(v));
        }
        decode_text(row, idx)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        match row.try_get::<bool, _>(idx) {
            Ok(v) => Ok(SqlValue::Bool(v)),
            Err(_) => decode_integer(row, idx),
        }
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(SqlValue::Float(v));
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Ok(SqlValue::Float(f64::from(v)));
        }
        decode_text(row, idx)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        match row.try_get::<serde_json::Value, _>(idx) {
            Ok(v) => Ok(SqlValue::Json(v)),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_date(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        match row.try_get::<NaiveDate, _>(idx) {
            Ok(v) => Ok(SqlValue::Date(v)),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_time(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        // TIME may exceed 24h on MySQL; such values stay textual
        match row.try_get::<NaiveTime, _>(idx) {
            Ok(v) => Ok(SqlValue::Time(v)),
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(SqlValue::DateTime(v));
        }
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Ok(SqlValue::DateTime(v.naive_utc()));
        }
        decode_text(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> DbResult<SqlValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        let bytes = row.try_get::<Vec<u8>, _>(idx)?;
        Ok(SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

pub(crate) mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Row, ValueRef};

    /// Decode one column. SQLite is dynamically typed, so the declared type
    /// only steers temporal and boolean handling; everything else follows the
    /// storage class of the value itself.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: SqlType) -> DbResult<SqlValue> {
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(SqlValue::Null);
            }
            categorize_type(raw.type_info().name(), DriverKind::Sqlite)
        };

        match declared {
            SqlType::Timestamp => {
                if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
                    return Ok(SqlValue::DateTime(v));
                }
            }
            SqlType::Date => {
                if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
                    return Ok(SqlValue::Date(v));
                }
            }
            SqlType::Time => {
                if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
                    return Ok(SqlValue::Time(v));
                }
            }
            SqlType::Boolean => {
                if let Ok(v) = row.try_get::<bool, _>(idx) {
                    return Ok(SqlValue::Bool(v));
                }
            }
            _ => {}
        }

        decode_storage(row, idx, storage, declared)
    }

    fn decode_storage(
        row: &SqliteRow,
        idx: usize,
        storage: SqlType,
        declared: SqlType,
    ) -> DbResult<SqlValue> {
        match storage {
            SqlType::Integer => Ok(SqlValue::Int(row.try_get::<i64, _>(idx)?)),
            SqlType::Float => Ok(SqlValue::Float(row.try_get::<f64, _>(idx)?)),
            SqlType::Binary => Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            _ => {
                let text = row.try_get::<String, _>(idx)?;
                Ok(match declared {
                    SqlType::Json => serde_json::from_str(&text)
                        .map(SqlValue::Json)
                        .unwrap_or(SqlValue::Text(text)),
                    SqlType::Decimal => SqlValue::Decimal(text),
                    _ => SqlValue::Text(text),
                })
            }
        }
    }
}
