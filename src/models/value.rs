//! Runtime parameter and column values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;

/// Fixed rendering used for temporal columns in generic row maps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Text layouts accepted when a textual value has to be read as a timestamp.
const TIMESTAMP_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A value bound to a statement parameter or read from a result column.
///
/// Values are typed only by their runtime kind; the declared type of the
/// target slot or source column decides how a driver encodes or decodes them.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its database text form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Json(JsonValue),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the runtime kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Time(_) => "time",
            SqlValue::Json(_) => "json",
        }
    }

    /// Natural string conversion. `None` for SQL NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(v) => Some(v.to_string()),
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Decimal(v) | SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            SqlValue::Date(v) => Some(v.format(DATE_FORMAT).to_string()),
            SqlValue::DateTime(v) => Some(v.format(TIMESTAMP_FORMAT).to_string()),
            SqlValue::Time(v) => Some(v.format("%H:%M:%S").to_string()),
            SqlValue::Json(v) => Some(v.to_string()),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) | SqlValue::Decimal(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Decimal(v) | SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Decimal(v) | SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Int(v) => Some(*v != 0),
            SqlValue::Text(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Read the value as a date-time. Dates are taken at midnight; text is
    /// parsed in the common `yyyy-MM-dd HH:mm:ss[.fff]` layouts.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(v) => Some(*v),
            SqlValue::Date(v) => Some(v.and_time(NaiveTime::MIN)),
            SqlValue::Text(s) => {
                let s = s.trim();
                TIMESTAMP_PARSE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, DATE_FORMAT)
                            .ok()
                            .map(|d| d.and_time(NaiveTime::MIN))
                    })
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(v) => Some(*v),
            SqlValue::DateTime(v) => Some(v.date()),
            SqlValue::Text(_) => self.as_timestamp().map(|ts| ts.date()),
            _ => None,
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for SqlValue {
                fn from(v: $t) -> Self {
                    SqlValue::Int(i64::from(v))
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => SqlValue::Int(v),
            Err(_) => SqlValue::Decimal(v.to_string()),
        }
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

/// Instants are stored as UTC wall-clock time.
impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v.naive_utc())
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_to_text_null_is_absent() {
        assert_eq!(SqlValue::Null.to_text(), None);
        assert_eq!(SqlValue::from(None::<i32>).to_text(), None);
    }

    #[test]
    fn test_to_text_temporal_uses_fixed_format() {
        let v = SqlValue::DateTime(ts("2024-03-01 08:05:09"));
        assert_eq!(v.to_text().as_deref(), Some("2024-03-01 08:05:09"));
    }

    #[test]
    fn test_as_timestamp_from_text_layouts() {
        let expected = ts("2024-03-01 08:05:09");
        assert_eq!(
            SqlValue::from("2024-03-01 08:05:09").as_timestamp(),
            Some(expected)
        );
        assert_eq!(
            SqlValue::from("2024-03-01T08:05:09").as_timestamp(),
            Some(expected)
        );
        assert_eq!(
            SqlValue::from("2024-03-01").as_timestamp(),
            Some(ts("2024-03-01 00:00:00"))
        );
        assert_eq!(SqlValue::from("yesterday").as_timestamp(), None);
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(SqlValue::Decimal("12".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(SqlValue::Float(3.5).as_i64(), None);
        assert_eq!(SqlValue::Int(7).as_f64(), Some(7.0));
        assert_eq!(SqlValue::from("x").as_f64(), None);
    }

    #[test]
    fn test_u64_overflow_becomes_decimal() {
        assert_eq!(SqlValue::from(5u64), SqlValue::Int(5));
        assert_eq!(
            SqlValue::from(u64::MAX),
            SqlValue::Decimal(u64::MAX.to_string())
        );
    }
}
