//! Ready-made decoders for single-column queries.
//!
//! Each decoder reads the first column of the row.
//!
//! ```ignore
//! let count = executor.query_one(&statement, &decoders::INTEGER).await?;
//! ```

use super::driver::ResultRow;
use super::mapper::RowDecoder;
use crate::error::DbResult;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy)]
pub struct IntegerDecoder;

#[derive(Debug, Clone, Copy)]
pub struct NumberDecoder;

#[derive(Debug, Clone, Copy)]
pub struct TextDecoder;

#[derive(Debug, Clone, Copy)]
pub struct TimestampDecoder;

pub const INTEGER: IntegerDecoder = IntegerDecoder;
pub const NUMBER: NumberDecoder = NumberDecoder;
pub const TEXT: TextDecoder = TextDecoder;
pub const TIMESTAMP: TimestampDecoder = TimestampDecoder;

impl RowDecoder<Option<i64>> for IntegerDecoder {
    fn decode(&self, row: &ResultRow) -> DbResult<Option<i64>> {
        row.get_i64(0)
    }
}

impl RowDecoder<Option<f64>> for NumberDecoder {
    fn decode(&self, row: &ResultRow) -> DbResult<Option<f64>> {
        row.get_f64(0)
    }
}

impl RowDecoder<Option<String>> for TextDecoder {
    fn decode(&self, row: &ResultRow) -> DbResult<Option<String>> {
        row.get_string(0)
    }
}

impl RowDecoder<Option<NaiveDateTime>> for TimestampDecoder {
    fn decode(&self, row: &ResultRow) -> DbResult<Option<NaiveDateTime>> {
        row.get_timestamp(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{ColumnMeta, ResultCursor};
    use crate::db::mapper::to_typed;
    use crate::db::types::SqlType;
    use crate::models::SqlValue;

    fn single(value: SqlValue) -> ResultCursor {
        ResultCursor::new(vec![ColumnMeta::new("v", SqlType::Unknown)], vec![vec![value]])
    }

    #[test]
    fn test_builtin_decoders() {
        assert_eq!(to_typed(single(SqlValue::Int(4)), &INTEGER).unwrap(), vec![Some(4)]);
        assert_eq!(to_typed(single(SqlValue::Int(4)), &NUMBER).unwrap(), vec![Some(4.0)]);
        assert_eq!(
            to_typed(single(SqlValue::Float(2.5)), &TEXT).unwrap(),
            vec![Some("2.5".to_string())]
        );
        let ts = to_typed(single(SqlValue::from("2024-02-03 04:05:06")), &TIMESTAMP).unwrap();
        assert!(ts[0].is_some());
    }

    #[test]
    fn test_builtin_decoders_null() {
        assert_eq!(to_typed(single(SqlValue::Null), &INTEGER).unwrap(), vec![None]);
        assert_eq!(to_typed(single(SqlValue::Null), &TIMESTAMP).unwrap(), vec![None]);
    }
}
