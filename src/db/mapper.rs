//! Turning result cursors into maps or typed values.

use super::driver::{ResultCursor, ResultRow};
use crate::error::DbResult;
use crate::models::{SqlValue, TIMESTAMP_FORMAT};

/// One row as column name to text. `None` is SQL NULL.
pub type RowMap = std::collections::BTreeMap<String, Option<String>>;

/// Decodes one row into a value.
///
/// Implemented for any `Fn(&ResultRow) -> DbResult<T>`, so a closure is
/// usually enough; see [`super::decoders`] for single-column decoders.
pub trait RowDecoder<T>: Send + Sync {
    fn decode(&self, row: &ResultRow) -> DbResult<T>;
}

impl<T, F> RowDecoder<T> for F
where
    F: Fn(&ResultRow) -> DbResult<T> + Send + Sync,
{
    fn decode(&self, row: &ResultRow) -> DbResult<T> {
        self(row)
    }
}

/// Drain `cursor` into one [`RowMap`] per row.
///
/// Date and timestamp columns are rendered with [`TIMESTAMP_FORMAT`]; every
/// other column uses its natural text form.
pub fn to_map_list(cursor: ResultCursor) -> Vec<RowMap> {
    let index: Vec<(String, bool)> = cursor
        .columns()
        .iter()
        .map(|c| (c.name.clone(), c.sql_type.is_date_or_timestamp()))
        .collect();

    cursor
        .map(|row| {
            index
                .iter()
                .zip(row.into_values())
                .map(|((name, temporal), value)| (name.clone(), render(&value, *temporal)))
                .collect()
        })
        .collect()
}

fn render(value: &SqlValue, temporal: bool) -> Option<String> {
    if temporal {
        if let Some(ts) = value.as_timestamp() {
            return Some(ts.format(TIMESTAMP_FORMAT).to_string());
        }
    }
    value.to_text()
}

/// Drain `cursor`, decoding each row in order.
pub fn to_typed<T, D>(cursor: ResultCursor, decoder: &D) -> DbResult<Vec<T>>
where
    D: RowDecoder<T> + ?Sized,
{
    cursor.map(|row| decoder.decode(&row)).collect()
}
