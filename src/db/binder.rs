//! Binding statement parameters to prepared statements.

use super::driver::PreparedStatement;
use super::types::SqlType;
use crate::error::{DbError, DbResult};
use crate::models::SqlValue;

/// Bind `params` to the slots of `statement`, in order.
///
/// Nulls become typed nulls of the slot's declared type. `Date` and
/// `Timestamp` slots receive the value converted to the matching native
/// temporal value; anything else is bound as-is.
///
/// The sqlx backend reports no slot types for MySQL or SQLite, so there every
/// slot is `Unknown` and values take the as-is path.
pub fn fill_statement(statement: &mut PreparedStatement, params: &[SqlValue]) -> DbResult<()> {
    let expected = statement.parameter_count();
    if expected != params.len() {
        return Err(DbError::parameter_count_mismatch(expected, params.len()));
    }

    for (index, value) in params.iter().enumerate() {
        let slot_type = statement.parameter_type(index);
        if value.is_null() {
            statement.set_null(index, slot_type)?;
            continue;
        }
        let value = match slot_type {
            SqlType::Date => value
                .as_date()
                .map(SqlValue::Date)
                .ok_or_else(|| conversion_error(index, value, "date"))?,
            SqlType::Timestamp => value
                .as_timestamp()
                .map(SqlValue::DateTime)
                .ok_or_else(|| conversion_error(index, value, "timestamp"))?,
            _ => value.clone(),
        };
        statement.set_value(index, value)?;
    }
    Ok(())
}

fn conversion_error(index: usize, value: &SqlValue, target: &str) -> DbError {
    DbError::invalid_parameter(index, format!("cannot convert {} value to {target}", value.kind()))
}

/// Supplies the SQL and binds one item for the write operations of the
/// executor.
pub trait ParamParser<T: ?Sized>: Send + Sync {
    fn sql(&self) -> &str;

    fn bind(&self, statement: &mut PreparedStatement, item: &T) -> DbResult<()>;
}

/// A [`ParamParser`] that maps each item to a value list and binds it through
/// [`fill_statement`].
///
/// ```
/// use db_datastore::db::ValuesParser;
/// use db_datastore::models::SqlValue;
///
/// struct User { name: String, age: i64 }
///
/// let parser = ValuesParser::new("INSERT INTO users (name, age) VALUES (?, ?)", |u: &User| {
///     vec![SqlValue::from(u.name.as_str()), SqlValue::Int(u.age)]
/// });
/// # let _ = parser;
/// ```
pub struct ValuesParser<F> {
    sql: String,
    values: F,
}

impl<F> ValuesParser<F> {
    pub fn new(sql: impl Into<String>, values: F) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl<T, F> ParamParser<T> for ValuesParser<F>
where
    T: ?Sized,
    F: Fn(&T) -> Vec<SqlValue> + Send + Sync,
{
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&self, statement: &mut PreparedStatement, item: &T) -> DbResult<()> {
        fill_statement(statement, &(self.values)(item))
    }
}
