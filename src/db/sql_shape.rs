//! Textual checks and rewrites applied to SQL before execution.
//!
//! These operate on the raw text only; nothing here parses SQL.

use crate::error::{DbError, DbResult};
use std::borrow::Cow;

/// Side-channel query that reports how many rows the previous
/// `SQL_CALC_FOUND_ROWS` query would have matched without its `LIMIT`.
pub const FOUND_ROWS_QUERY: &str = "SELECT FOUND_ROWS()";

const CALC_FOUND_ROWS: &str = "SQL_CALC_FOUND_ROWS ";
const SELECT_PREFIX: &str = "SELECT ";

/// Append ` LIMIT 1` to a `SELECT` that has no `LIMIT` yet.
pub fn with_limit_one(sql: &str) -> Cow<'_, str> {
    let upper = sql.to_uppercase();
    if upper.contains(SELECT_PREFIX) && !upper.contains("LIMIT ") {
        Cow::Owned(format!("{sql} LIMIT 1"))
    } else {
        Cow::Borrowed(sql)
    }
}

/// Whether the statement is an `INSERT`, ignoring leading whitespace and case.
pub fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

/// Rewrite a paginated `SELECT ... LIMIT` so the server records the total
/// row count.
pub fn calc_found_rows(sql: &str) -> DbResult<Cow<'_, str>> {
    let upper = sql.to_uppercase();
    if !upper.starts_with(SELECT_PREFIX) {
        return Err(DbError::invalid_pagination_query("query must start with SELECT"));
    }
    if !upper.contains("LIMIT ") {
        return Err(DbError::invalid_pagination_query("query must contain a LIMIT clause"));
    }
    if upper.contains(CALC_FOUND_ROWS) {
        return Ok(Cow::Borrowed(sql));
    }
    let (head, tail) = sql.split_at(SELECT_PREFIX.len());
    Ok(Cow::Owned(format!("{head}{CALC_FOUND_ROWS}{tail}")))
}
