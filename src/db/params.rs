//! Parameter binding utilities for database queries.
//!
//! This module binds [`BoundValue`]s to database-specific query objects.
//! Nulls are bound with the type of the slot they were set on so the server
//! sees a typed NULL.

use super::driver::BoundValue;
use super::types::SqlType;
use crate::models::SqlValue;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Sqlite};

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;
type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(query: MySqlQuery<'q>, value: &'q BoundValue) -> MySqlQuery<'q> {
    let value = match value {
        BoundValue::Null(sql_type) => return bind_mysql_null(query, *sql_type),
        BoundValue::Value(value) => value,
    };
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Decimal(v) | SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(Json(v)),
    }
}

fn bind_mysql_null(query: MySqlQuery<'_>, sql_type: SqlType) -> MySqlQuery<'_> {
    match sql_type {
        SqlType::Integer => query.bind(None::<i64>),
        SqlType::Float => query.bind(None::<f64>),
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::Binary => query.bind(None::<Vec<u8>>),
        SqlType::Date => query.bind(None::<NaiveDate>),
        SqlType::Time => query.bind(None::<NaiveTime>),
        SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
        _ => query.bind(None::<String>),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: SqliteQuery<'q>,
    value: &'q BoundValue,
) -> SqliteQuery<'q> {
    let value = match value {
        BoundValue::Null(sql_type) => return bind_sqlite_null(query, *sql_type),
        BoundValue::Value(value) => value,
    };
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Decimal(v) | SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        // SQLite doesn't have native JSON type, store as string
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

fn bind_sqlite_null(query: SqliteQuery<'_>, sql_type: SqlType) -> SqliteQuery<'_> {
    match sql_type {
        SqlType::Integer | SqlType::Boolean => query.bind(None::<i64>),
        SqlType::Float => query.bind(None::<f64>),
        SqlType::Binary => query.bind(None::<Vec<u8>>),
        _ => query.bind(None::<String>),
    }
}
