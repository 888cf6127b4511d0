//! Driver capability contract.
//!
//! The executor and the registry never talk to a database library directly.
//! They go through three traits:
//!
//! - [`PoolFactory`] builds a pool from a validated definition
//! - [`ConnectionSource`] hands out connections from that pool
//! - [`DriverConnection`] prepares and runs statements on one connection
//!
//! Statements, cursors and rows are owned, driver-neutral values so that the
//! binder and the row mapper work the same way for every backend. The sqlx
//! implementation lives in [`super::sqlx_driver`].

use super::types::SqlType;
use crate::config::{PoolDefinition, PoolSettings};
use crate::error::{DbError, DbResult};
use crate::models::SqlValue;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

// =============================================================================
// Capability Traits
// =============================================================================

/// Builds a connection pool for one definition.
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    type Pool: ConnectionSource;

    async fn create_pool(
        &self,
        definition: &PoolDefinition,
        settings: &PoolSettings,
    ) -> DbResult<Self::Pool>;
}

/// A pool of connections.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: DriverConnection;

    /// Borrow a connection, waiting at most the pool's configured wait.
    async fn acquire(&self) -> DbResult<Self::Connection>;

    /// Close the pool. Connections still borrowed are closed when returned.
    async fn close(&self);
}

/// One borrowed connection.
///
/// Calls on a connection are strictly sequential; the executor owns it
/// exclusively for its whole lifetime.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    async fn set_read_only(&mut self, read_only: bool) -> DbResult<()>;

    fn is_read_only(&self) -> bool;

    /// Turning auto-commit off opens a transaction that lasts until the next
    /// commit or rollback.
    async fn set_auto_commit(&mut self, auto_commit: bool) -> DbResult<()>;

    fn is_auto_commit(&self) -> bool;

    /// Prepare `sql`, reporting its parameter slot types and result columns.
    async fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> DbResult<PreparedStatement>;

    async fn execute_query(&mut self, statement: &PreparedStatement) -> DbResult<ResultCursor>;

    async fn execute_update(&mut self, statement: &PreparedStatement) -> DbResult<UpdateOutcome>;

    /// Run every parameter set accumulated with [`PreparedStatement::add_batch`].
    /// Returns one affected-row count per set.
    async fn execute_batch(&mut self, statement: &PreparedStatement) -> DbResult<Vec<u64>>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Return the connection to its pool.
    async fn close(&mut self) -> DbResult<()>;

    fn is_closed(&self) -> bool;
}

// =============================================================================
// Statements
// =============================================================================

/// Whether an update should report generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRetrieval {
    #[default]
    Skip,
    Return,
}

/// Name and declared type of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// A value placed in a parameter slot. Nulls carry the type they were bound as.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null(SqlType),
    Value(SqlValue),
}

/// A prepared statement with its parameter slots.
///
/// Slot indexes are zero-based.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    sql: String,
    parameter_types: Vec<SqlType>,
    columns: Arc<[ColumnMeta]>,
    slots: Vec<Option<BoundValue>>,
    batch: Vec<Vec<BoundValue>>,
    key_retrieval: KeyRetrieval,
}

impl PreparedStatement {
    pub fn new(
        sql: impl Into<String>,
        parameter_types: Vec<SqlType>,
        columns: Vec<ColumnMeta>,
        key_retrieval: KeyRetrieval,
    ) -> Self {
        let slots = vec![None; parameter_types.len()];
        Self {
            sql: sql.into(),
            parameter_types,
            columns: columns.into(),
            slots,
            batch: Vec::new(),
            key_retrieval,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    /// Declared type of slot `index`; `Unknown` when the driver could not tell.
    pub fn parameter_type(&self, index: usize) -> SqlType {
        self.parameter_types
            .get(index)
            .copied()
            .unwrap_or(SqlType::Unknown)
    }

    pub fn columns(&self) -> &Arc<[ColumnMeta]> {
        &self.columns
    }

    pub fn key_retrieval(&self) -> KeyRetrieval {
        self.key_retrieval
    }

    fn slot_mut(&mut self, index: usize) -> DbResult<&mut Option<BoundValue>> {
        let count = self.slots.len();
        self.slots.get_mut(index).ok_or_else(|| {
            DbError::invalid_parameter(
                index,
                format!("statement has {count} parameter slot(s)"),
            )
        })
    }

    pub fn set_null(&mut self, index: usize, sql_type: SqlType) -> DbResult<()> {
        *self.slot_mut(index)? = Some(BoundValue::Null(sql_type));
        Ok(())
    }

    /// Bind `value` to slot `index`. A null value is bound as a null of the
    /// slot's declared type.
    pub fn set_value(&mut self, index: usize, value: SqlValue) -> DbResult<()> {
        let bound = if value.is_null() {
            BoundValue::Null(self.parameter_type(index))
        } else {
            BoundValue::Value(value)
        };
        *self.slot_mut(index)? = Some(bound);
        Ok(())
    }

    pub fn clear_parameters(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// The values currently bound, in slot order.
    pub fn bound_values(&self) -> DbResult<Vec<BoundValue>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.clone()
                    .ok_or_else(|| DbError::invalid_parameter(index, "No value specified"))
            })
            .collect()
    }

    /// Snapshot the bound values as one batch entry.
    pub fn add_batch(&mut self) -> DbResult<()> {
        let values = self.bound_values()?;
        self.batch.push(values);
        Ok(())
    }

    pub fn clear_batch(&mut self) {
        self.batch.clear();
    }

    pub fn batch(&self) -> &[Vec<BoundValue>] {
        &self.batch
    }
}

/// Outcome of a single update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub rows_affected: u64,
    /// Filled only when keys were requested and the statement produced some.
    pub generated_keys: Vec<i64>,
}

// =============================================================================
// Results
// =============================================================================

/// Forward-only iteration over a fully fetched result set.
#[derive(Debug)]
pub struct ResultCursor {
    columns: Arc<[ColumnMeta]>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl ResultCursor {
    pub fn new(columns: impl Into<Arc<[ColumnMeta]>>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into_iter(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    pub fn column_type(&self, index: usize) -> Option<SqlType> {
        self.columns.get(index).map(|c| c.sql_type)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn next_row(&mut self) -> Option<ResultRow> {
        let values = self.rows.next()?;
        Some(ResultRow {
            columns: Arc::clone(&self.columns),
            values,
        })
    }
}

impl Iterator for ResultCursor {
    type Item = ResultRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

/// One row of a [`ResultCursor`].
#[derive(Debug, Clone)]
pub struct ResultRow {
    columns: Arc<[ColumnMeta]>,
    values: Vec<SqlValue>,
}

impl ResultRow {
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Look up a value by column label, ignoring ASCII case.
    pub fn value_by_name(&self, name: &str) -> Option<&SqlValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    fn column_label(&self, index: usize) -> String {
        self.columns
            .get(index)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn get_with<T>(
        &self,
        index: usize,
        expected: &str,
        convert: impl FnOnce(&SqlValue) -> Option<T>,
    ) -> DbResult<Option<T>> {
        let value = self.values.get(index).ok_or_else(|| {
            DbError::decode(
                self.column_label(index),
                format!("row has {} column(s)", self.values.len()),
            )
        })?;
        if value.is_null() {
            return Ok(None);
        }
        convert(value).map(Some).ok_or_else(|| {
            DbError::decode(
                self.column_label(index),
                format!("cannot read {} value as {expected}", value.kind()),
            )
        })
    }

    pub fn get_i64(&self, index: usize) -> DbResult<Option<i64>> {
        self.get_with(index, "integer", SqlValue::as_i64)
    }

    pub fn get_f64(&self, index: usize) -> DbResult<Option<f64>> {
        self.get_with(index, "float", SqlValue::as_f64)
    }

    pub fn get_bool(&self, index: usize) -> DbResult<Option<bool>> {
        self.get_with(index, "boolean", SqlValue::as_bool)
    }

    pub fn get_string(&self, index: usize) -> DbResult<Option<String>> {
        self.get_with(index, "text", SqlValue::to_text)
    }

    pub fn get_timestamp(&self, index: usize) -> DbResult<Option<NaiveDateTime>> {
        self.get_with(index, "timestamp", SqlValue::as_timestamp)
    }

    pub fn get_date(&self, index: usize) -> DbResult<Option<NaiveDate>> {
        self.get_with(index, "date", SqlValue::as_date)
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// How a connection is configured when it is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-only, auto-commit on.
    #[default]
    ReadOnly,
    /// Read-write, auto-commit on.
    ReadWrite,
    /// Read-write, auto-commit off.
    Transactional,
}
