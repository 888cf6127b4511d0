//! Statement execution on one borrowed connection.
//!
//! A [`SqlExecutor`] owns exactly one connection for its whole lifetime and
//! runs every operation on it in call order. Prepared statements and cursors
//! are owned values, so they are released on every path when they go out of
//! scope.
//!
//! The executor must be released with one of [`SqlExecutor::close_quietly`],
//! [`SqlExecutor::commit_and_close`] or [`SqlExecutor::rollback_and_close`].
//! Releasing restores the connection to read-write with auto-commit on, rolling
//! back anything uncommitted, before handing it back to its pool. After that
//! every operation fails with [`DbError::ConnectionReleased`].

use super::binder::{ParamParser, fill_statement};
use super::driver::{DriverConnection, KeyRetrieval, PreparedStatement, ResultCursor};
use super::mapper::{RowDecoder, RowMap, to_map_list, to_typed};
use super::sql_shape::{FOUND_ROWS_QUERY, calc_found_rows, is_insert, with_limit_one};
use crate::error::{DbError, DbResult};
use crate::models::{PageResult, SqlValue, Statement};
use tracing::{debug, warn};

/// Number of parameter sets sent to the server per batch round-trip.
pub const BATCH_SIZE: usize = 5000;

/// Executes statements on a single connection. Not shareable between tasks.
pub struct SqlExecutor<C: DriverConnection> {
    conn: Option<C>,
    batch_size: usize,
}

impl<C: DriverConnection> SqlExecutor<C> {
    /// Wrap an open connection.
    pub fn new(conn: C) -> DbResult<Self> {
        if conn.is_closed() {
            return Err(DbError::connection(
                "Connection is closed",
                "Acquire a fresh connection from the pool",
            ));
        }
        Ok(Self {
            conn: Some(conn),
            batch_size: BATCH_SIZE,
        })
    }

    /// Override the batch flush threshold used by [`Self::persist_batch`].
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&mut self) -> DbResult<&mut C> {
        self.conn.as_mut().ok_or(DbError::ConnectionReleased)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run a query and return every row as a column-name to text map.
    pub async fn query_map_list(&mut self, statement: &Statement) -> DbResult<Vec<RowMap>> {
        let cursor = self.run_query(statement.sql(), statement.params()).await?;
        Ok(to_map_list(cursor))
    }

    /// Like [`Self::query_map_list`], keeping only the first row.
    pub async fn query_one_map(&mut self, statement: &Statement) -> DbResult<Option<RowMap>> {
        let rows = self.query_map_list(statement).await?;
        Ok(rows.into_iter().next())
    }

    /// Decode the first row, if any.
    ///
    /// A `SELECT` without a `LIMIT` gets ` LIMIT 1` appended first.
    pub async fn query_one<T, D>(&mut self, statement: &Statement, decoder: &D) -> DbResult<Option<T>>
    where
        D: RowDecoder<T> + ?Sized,
    {
        let sql = with_limit_one(statement.sql());
        let mut cursor = self.run_query(&sql, statement.params()).await?;
        cursor.next_row().map(|row| decoder.decode(&row)).transpose()
    }

    /// Decode every row, in order.
    pub async fn query_list<T, D>(&mut self, statement: &Statement, decoder: &D) -> DbResult<Vec<T>>
    where
        D: RowDecoder<T> + ?Sized,
    {
        let cursor = self.run_query(statement.sql(), statement.params()).await?;
        to_typed(cursor, decoder)
    }

    // =========================================================================
    // Pagination (MySQL)
    // =========================================================================

    /// Run a `SELECT ... LIMIT` query and report the total number of rows it
    /// would match without the limit.
    pub async fn query_page_list<T, D>(
        &mut self,
        statement: &Statement,
        decoder: &D,
    ) -> DbResult<PageResult<T>>
    where
        D: RowDecoder<T> + ?Sized,
    {
        let sql = calc_found_rows(statement.sql())?;
        let cursor = self.run_query(&sql, statement.params()).await?;
        let data = to_typed(cursor, decoder)?;
        let total = self.found_rows().await?;
        Ok(PageResult::new(total, data))
    }

    /// Map-list variant of [`Self::query_page_list`].
    pub async fn query_page_map_list(&mut self, statement: &Statement) -> DbResult<PageResult<RowMap>> {
        let sql = calc_found_rows(statement.sql())?;
        let cursor = self.run_query(&sql, statement.params()).await?;
        let data = to_map_list(cursor);
        let total = self.found_rows().await?;
        Ok(PageResult::new(total, data))
    }

    async fn found_rows(&mut self) -> DbResult<u64> {
        let mut cursor = self.run_query(FOUND_ROWS_QUERY, &[]).await?;
        let total = match cursor.next_row() {
            Some(row) => row.get_i64(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or(0))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Bind one item and execute the parser's statement.
    pub async fn persist<T, P>(&mut self, item: &T, parser: &P) -> DbResult<u64>
    where
        T: ?Sized,
        P: ParamParser<T> + ?Sized,
    {
        let conn = self.conn()?;
        debug!(sql = %parser.sql(), "Executing update");
        let mut prepared = conn.prepare(parser.sql(), KeyRetrieval::Skip).await?;
        parser.bind(&mut prepared, item)?;
        let outcome = conn.execute_update(&prepared).await?;
        Ok(outcome.rows_affected)
    }

    /// Bind every item into one prepared statement and execute in batches of
    /// [`Self::batch_size`] parameter sets. Returns the summed row counts.
    ///
    /// A failing flush aborts the call; sets flushed before it stay applied.
    pub async fn persist_batch<T, P>(&mut self, items: &[T], parser: &P) -> DbResult<u64>
    where
        P: ParamParser<T> + ?Sized,
    {
        let batch_size = self.batch_size;
        let conn = self.conn()?;
        if items.is_empty() {
            return Ok(0);
        }

        debug!(sql = %parser.sql(), items = items.len(), batch_size, "Executing batch");
        let mut prepared = conn.prepare(parser.sql(), KeyRetrieval::Skip).await?;
        let mut total = 0;
        for (i, item) in items.iter().enumerate() {
            parser.bind(&mut prepared, item)?;
            prepared.add_batch()?;
            if (i + 1) % batch_size == 0 {
                total += flush(conn, &mut prepared).await?;
            }
        }
        if !prepared.batch().is_empty() {
            total += flush(conn, &mut prepared).await?;
        }
        Ok(total)
    }

    /// Execute an `INSERT` and return the keys it generated.
    pub async fn persist_and_get_key(&mut self, statement: &Statement) -> DbResult<Vec<i64>> {
        if !is_insert(statement.sql()) {
            return Err(DbError::NotAnInsert);
        }
        let conn = self.conn()?;
        debug!(sql = %statement.sql(), params = statement.params().len(), "Executing insert");
        let prepared =
            prepare_bound(conn, statement.sql(), statement.params(), KeyRetrieval::Return).await?;
        let outcome = conn.execute_update(&prepared).await?;
        Ok(outcome.generated_keys)
    }

    pub async fn persist_or_update(&mut self, statement: &Statement) -> DbResult<u64> {
        let conn = self.conn()?;
        debug!(sql = %statement.sql(), params = statement.params().len(), "Executing update");
        let prepared =
            prepare_bound(conn, statement.sql(), statement.params(), KeyRetrieval::Skip).await?;
        let outcome = conn.execute_update(&prepared).await?;
        Ok(outcome.rows_affected)
    }

    /// Execute each statement independently, in order.
    ///
    /// The first failure is returned; statements already executed are not
    /// undone here.
    pub async fn persist_or_update_all(&mut self, statements: &[Statement]) -> DbResult<Vec<u64>> {
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            counts.push(self.persist_or_update(statement).await?);
        }
        Ok(counts)
    }

    // =========================================================================
    // Transactions and release
    // =========================================================================

    /// Commit, logging instead of returning any failure.
    pub async fn commit(&mut self) {
        match self.conn() {
            Ok(conn) => {
                if let Err(e) = conn.commit().await {
                    warn!(error = %e, "Commit failed");
                }
            }
            Err(e) => warn!(error = %e, "Commit skipped"),
        }
    }

    /// Roll back, logging instead of returning any failure.
    pub async fn rollback(&mut self) {
        match self.conn() {
            Ok(conn) => {
                if let Err(e) = conn.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
            }
            Err(e) => warn!(error = %e, "Rollback skipped"),
        }
    }

    pub async fn commit_and_close(&mut self) {
        self.commit().await;
        self.close_quietly().await;
    }

    pub async fn rollback_and_close(&mut self) {
        self.rollback().await;
        self.close_quietly().await;
    }

    /// Restore and release the connection. Safe to call more than once.
    pub async fn close_quietly(&mut self) {
        let Some(conn) = self.conn.take() else {
            debug!("Connection already released");
            return;
        };
        release(conn).await;
    }

    async fn run_query(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<ResultCursor> {
        let conn = self.conn()?;
        debug!(sql = %sql, params = params.len(), "Executing query");
        let prepared = prepare_bound(conn, sql, params, KeyRetrieval::Skip).await?;
        conn.execute_query(&prepared).await
    }
}

impl<C: DriverConnection> Drop for SqlExecutor<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        warn!("SqlExecutor dropped without being released; releasing connection in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release(conn));
            }
            // Without a runtime the connection can only be dropped; the pool
            // discards it.
            Err(_) => drop(conn),
        }
    }
}

async fn prepare_bound<C: DriverConnection>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    keys: KeyRetrieval,
) -> DbResult<PreparedStatement> {
    let mut prepared = conn.prepare(sql, keys).await?;
    fill_statement(&mut prepared, params)?;
    Ok(prepared)
}

async fn flush<C: DriverConnection>(conn: &mut C, prepared: &mut PreparedStatement) -> DbResult<u64> {
    let counts = conn.execute_batch(prepared).await?;
    prepared.clear_batch();
    Ok(counts.iter().sum())
}

/// Restore default state and return the connection to its pool.
async fn release<C: DriverConnection>(mut conn: C) {
    if !conn.is_auto_commit() {
        if let Err(e) = conn.rollback().await {
            warn!(error = %e, "Rollback before release failed");
        }
        if let Err(e) = conn.set_auto_commit(true).await {
            warn!(error = %e, "Failed to re-enable auto-commit");
        }
    }
    if conn.is_read_only() {
        if let Err(e) = conn.set_read_only(false).await {
            warn!(error = %e, "Failed to clear read-only mode");
        }
    }
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to release connection");
    }
}
