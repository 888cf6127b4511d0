//! sqlx-backed implementation of the driver contract.
//!
//! Uses database-specific pools (`MySqlPool`, `SqlitePool`) rather than
//! `AnyPool` to keep full type support.
//!
//! # Connection state
//!
//! sqlx connections carry no read-only or auto-commit flag, so both are
//! emulated per connection:
//!
//! | | MySQL | SQLite |
//! |---|---|---|
//! | read-only | `SET SESSION TRANSACTION READ ONLY` | `PRAGMA query_only` |
//! | auto-commit off | `SET autocommit = 0` | explicit `BEGIN` |
//!
//! A connection is returned to its pool only in the default state (read-write,
//! auto-commit on). One that cannot be restored is detached from the pool and
//! closed.

use super::driver::{
    ColumnMeta, ConnectionSource, DriverConnection, KeyRetrieval, PoolFactory, PreparedStatement,
    ResultCursor, UpdateOutcome,
};
use super::macros::{dispatch_backend, with_validation_hooks};
use super::params::{bind_mysql_value, bind_sqlite_value};
use super::types::{self, SqlType, categorize_type};
use crate::config::{DriverKind, PoolDefinition, PoolSettings, strip_jdbc_prefix};
use crate::error::{DbError, DbResult};
use crate::models::SqlValue;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{
    ConnectOptions, Database, Either, Executor, MySql, MySqlPool, Row, Sqlite, SqlitePool,
    Statement as _, TypeInfo,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Factory
// =============================================================================

/// Builds sqlx pools for MySQL and SQLite definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxPoolFactory;

#[async_trait]
impl PoolFactory for SqlxPoolFactory {
    type Pool = SqlxPool;

    async fn create_pool(
        &self,
        definition: &PoolDefinition,
        settings: &PoolSettings,
    ) -> DbResult<SqlxPool> {
        let id = definition.pool_id();
        let kind = definition.driver_kind().ok_or_else(|| {
            DbError::configuration(
                id,
                format!(
                    "unsupported driver '{}' for url {}",
                    definition.driver.as_deref().unwrap_or(""),
                    definition.masked_url()
                ),
            )
        })?;
        log_unsupported_settings(id, settings);

        let url = strip_jdbc_prefix(&definition.url);
        let pool = match kind {
            DriverKind::MySql => {
                let mut options = MySqlConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(kind, &e))?
                    .username(&definition.username)
                    .password(&definition.password)
                    .charset("utf8mb4")
                    .statement_cache_capacity(settings.statement_cache_capacity());
                if !settings.has_filter("log") {
                    options = options.disable_statement_logging();
                }

                let pool_options = with_validation_hooks!(
                    pool_options::<MySql>(MySqlPoolOptions::new(), settings, kind),
                    settings
                );
                let pool = pool_options
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_failed(kind, &e))?;
                SqlxPool::MySql(pool)
            }
            DriverKind::Sqlite => {
                let mut options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(kind, &e))?
                    .create_if_missing(true)
                    .statement_cache_capacity(settings.statement_cache_capacity());
                if !settings.has_filter("log") {
                    options = options.disable_statement_logging();
                }

                let pool_options = with_validation_hooks!(
                    pool_options::<Sqlite>(SqlitePoolOptions::new(), settings, kind),
                    settings
                );
                let pool = pool_options
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_failed(kind, &e))?;
                SqlxPool::Sqlite(pool)
            }
        };

        pool.warm_up(settings.initial_size).await?;
        info!(
            pool_id = %id,
            driver = %kind,
            max_connections = settings.max_active_or_default(kind),
            "Pool created"
        );
        Ok(pool)
    }
}

/// Apply the settings shared by every backend.
fn pool_options<DB: Database>(
    options: sqlx::pool::PoolOptions<DB>,
    settings: &PoolSettings,
    kind: DriverKind,
) -> sqlx::pool::PoolOptions<DB> {
    options
        .min_connections(settings.min_idle)
        .max_connections(settings.max_active_or_default(kind))
        .acquire_timeout(settings.max_wait)
        .idle_timeout(Some(settings.min_evictable_idle))
        .test_before_acquire(settings.test_on_borrow)
}

fn log_unsupported_settings(id: &str, settings: &PoolSettings) {
    if settings.test_while_idle {
        debug!(pool_id = %id, "test_while_idle has no sqlx counterpart; idle connections are reaped instead");
    }
    debug!(
        pool_id = %id,
        eviction_interval = ?settings.eviction_interval,
        "Idle reaping interval is managed by sqlx"
    );
    if settings.validation_query.is_some() && !settings.test_on_borrow && !settings.test_on_return {
        debug!(pool_id = %id, "validation_query set but neither test_on_borrow nor test_on_return is enabled");
    }
}

fn invalid_url(kind: DriverKind, error: &sqlx::Error) -> DbError {
    DbError::connection(
        format!("Invalid {kind} connection string: {error}"),
        url_format_hint(kind),
    )
}

fn connect_failed(kind: DriverKind, error: &sqlx::Error) -> DbError {
    DbError::connection(format!("Failed to connect: {error}"), connection_suggestion(kind, error))
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(kind: DriverKind, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {kind} server is running and accessible");
    }
    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify the username and password of the pool definition".to_string();
    }
    if error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }
    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }
    url_format_hint(kind).to_string()
}

fn url_format_hint(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::MySql => "Verify the connection string format: mysql://host:3306/db",
        DriverKind::Sqlite => "Verify the file path is accessible: sqlite:path/to/db.sqlite",
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum SqlxPool {
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl SqlxPool {
    pub fn kind(&self) -> DriverKind {
        match self {
            SqlxPool::MySql(_) => DriverKind::MySql,
            SqlxPool::Sqlite(_) => DriverKind::Sqlite,
        }
    }

    /// Connections currently open, idle or in use.
    pub fn size(&self) -> u32 {
        dispatch_backend!(self, SqlxPool, pool => pool.size())
    }

    /// Open `count` connections up front and return them to the pool.
    async fn warm_up(&self, count: u32) -> DbResult<()> {
        if count == 0 {
            return Ok(());
        }
        dispatch_backend!(self, SqlxPool, pool => {
            let mut opened = Vec::with_capacity(count as usize);
            for _ in 0..count {
                opened.push(pool.acquire().await?);
            }
        });
        debug!(count, "Pool warmed up");
        Ok(())
    }
}

#[async_trait]
impl ConnectionSource for SqlxPool {
    type Connection = SqlxConnection;

    async fn acquire(&self) -> DbResult<SqlxConnection> {
        let handle = match self {
            SqlxPool::MySql(pool) => ConnectionHandle::MySql(pool.acquire().await?),
            SqlxPool::Sqlite(pool) => ConnectionHandle::Sqlite(pool.acquire().await?),
        };
        Ok(SqlxConnection::new(handle))
    }

    async fn close(&self) {
        dispatch_backend!(self, SqlxPool, pool => pool.close().await)
    }
}

// =============================================================================
// Connection
// =============================================================================

enum ConnectionHandle {
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
}

impl ConnectionHandle {
    fn kind(&self) -> DriverKind {
        match self {
            ConnectionHandle::MySql(_) => DriverKind::MySql,
            ConnectionHandle::Sqlite(_) => DriverKind::Sqlite,
        }
    }

    /// Take the connection out of its pool; it is closed when dropped.
    fn detach(self) {
        dispatch_backend!(self, ConnectionHandle, conn => drop(conn.detach()))
    }

    /// Run a statement through the simple (unprepared) protocol.
    async fn run(&mut self, sql: &str) -> DbResult<()> {
        dispatch_backend!(self, ConnectionHandle, conn => {
            (&mut **conn).execute(sql).await?;
        });
        Ok(())
    }
}

/// A pooled sqlx connection with emulated read-only and auto-commit state.
pub struct SqlxConnection {
    handle: Option<ConnectionHandle>,
    read_only: bool,
    auto_commit: bool,
}

impl SqlxConnection {
    fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle: Some(handle),
            read_only: false,
            auto_commit: true,
        }
    }

    pub fn kind(&self) -> Option<DriverKind> {
        self.handle.as_ref().map(ConnectionHandle::kind)
    }

    fn handle_mut(&mut self) -> DbResult<&mut ConnectionHandle> {
        self.handle.as_mut().ok_or(DbError::ConnectionReleased)
    }

    fn is_dirty(&self) -> bool {
        self.read_only || !self.auto_commit
    }

    /// Bring the connection back to read-write with auto-commit on, rolling
    /// back any open transaction.
    async fn restore(&mut self) -> DbResult<()> {
        if !self.auto_commit {
            self.rollback().await?;
            self.set_auto_commit(true).await?;
        }
        if self.read_only {
            self.set_read_only(false).await?;
        }
        Ok(())
    }

    async fn finish_transaction(&mut self, verb: &str) -> DbResult<()> {
        if self.auto_commit {
            return Ok(());
        }
        let handle = self.handle_mut()?;
        handle.run(verb).await?;
        // SQLite has no session-level auto-commit switch; keep a transaction open.
        if handle.kind() == DriverKind::Sqlite {
            handle.run("BEGIN").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for SqlxConnection {
    async fn set_read_only(&mut self, read_only: bool) -> DbResult<()> {
        let handle = self.handle_mut()?;
        let sql = match (handle.kind(), read_only) {
            (DriverKind::MySql, true) => "SET SESSION TRANSACTION READ ONLY",
            (DriverKind::MySql, false) => "SET SESSION TRANSACTION READ WRITE",
            (DriverKind::Sqlite, true) => "PRAGMA query_only = ON",
            (DriverKind::Sqlite, false) => "PRAGMA query_only = OFF",
        };
        handle.run(sql).await?;
        self.read_only = read_only;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> DbResult<()> {
        if self.auto_commit == auto_commit {
            return Ok(());
        }
        let handle = self.handle_mut()?;
        let sql = match (handle.kind(), auto_commit) {
            (DriverKind::MySql, true) => "SET autocommit = 1",
            (DriverKind::MySql, false) => "SET autocommit = 0",
            // Re-enabling auto-commit commits the open transaction
            (DriverKind::Sqlite, true) => "COMMIT",
            (DriverKind::Sqlite, false) => "BEGIN",
        };
        handle.run(sql).await?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> DbResult<PreparedStatement> {
        let handle = self.handle_mut()?;
        let kind = handle.kind();
        let (parameter_types, columns) = dispatch_backend!(handle, ConnectionHandle, conn => {
            let statement = (&mut **conn).prepare(sql).await?;
            (
                parameter_types(statement.parameters(), sql, kind),
                column_meta(statement.columns(), kind),
            )
        });
        Ok(PreparedStatement::new(sql, parameter_types, columns, keys))
    }

    async fn execute_query(&mut self, statement: &PreparedStatement) -> DbResult<ResultCursor> {
        let values = statement.bound_values()?;
        let prepared_columns = Arc::clone(statement.columns());
        let handle = self.handle_mut()?;

        let (columns, rows) = match handle {
            ConnectionHandle::MySql(conn) => {
                let mut query = sqlx::query(statement.sql());
                for value in &values {
                    query = bind_mysql_value(query, value);
                }
                let rows = query.fetch_all(&mut **conn).await?;
                let columns = resolve_columns(prepared_columns, rows.first(), DriverKind::MySql);
                let decoded = rows
                    .iter()
                    .map(|row| decode_mysql_row(row, &columns))
                    .collect::<DbResult<Vec<_>>>()?;
                (columns, decoded)
            }
            ConnectionHandle::Sqlite(conn) => {
                let mut query = sqlx::query(statement.sql());
                for value in &values {
                    query = bind_sqlite_value(query, value);
                }
                let rows = query.fetch_all(&mut **conn).await?;
                let columns = resolve_columns(prepared_columns, rows.first(), DriverKind::Sqlite);
                let decoded = rows
                    .iter()
                    .map(|row| decode_sqlite_row(row, &columns))
                    .collect::<DbResult<Vec<_>>>()?;
                (columns, decoded)
            }
        };
        Ok(ResultCursor::new(columns, rows))
    }

    async fn execute_update(&mut self, statement: &PreparedStatement) -> DbResult<UpdateOutcome> {
        let values = statement.bound_values()?;
        let want_keys = statement.key_retrieval() == KeyRetrieval::Return;
        let handle = self.handle_mut()?;

        let outcome = match handle {
            ConnectionHandle::MySql(conn) => {
                let mut query = sqlx::query(statement.sql());
                for value in &values {
                    query = bind_mysql_value(query, value);
                }
                let result = query.execute(&mut **conn).await?;
                let rows_affected = result.rows_affected();
                let first_id = result.last_insert_id();
                // Multi-row inserts report the first generated id
                let generated_keys = if want_keys && first_id > 0 {
                    (0..rows_affected)
                        .filter_map(|offset| i64::try_from(first_id + offset).ok())
                        .collect()
                } else {
                    Vec::new()
                };
                UpdateOutcome {
                    rows_affected,
                    generated_keys,
                }
            }
            ConnectionHandle::Sqlite(conn) => {
                let mut query = sqlx::query(statement.sql());
                for value in &values {
                    query = bind_sqlite_value(query, value);
                }
                let result = query.execute(&mut **conn).await?;
                let rows_affected = result.rows_affected();
                let generated_keys = if want_keys && rows_affected > 0 {
                    vec![result.last_insert_rowid()]
                } else {
                    Vec::new()
                };
                UpdateOutcome {
                    rows_affected,
                    generated_keys,
                }
            }
        };
        Ok(outcome)
    }

    async fn execute_batch(&mut self, statement: &PreparedStatement) -> DbResult<Vec<u64>> {
        let handle = self.handle_mut()?;
        let mut counts = Vec::with_capacity(statement.batch().len());

        match handle {
            ConnectionHandle::MySql(conn) => {
                for values in statement.batch() {
                    let mut query = sqlx::query(statement.sql());
                    for value in values {
                        query = bind_mysql_value(query, value);
                    }
                    counts.push(query.execute(&mut **conn).await?.rows_affected());
                }
            }
            ConnectionHandle::Sqlite(conn) => {
                for values in statement.batch() {
                    let mut query = sqlx::query(statement.sql());
                    for value in values {
                        query = bind_sqlite_value(query, value);
                    }
                    counts.push(query.execute(&mut **conn).await?.rows_affected());
                }
            }
        }
        Ok(counts)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.finish_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.finish_transaction("ROLLBACK").await
    }

    async fn close(&mut self) -> DbResult<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        let restored = self.restore().await;
        if let Some(handle) = self.handle.take() {
            if restored.is_err() {
                handle.detach();
            }
            // Otherwise dropping the handle returns it to the pool
        }
        restored
    }

    fn is_closed(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for SqlxConnection {
    fn drop(&mut self) {
        let dirty = self.is_dirty();
        if let Some(handle) = self.handle.take() {
            if dirty {
                warn!("Connection dropped with read-only or open transaction state; discarding it");
                handle.detach();
            }
        }
    }
}

// =============================================================================
// Metadata and decoding
// =============================================================================

fn parameter_types<T: TypeInfo>(
    parameters: Option<Either<&[T], usize>>,
    sql: &str,
    kind: DriverKind,
) -> Vec<SqlType> {
    match parameters {
        Some(Either::Left(types)) => types
            .iter()
            .map(|t| categorize_type(t.name(), kind))
            .collect(),
        Some(Either::Right(count)) => vec![SqlType::Unknown; count],
        // Driver could not describe the statement; fall back to placeholders
        None => vec![SqlType::Unknown; sql.matches('?').count()],
    }
}

fn column_meta<C: sqlx::Column>(columns: &[C], kind: DriverKind) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|c| ColumnMeta::new(c.name(), categorize_type(c.type_info().name(), kind)))
        .collect()
}

/// Prefer prepared metadata; fall back to the first row when the driver did
/// not describe the result set.
fn resolve_columns<R: Row>(
    prepared: Arc<[ColumnMeta]>,
    first_row: Option<&R>,
    kind: DriverKind,
) -> Arc<[ColumnMeta]> {
    match first_row {
        Some(row) if prepared.len() != row.len() => column_meta(row.columns(), kind).into(),
        _ => prepared,
    }
}

fn column_type(columns: &[ColumnMeta], idx: usize) -> SqlType {
    columns.get(idx).map_or(SqlType::Unknown, |c| c.sql_type)
}

fn decode_mysql_row(row: &MySqlRow, columns: &[ColumnMeta]) -> DbResult<Vec<SqlValue>> {
    (0..row.len())
        .map(|idx| types::mysql::decode_column(row, idx, column_type(columns, idx)))
        .collect()
}

fn decode_sqlite_row(row: &SqliteRow, columns: &[ColumnMeta]) -> DbResult<Vec<SqlValue>> {
    (0..row.len())
        .map(|idx| types::sqlite::decode_column(row, idx, column_type(columns, idx)))
        .collect()
}
