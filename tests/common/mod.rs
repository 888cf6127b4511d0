//! Scripted in-memory driver shared by the integration tests.
//!
//! Every fake connection records what it was asked to do in a shared
//! [`Journal`], so tests can assert on prepares, batch flushes and releases
//! without a database server.
#![allow(dead_code)]

use async_trait::async_trait;
use db_datastore::config::{PoolDefinition, PoolSettings};
use db_datastore::db::{
    ColumnMeta, ConnectionSource, DriverConnection, KeyRetrieval, PoolFactory, PoolRegistry,
    PreparedStatement, ResultCursor, SqlExecutor, SqlType, UpdateOutcome,
};
use db_datastore::error::{DbError, DbResult};
use db_datastore::models::SqlValue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Journal {
    pub prepared: Vec<String>,
    /// Size of every batch flush attempted, in order.
    pub flushes: Vec<usize>,
    pub commits: usize,
    pub rollbacks: usize,
    pub connection_closes: usize,
    /// Connections closed while still read-only or inside a transaction.
    pub dirty_closes: usize,
    pub pool_closes: Vec<String>,
}

/// Canned table served by every fake connection.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<SqlValue>>,
    /// One-based flush number that fails.
    pub fail_on_flush: Option<usize>,
    pub first_key: i64,
}

impl Script {
    /// `count` rows of (id, name, created_at); every third `created_at` is null.
    pub fn items(count: i64) -> Self {
        let rows = (1..=count)
            .map(|id| {
                let created = if id % 3 == 0 {
                    SqlValue::Null
                } else {
                    SqlValue::from(format!("2024-01-{:02} 10:00:00.5", id.min(28)))
                };
                vec![SqlValue::Int(id), SqlValue::from(format!("item-{id}")), created]
            })
            .collect();
        Self {
            columns: vec![
                ColumnMeta::new("id", SqlType::Integer),
                ColumnMeta::new("name", SqlType::Text),
                ColumnMeta::new("created_at", SqlType::Timestamp),
            ],
            rows,
            fail_on_flush: None,
            first_key: 100,
        }
    }
}

#[derive(Clone)]
pub struct FakeFactory {
    pub journal: Arc<Mutex<Journal>>,
    pub script: Arc<Script>,
    /// Construction attempts, per call to `create_pool`.
    pub constructions: Arc<AtomicUsize>,
    failing_ids: Arc<HashSet<String>>,
    delay: Duration,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self {
            journal: Arc::default(),
            script: Arc::new(script),
            constructions: Arc::default(),
            failing_ids: Arc::default(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing_ids = Arc::new(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolFactory for FakeFactory {
    type Pool = FakePool;

    async fn create_pool(
        &self,
        definition: &PoolDefinition,
        _settings: &PoolSettings,
    ) -> DbResult<FakePool> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let id = definition.pool_id().to_string();
        if self.failing_ids.contains(&id) {
            return Err(DbError::connection("scripted connect failure", "none"));
        }
        Ok(FakePool {
            id,
            journal: Arc::clone(&self.journal),
            script: Arc::clone(&self.script),
        })
    }
}

#[derive(Debug)]
pub struct FakePool {
    id: String,
    journal: Arc<Mutex<Journal>>,
    script: Arc<Script>,
}

#[async_trait]
impl ConnectionSource for FakePool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> DbResult<FakeConnection> {
        Ok(FakeConnection {
            journal: Arc::clone(&self.journal),
            script: Arc::clone(&self.script),
            read_only: false,
            auto_commit: true,
            closed: false,
            found_rows: 0,
            next_key: self.script.first_key,
        })
    }

    async fn close(&self) {
        self.journal.lock().unwrap().pool_closes.push(self.id.clone());
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    journal: Arc<Mutex<Journal>>,
    script: Arc<Script>,
    read_only: bool,
    auto_commit: bool,
    closed: bool,
    found_rows: i64,
    next_key: i64,
}

impl FakeConnection {
    fn check_open(&self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::ConnectionReleased);
        }
        Ok(())
    }

    /// Apply a trailing `LIMIT offset,count` or `LIMIT count`.
    fn limited_rows(&self, sql: &str) -> Vec<Vec<SqlValue>> {
        let upper = sql.to_uppercase();
        let Some(pos) = upper.rfind("LIMIT ") else {
            return self.script.rows.clone();
        };
        let clause = sql[pos + "LIMIT ".len()..].trim();
        let (offset, count) = match clause.split_once(',') {
            Some((o, c)) => (o.trim().parse().unwrap_or(0), c.trim().parse().unwrap_or(0)),
            None => (0, clause.parse().unwrap_or(0)),
        };
        self.script
            .rows
            .iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn set_read_only(&mut self, read_only: bool) -> DbResult<()> {
        self.check_open()?;
        self.read_only = read_only;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn set_auto_commit(&mut self, auto_commit: bool) -> DbResult<()> {
        self.check_open()?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn prepare(&mut self, sql: &str, keys: KeyRetrieval) -> DbResult<PreparedStatement> {
        self.check_open()?;
        self.journal.lock().unwrap().prepared.push(sql.to_string());
        if sql.contains("FAIL") {
            return Err(DbError::execution("scripted failure", Some("HY000".to_string())));
        }

        let parameter_types = vec![SqlType::Unknown; sql.matches('?').count()];
        let columns = if sql.contains("FOUND_ROWS()") && !sql.contains("SQL_CALC_FOUND_ROWS") {
            vec![ColumnMeta::new("FOUND_ROWS()", SqlType::Integer)]
        } else if sql.trim_start().to_uppercase().starts_with("SELECT") {
            self.script.columns.clone()
        } else {
            Vec::new()
        };
        Ok(PreparedStatement::new(sql, parameter_types, columns, keys))
    }

    async fn execute_query(&mut self, statement: &PreparedStatement) -> DbResult<ResultCursor> {
        self.check_open()?;
        statement.bound_values()?;
        let sql = statement.sql();

        if sql.contains("FOUND_ROWS()") && !sql.contains("SQL_CALC_FOUND_ROWS") {
            let rows = vec![vec![SqlValue::Int(self.found_rows)]];
            return Ok(ResultCursor::new(statement.columns().clone(), rows));
        }
        if sql.contains("SQL_CALC_FOUND_ROWS") {
            self.found_rows = self.script.rows.len() as i64;
        }
        let rows = self.limited_rows(sql);
        Ok(ResultCursor::new(statement.columns().clone(), rows))
    }

    async fn execute_update(&mut self, statement: &PreparedStatement) -> DbResult<UpdateOutcome> {
        self.check_open()?;
        statement.bound_values()?;
        let generated_keys = if statement.key_retrieval() == KeyRetrieval::Return {
            let key = self.next_key;
            self.next_key += 1;
            vec![key]
        } else {
            Vec::new()
        };
        Ok(UpdateOutcome {
            rows_affected: 1,
            generated_keys,
        })
    }

    async fn execute_batch(&mut self, statement: &PreparedStatement) -> DbResult<Vec<u64>> {
        self.check_open()?;
        let size = statement.batch().len();
        let flush_number = {
            let mut journal = self.journal.lock().unwrap();
            journal.flushes.push(size);
            journal.flushes.len()
        };
        if self.script.fail_on_flush == Some(flush_number) {
            return Err(DbError::execution("scripted batch failure", None));
        }
        Ok(vec![1; size])
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.journal.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.check_open()?;
        self.journal.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut journal = self.journal.lock().unwrap();
        journal.connection_closes += 1;
        if self.read_only || !self.auto_commit {
            journal.dirty_closes += 1;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub fn definition(id: &str) -> PoolDefinition {
    PoolDefinition::new(id, "mysql://localhost:3306/test", "app", "secret")
}

/// A registry with one pool `main` over `script`.
pub async fn registry(script: Script) -> (PoolRegistry<FakeFactory>, FakeFactory) {
    let factory = FakeFactory::new(script);
    let registry = PoolRegistry::with_factory(factory.clone());
    let summary = registry.initialize(&[definition("main")]).await;
    assert_eq!(summary.registered, vec!["main".to_string()]);
    (registry, factory)
}

/// A writable executor over the `main` pool of `script`.
pub async fn executor(script: Script) -> (SqlExecutor<FakeConnection>, FakeFactory) {
    let (registry, factory) = registry(script).await;
    let executor = registry.acquire_tx_executor("main").await.unwrap();
    (executor, factory)
}
