//! Named database pools and a single-connection SQL executor.
//!
//! Pools are declared in a JSON datastore file, created once per identifier
//! by a [`PoolRegistry`](db::PoolRegistry), and used through
//! [`SqlExecutor`](db::SqlExecutor)s that own one connection each. Statements
//! are assembled with [`StatementBuilder`](models::StatementBuilder) and run
//! against MySQL or SQLite through sqlx.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::{Config, DatastoreConfig, PoolDefinition};
pub use db::{PoolRegistry, SqlExecutor};
pub use error::{DbError, DbResult};
pub use models::{PageResult, SqlValue, Statement, StatementBuilder};
