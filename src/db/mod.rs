//! Database access layer.
//!
//! This module provides:
//! - The driver contract (`driver`) and its sqlx implementation (`sqlx_driver`)
//! - The named pool registry
//! - Statement execution on a single connection
//! - Parameter binding and row mapping
//! - Type mappings
//! - Backend dispatch macros for reducing code duplication

pub mod binder;
pub mod decoders;
pub mod driver;
pub mod executor;
mod macros;
pub mod mapper;
mod params;
pub mod registry;
pub mod sql_shape;
pub mod sqlx_driver;
pub mod types;

pub use binder::{ParamParser, ValuesParser, fill_statement};
pub use driver::{
    AccessMode, BoundValue, ColumnMeta, ConnectionSource, DriverConnection, KeyRetrieval,
    PoolFactory, PreparedStatement, ResultCursor, ResultRow, UpdateOutcome,
};
pub use executor::{BATCH_SIZE, SqlExecutor};
pub use mapper::{RowDecoder, RowMap, to_map_list, to_typed};
pub use registry::{ConnectionOf, InitializeSummary, PoolRegistry};
pub use sqlx_driver::{SqlxConnection, SqlxPool, SqlxPoolFactory};
pub use types::{SqlType, categorize_type};
