//! Data models for the datastore.
//!
//! This module re-exports the value, statement and page types shared by the
//! executor and its callers.

pub mod page;
pub mod sql_text;
pub mod statement;
pub mod value;

// Re-export commonly used types
pub use page::PageResult;
pub use sql_text::{FieldKind, SqlText};
pub use statement::{MAX_FETCH_SIZE, Statement, StatementBuilder};
pub use value::{SqlValue, TIMESTAMP_FORMAT};
