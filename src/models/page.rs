//! Paginated query results.

use serde::Serialize;

/// One page of rows together with the number of rows the query would have
/// matched without its `LIMIT` clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    pub total: u64,
    pub data: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn new(total: u64, data: Vec<T>) -> Self {
        Self { total, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
