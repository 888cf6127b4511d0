//! Parameterized SQL statements and their builder.
//!
//! A [`Statement`] is an immutable pair of SQL text and positional parameters.
//! It is assembled with a [`StatementBuilder`], which supports conditional
//! fragments for dynamically shaped queries:
//!
//! ```
//! use db_datastore::models::Statement;
//!
//! let name: Option<&str> = Some("bob");
//! let mut builder = Statement::builder();
//! builder
//!     .append("SELECT id, name FROM users WHERE 1 = 1")
//!     .append_params_if(name.is_some(), " AND name = ?", name)
//!     .append_in(" AND status IN (?)", [1, 2, 3])
//!     .limit(0, 20);
//! let statement = builder.build();
//!
//! assert_eq!(
//!     statement.sql(),
//!     "SELECT id, name FROM users WHERE 1 = 1 AND name = ? AND status IN (?,?,?) LIMIT 0,20"
//! );
//! assert_eq!(statement.params().len(), 4);
//! ```

use super::SqlValue;

/// Upper bound for the row count of a `LIMIT` clause built by [`StatementBuilder::limit`].
pub const MAX_FETCH_SIZE: i64 = 5000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn builder() -> StatementBuilder {
        StatementBuilder::new()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql, Vec::new())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql, Vec::new())
    }
}

/// Mutable, single-owner builder for [`Statement`].
#[derive(Debug, Clone, Default)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

fn collect<V: Into<SqlValue>>(params: impl IntoIterator<Item = V>) -> Vec<SqlValue> {
    params.into_iter().map(Into::into).collect()
}

impl StatementBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn append_if(&mut self, condition: bool, text: &str) -> &mut Self {
        if condition {
            self.sql.push_str(text);
        }
        self
    }

    /// Append text along with the values for its placeholders.
    pub fn append_params<V: Into<SqlValue>>(
        &mut self,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.sql.push_str(text);
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Append text and values only when `condition` holds and at least one
    /// value is supplied.
    pub fn append_params_if<V: Into<SqlValue>>(
        &mut self,
        condition: bool,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        if !condition {
            return self;
        }
        let params = collect(params);
        if params.is_empty() {
            return self;
        }
        self.sql.push_str(text);
        self.params.extend(params);
        self
    }

    pub fn prepend(&mut self, text: &str) -> &mut Self {
        self.sql.insert_str(0, text);
        self
    }

    pub fn prepend_if(&mut self, condition: bool, text: &str) -> &mut Self {
        if condition {
            self.sql.insert_str(0, text);
        }
        self
    }

    /// Prepend text; its values are placed ahead of the existing ones.
    pub fn prepend_params<V: Into<SqlValue>>(
        &mut self,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.sql.insert_str(0, text);
        self.params.splice(0..0, collect(params));
        self
    }

    pub fn prepend_params_if<V: Into<SqlValue>>(
        &mut self,
        condition: bool,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        if !condition {
            return self;
        }
        let params = collect(params);
        if params.is_empty() {
            return self;
        }
        self.sql.insert_str(0, text);
        self.params.splice(0..0, params);
        self
    }

    pub fn append_statement(&mut self, other: &Statement) -> &mut Self {
        self.sql.push_str(other.sql());
        self.params.extend_from_slice(other.params());
        self
    }

    pub fn prepend_statement(&mut self, other: &Statement) -> &mut Self {
        self.sql.insert_str(0, other.sql());
        self.params.splice(0..0, other.params().iter().cloned());
        self
    }

    /// Append a membership predicate: the first `?` in `text` becomes one
    /// placeholder per value. Nothing is appended when `params` is empty.
    pub fn append_in<V: Into<SqlValue>>(
        &mut self,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let params = collect(params);
        if params.is_empty() {
            return self;
        }
        let placeholders = vec!["?"; params.len()].join(",");
        self.sql.push_str(&text.replacen('?', &placeholders, 1));
        self.params.extend(params);
        self
    }

    pub fn append_in_if<V: Into<SqlValue>>(
        &mut self,
        condition: bool,
        text: &str,
        params: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        if condition {
            self.append_in(text, params);
        }
        self
    }

    /// Append ` LIMIT offset,count`.
    ///
    /// A non-positive offset becomes 0; a count outside `(0, MAX_FETCH_SIZE]`
    /// becomes [`MAX_FETCH_SIZE`].
    pub fn limit(&mut self, offset: i64, count: i64) -> &mut Self {
        let offset = offset.max(0);
        let count = if count <= 0 || count > MAX_FETCH_SIZE {
            MAX_FETCH_SIZE
        } else {
            count
        };
        self.sql.push_str(&format!(" LIMIT {},{}", offset, count));
        self
    }

    pub fn limit_one(&mut self) -> &mut Self {
        self.sql.push_str(" LIMIT 1");
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn clear(&mut self) -> &mut Self {
        self.sql.clear();
        self.params.clear();
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Snapshot the builder. Later mutation of the builder does not affect the
    /// returned statement.
    pub fn build(&self) -> Statement {
        Statement::new(self.sql.clone(), self.params.clone())
    }
}
