//! Literal (non-parameterized) SQL assembly.
//!
//! [`SqlText`] renders values directly into the SQL text. Textual and temporal
//! values have single quotes stripped before being quoted, which narrows but
//! does not remove injection risk.
//!
//! **Do not use with untrusted input.** Bound parameters through
//! [`StatementBuilder`](super::StatementBuilder) are the safe path.

use super::{SqlValue, Statement};
use std::fmt;

/// How a literal value is rendered into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Double,
    Float,
    Boolean,
    /// A raw SQL fragment such as `NOW()`, emitted unquoted.
    Function,
    String,
    DateTime,
}

impl FieldKind {
    fn is_quoted(self) -> bool {
        matches!(self, FieldKind::String | FieldKind::DateTime)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlText {
    sql: String,
}

impl SqlText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn prepend(&mut self, text: &str) -> &mut Self {
        self.sql.insert_str(0, text);
        self
    }

    /// Append `text` followed by `value` rendered as a literal of `kind`.
    /// A null value renders as `null` regardless of kind.
    pub fn append_literal(
        &mut self,
        text: &str,
        value: impl Into<SqlValue>,
        kind: FieldKind,
    ) -> &mut Self {
        self.sql.push_str(text);
        let literal = render_literal(&value.into(), kind);
        self.sql.push_str(&literal);
        self
    }

    pub fn append_literal_if(
        &mut self,
        condition: bool,
        text: &str,
        value: impl Into<SqlValue>,
        kind: FieldKind,
    ) -> &mut Self {
        if condition {
            self.append_literal(text, value, kind);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Convert into a statement without parameters.
    pub fn to_statement(&self) -> Statement {
        Statement::new(self.sql.clone(), Vec::new())
    }
}

impl fmt::Display for SqlText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

fn render_literal(value: &SqlValue, kind: FieldKind) -> String {
    let Some(text) = value.to_text() else {
        return "null".to_string();
    };
    if kind.is_quoted() {
        format!("'{}'", text.replace('\'', ""))
    } else {
        text
    }
}
