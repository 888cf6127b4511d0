//! Error types for the datastore.
//!
//! All fallible operations return [`DbResult`]. Failures raised while releasing
//! resources (close, commit, rollback on cleanup paths) are logged by the
//! caller and never converted into a `DbError` that could mask the primary one.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration for pool '{pool_id}': {message}")]
    Configuration { pool_id: String, message: String },

    #[error("Pool not found: {pool_id}")]
    PoolNotFound { pool_id: String },

    #[error("Parameter count mismatch: statement declares {expected}, {actual} supplied")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter at position {index}: {message}")]
    InvalidParameter { index: usize, message: String },

    #[error("Invalid pagination query: {reason}")]
    InvalidPaginationQuery { reason: String },

    #[error("Generated keys can only be requested for INSERT statements")]
    NotAnInsert,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42S02" for an unknown table on MySQL
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded the configured wait")]
    Timeout { operation: String },

    #[error("Failed to decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("Connection already released")]
    ConnectionReleased,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error for one pool definition.
    pub fn configuration(pool_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            pool_id: pool_id.into(),
            message: message.into(),
        }
    }

    /// Create a pool not found error.
    pub fn pool_not_found(pool_id: impl Into<String>) -> Self {
        Self::PoolNotFound {
            pool_id: pool_id.into(),
        }
    }

    pub fn parameter_count_mismatch(expected: usize, actual: usize) -> Self {
        Self::ParameterCountMismatch { expected, actual }
    }

    /// Create an invalid parameter error. `index` is zero-based.
    pub fn invalid_parameter(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            index,
            message: message.into(),
        }
    }

    pub fn invalid_pagination_query(reason: impl Into<String>) -> Self {
        Self::InvalidPaginationQuery {
            reason: reason.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolNotFound { .. } => Some("Check that the pool id was initialized and is enabled"),
            Self::InvalidPaginationQuery { .. } => {
                Some("Paginated queries must start with SELECT and carry a LIMIT clause")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this crate retries; this is a hint for callers layering their
    /// own policy on top.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection URL format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Re-initialize the pool")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::execution(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::decode(col.clone(), format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => DbError::decode(index, source.to_string()),
            sqlx::Error::Decode(source) => DbError::decode("?", source.to_string()),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
