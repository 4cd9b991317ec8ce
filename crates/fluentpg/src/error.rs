//! Error types for fluentpg

use thiserror::Error;
use tokio_postgres::types::ToSql;

/// Result type alias for fluentpg operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error, carrying the attempted SQL and bindings
    #[error("Query error: {source} (sql: {sql}, bindings: [{}])", bindings.join(", "))]
    Query {
        sql: String,
        bindings: Vec<String>,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Builder misuse detected before execution
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classify a driver error, attaching the attempted SQL and bindings.
    ///
    /// Constraint violations (SQLSTATE 23505/23503/23514) map to their own
    /// variants; everything else becomes [`DbError::Query`] so callers can
    /// inspect the statement that failed.
    pub fn from_db_error(
        err: tokio_postgres::Error,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{constraint}: {message}")),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{constraint}: {message}"));
                }
                "23514" => return Self::CheckViolation(format!("{constraint}: {message}")),
                _ => {}
            }
        }
        Self::Query {
            sql: sql.to_string(),
            bindings: params.iter().map(|p| format!("{p:?}")).collect(),
            source: err,
        }
    }

    /// Wrap a driver error raised outside statement execution (BEGIN/COMMIT/ROLLBACK).
    pub fn from_tx_error(err: tokio_postgres::Error) -> Self {
        Self::from_db_error(err, "", &[])
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
