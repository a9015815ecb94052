//! Error types for store operations.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or mutating the allocation and
/// binding tables.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database statement failed.
    #[error("Database operation failed: {operation}: {source}")]
    Database {
        /// The operation that failed (e.g., "sync", "allocate").
        operation: String,
        /// The underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// No free id is left in the pool.
    #[error("No free id left in pool {pool} ({scope})")]
    ResourceExhausted {
        /// The pool name.
        pool: String,
        /// "global" or the switch IP of a scoped pool.
        scope: String,
    },

    /// A concurrent allocator claimed the same id.
    #[error("Allocation conflict in pool {pool}: {message}")]
    Conflict {
        /// The pool name.
        pool: String,
        /// Error message.
        message: String,
    },

    /// A stored value does not fit the domain type.
    #[error("Invalid value stored in {table}: {message}")]
    Corrupt {
        /// The table name.
        table: String,
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates a database error.
    pub fn database(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a resource exhausted error.
    pub fn exhausted(pool: impl Into<String>, scope: Option<&str>) -> Self {
        Self::ResourceExhausted {
            pool: pool.into(),
            scope: scope.unwrap_or("global").to_string(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            pool: pool.into(),
            message: message.into(),
        }
    }

    /// Creates a corrupt value error.
    pub fn corrupt(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Database { source, .. } => is_busy(source),
            _ => false,
        }
    }
}

/// SQLITE_BUSY (5) and its extended codes, or a pool wait timeout.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == 5),
        _ => false,
    }
}
