//! # Database Error Types
//!
//! Error types for cache operations. These wrap sqlx errors and add the
//! context the sync engine and router need to decide what to do next.

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in the cache.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Database file could not be opened or created.
    ///
    /// Raised for missing parent directories that cannot be created, file
    /// permission problems, and a full disk. Fatal at initialization.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for cache operations.
pub type DbResult<T> = Result<T, DbError>;
