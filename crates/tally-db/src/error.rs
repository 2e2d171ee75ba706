//! # Storage Errors
//!
//! What can go wrong below the engine, and how it surfaces above it.
//!
//! ```text
//! sqlx::Error ──► DbError ──► LedgerError
//!
//!   "UNIQUE constraint failed: products.sku"   UniqueViolation   Validation(Duplicate)
//!   SQLITE_BUSY / SQLITE_LOCKED (+ extended)   Busy              ConcurrencyConflict
//!   PoolTimedOut                               PoolExhausted     ConcurrencyConflict
//!   RowNotFound                                NotFound          NotFound
//!   anything else                              ...               Storage
//! ```

use tally_core::{LedgerError, ValidationError};
use thiserror::Error;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

const UNIQUE_PREFIX: &str = "UNIQUE constraint failed: ";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is the `<table>.<column>` SQLite names in the message.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A line referenced a product, sale or batch that is not there.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The write lock stayed taken past the busy timeout, or a read snapshot
    /// went stale before its first write.
    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Sorts a driver-reported failure by SQLite's message and result code.
    fn classify(code: Option<&str>, message: &str) -> Self {
        if let Some(field) = message.strip_prefix(UNIQUE_PREFIX) {
            return DbError::duplicate(field, "unknown");
        }
        if message.contains("FOREIGN KEY constraint failed") {
            return DbError::ForeignKeyViolation(message.to_string());
        }
        if is_busy(code, message) {
            return DbError::Busy(message.to_string());
        }
        DbError::QueryFailed(message.to_string())
    }
}

/// Extended codes keep the primary code in their low byte.
fn is_busy(code: Option<&str>, message: &str) -> bool {
    let primary = code.and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff);

    matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => {
                DbError::classify(db_err.code().as_deref(), db_err.message())
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Storage failures as the engine reports them.
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                LedgerError::Validation(ValidationError::Duplicate { field, value })
            }
            DbError::Busy(reason) => LedgerError::ConcurrencyConflict(reason),
            DbError::PoolExhausted => {
                LedgerError::ConcurrencyConflict("connection pool exhausted".to_string())
            }
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
