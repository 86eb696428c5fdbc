//! # Database Error Types
//!
//! Error taxonomy for repositories, the unit of work and the services.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Classification                                 │
//! │                                                                         │
//! │  NotFound         row absent                      → 404-equivalent     │
//! │  Conflict         UniqueViolation, Conflict,      → 409-equivalent     │
//! │                   Domain (business rule)                                │
//! │  ParamsError      InvalidParams, Validation       → 400-equivalent     │
//! │                   (raised before any statement)                         │
//! │  Programming      ReentrantTransaction            → fail fast           │
//! │  Infrastructure   everything else, propagated with context             │
//! │                                                                         │
//! │  Rollback wraps the ORIGINAL error when the rollback itself fails.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A compare-and-swap that loses its race is NOT an error: the primitive
//! returns `Ok(false)` and the caller decides between retry and `Conflict`.

use bistro_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `find_*` on an absent id
    /// - Counter/ledger/approval update that touched no row
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate username
    /// - Duplicate cart line (table, product, variant)
    /// - Duplicate reconciliation day
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Precondition failed: the row is not in the state the caller expected.
    ///
    /// ## When This Occurs
    /// - Table status changed under a compare-and-swap
    /// - Approval transition not allowed from the current status
    #[error("Conflict on {entity}: {reason}")]
    Conflict { entity: String, reason: String },

    /// Business rule violation reported by bistro-core.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Caller-supplied arguments are unusable.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Field-level validation failure.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// `atomic` was called while the same store already runs one on this task.
    ///
    /// Transactions are not reentrant. The outer transaction is untouched.
    #[error("Transaction already active on this store; nested atomic blocks are not supported")]
    ReentrantTransaction,

    /// The block failed and the rollback failed too.
    #[error("{source}; rollback failed: {rollback}")]
    Rollback {
        source: Box<DbError>,
        rollback: String,
    },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (ledger identity, positive quantity, ...).
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Begin/commit failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Convenience alias used by every repository.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a Conflict (precondition failed) error.
    pub fn conflict(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Creates an InvalidParams error.
    pub fn invalid(message: impl Into<String>) -> Self {
        DbError::InvalidParams(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Unique violations, failed preconditions and business rule violations.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { .. } | DbError::Conflict { .. } | DbError::Domain(_)
        )
    }

    pub fn is_params_error(&self) -> bool {
        matches!(self, DbError::InvalidParams(_) | DbError::Validation(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>[, <table>.<column>]"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

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

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("JSON encoding failed: {err}"))
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while reading [`DbConfig`](crate::DbConfig) from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
