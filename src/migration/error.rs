//! Migration-specific error types

use crate::executor::StoreError;
use crate::transaction::TransactionError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(StoreError),
    /// Migration lock timeout
    LockTimeout(String),
    /// Legacy data the normalization cannot carry over
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::LockTimeout(msg) => {
                write!(
                    f,
                    "Migration lock timeout: {msg}\n\
                     Another process may be migrating the same database. If this persists, \
                     check for a stuck process or a leftover lock row in bloodbank_migrations"
                )
            }
            MigrationError::ExecutionFailed { version, name, error } => {
                write!(
                    f,
                    "Migration '{name}' (version {version}) failed during execution: {error}"
                )
            }
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(error: StoreError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<may_postgres::Error> for MigrationError {
    fn from(error: may_postgres::Error) -> Self {
        MigrationError::Database(StoreError::PostgresError(error))
    }
}

impl From<TransactionError> for MigrationError {
    fn from(error: TransactionError) -> Self {
        MigrationError::Database(error.into())
    }
}
