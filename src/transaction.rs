//! Transactions
//!
//! A [`Transaction`] implements [`SqlExecutor`], so registry, ledger and
//! lifecycle code run unchanged inside one. [`with_transaction`] is the
//! commit-on-`Ok`, rollback-on-`Err` scope every lifecycle operation uses.

use crate::executor::{timed, SqlExecutor, StoreError};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Other transaction errors
    Other(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::Other(s) => write!(f, "Transaction error: {s}"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => StoreError::PostgresError(e),
            TransactionError::TransactionClosed => {
                StoreError::Other("Transaction closed".to_string())
            }
            TransactionError::Other(s) => StoreError::Other(s),
        }
    }
}

/// A database transaction on a shared session
///
/// Dropping an open transaction rolls it back, so an early return or a panic
/// never leaves the session inside `BEGIN`.
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[]).map_err(TransactionError::from)?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is closed or `COMMIT` fails.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed = true;
        self.client
            .execute("COMMIT", &[])
            .map_err(TransactionError::from)?;
        Ok(())
    }

    /// Roll the transaction back
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is closed or `ROLLBACK` fails.
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed = true;
        self.client
            .execute("ROLLBACK", &[])
            .map_err(TransactionError::from)?;
        Ok(())
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Other("Transaction is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("transaction dropped while open, rolling back");
            let _ = self.client.execute("ROLLBACK", &[]);
        }
    }
}

impl SqlExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        timed(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        self.ensure_open()?;
        timed(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.ensure_open()?;
        timed(query, || self.client.query(query, params))
    }
}

/// Run `body` inside a transaction, committing on `Ok` and rolling back on `Err`.
///
/// `E` only needs a conversion from [`TransactionError`], so lifecycle code can
/// return its own error type from the closure.
///
/// # Errors
///
/// Returns the closure's error (after rollback), or the `BEGIN`/`COMMIT` failure.
pub fn with_transaction<T, E, F>(executor: &crate::PgExecutor, body: F) -> Result<T, E>
where
    F: FnOnce(&Transaction) -> Result<T, E>,
    E: From<TransactionError>,
{
    let tx = executor.begin()?;
    match body(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("rollback failed: {rollback_err}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::TransactionClosed;
        assert!(err
            .to_string()
            .contains("Transaction has already been committed"));

        let err = TransactionError::Other("boom".to_string());
        assert_eq!(err.to_string(), "Transaction error: boom");
    }

    #[test]
    fn test_transaction_error_into_store_error() {
        let store_err: StoreError = TransactionError::TransactionClosed.into();
        assert!(store_err.to_string().contains("Transaction closed"));

        let store_err: StoreError = TransactionError::Other("nested".to_string()).into();
        assert!(store_err.to_string().contains("nested"));
    }
}
