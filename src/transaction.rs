//! Transactions over a `may_postgres` client.
//!
//! A [`Transaction`] is itself a [`SqlExecutor`], so gateway code written
//! against the trait runs unchanged inside one. Dropping a transaction that
//! was neither committed nor rolled back issues `ROLLBACK`.

use crate::executor::{instrumented, DbError, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read committed (PostgreSQL default)
    #[default]
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    Postgres(PostgresError),
    /// Transaction already committed or rolled back
    Closed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::Closed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::Postgres(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Postgres(e) => DbError::Postgres(e),
            TransactionError::Closed => DbError::Other("Transaction closed".to_string()),
        }
    }
}

/// A database transaction
///
/// All statements issued through it are committed or rolled back together.
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        Self::new_with_isolation(client, IsolationLevel::ReadCommitted)
    }

    pub(crate) fn new_with_isolation(
        client: Client,
        isolation_level: IsolationLevel,
    ) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let begin = format!("BEGIN ISOLATION LEVEL {}", isolation_level.to_sql());
        client.execute(begin.as_str(), &[])?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if `COMMIT` fails or the transaction is already closed.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if `ROLLBACK` fails or the transaction is already closed.
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::Closed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed = true;
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl SqlExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}

/// Run `body` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// The body's error type only has to accept [`DbError`], so gateway code can
/// return domain errors from inside the transaction.
pub fn in_transaction<T, E, F>(
    client: &Client,
    isolation_level: IsolationLevel,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(&Transaction) -> Result<T, E>,
    E: From<DbError>,
{
    let txn = Transaction::new_with_isolation(client.clone(), isolation_level)
        .map_err(|e| E::from(DbError::from(e)))?;
    match body(&txn) {
        Ok(value) => {
            txn.commit().map_err(|e| E::from(DbError::from(e)))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback() {
                log::warn!("rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_to_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.to_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.to_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.to_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err = TransactionError::Closed;
        assert!(err.to_string().contains("already been committed"));
        let db_err: DbError = err.into();
        assert!(db_err.to_string().contains("Transaction closed"));
    }
}
