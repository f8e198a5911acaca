//! SQL executor abstraction over `may_postgres`.
//!
//! Every gateway operation goes through [`SqlExecutor`], so the same store
//! code runs against a pooled connection or an open [`Transaction`].
//!
//! [`Transaction`]: crate::transaction::Transaction

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Database-layer error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Query execution error
    Query(String),
    /// Row parsing/conversion error
    Parse(String),
    /// No executor could be acquired from the pool
    Pool(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::Query(s) => write!(f, "Query error: {s}"),
            DbError::Parse(s) => write!(f, "Parse error: {s}"),
            DbError::Pool(s) => write!(f, "Pool error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::Postgres(err)
    }
}

impl DbError {
    /// SQLSTATE code of the underlying Postgres error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            DbError::Postgres(e) => e.code().map(|c| c.code()),
            _ => None,
        }
    }

    /// `true` for `unique_violation` (23505).
    pub fn is_unique_violation(&self) -> bool {
        self.sql_state() == Some("23505")
    }

    /// `true` for `foreign_key_violation` (23503).
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sql_state() == Some("23503")
    }

    /// `true` for `check_violation` (23514).
    pub fn is_check_violation(&self) -> bool {
        self.sql_state() == Some("23514")
    }
}

/// Trait for executing database operations
///
/// Implemented by [`MayPostgresExecutor`] (a plain connection) and by
/// [`Transaction`](crate::transaction::Transaction), so callers can be written
/// once and run either inside or outside a transaction.
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query that must return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Execute a query and return all rows.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Execute a query returning zero or one row.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if more than one row comes back.
    fn query_opt(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> Result<Option<Row>, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::Query(format!("expected at most one row, got {n}"))),
        }
    }
}

/// Run `op` against the client with the query span, duration and error metrics
/// every executor shares.
pub(crate) fn instrumented<T>(
    query: &str,
    op: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = op().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        log::debug!("query failed: {e}");
        DbError::Postgres(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

/// [`SqlExecutor`] over a single `may_postgres::Client`.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a transaction at `READ COMMITTED`.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if `BEGIN` fails.
    pub fn begin(
        &self,
    ) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::new(self.client.clone())
    }
}

impl SqlExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        instrumented(query, || self.client.query(query, params))
    }
}
