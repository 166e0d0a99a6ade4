//! Executor Module
//!
//! Provides the [`Executor`] trait that abstracts statement execution over `may_postgres`.
//!
//! The PostgreSQL binding store talks to the database only through this trait, so the
//! same row mapping code runs against a bare client and inside a [`Transaction`].
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

/// Store error type
#[derive(Debug)]
pub enum StoreError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Query execution error
    Query(String),
    /// Row parsing/conversion error
    Parse(String),
    /// Connection pool error (exhausted, closed, timed out)
    Pool(String),
    /// Transaction state error
    Transaction(String),
    /// Other store errors
    Other(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            StoreError::Query(s) => write!(f, "Query error: {s}"),
            StoreError::Parse(s) => write!(f, "Parse error: {s}"),
            StoreError::Pool(s) => write!(f, "Pool error: {s}"),
            StoreError::Transaction(s) => write!(f, "Transaction error: {s}"),
            StoreError::Other(s) => write!(f, "Store error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        StoreError::Postgres(err)
    }
}

/// Trait for executing database statements
///
/// Implemented by [`MayPostgresExecutor`] (autocommit) and by
/// [`crate::transaction::Transaction`].
pub trait Executor {
    /// Execute a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError>;

    /// Execute a query that must return exactly one row
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql])
        -> Result<Vec<Row>, StoreError>;

    /// Execute a query returning at most one row
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Query` if more than one row comes back.
    fn query_opt(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> Result<Option<Row>, StoreError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(StoreError::Query(format!("expected at most one row, got {n}"))),
        }
    }
}

/// Runs one client call, recording span, duration and error metrics.
pub(crate) fn instrumented<T>(
    query: &str,
    f: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = f().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        StoreError::Postgres(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

/// Autocommit executor over a single `may_postgres::Client`
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Check if the underlying connection is healthy (`SELECT 1`)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the health check query itself fails to run.
    pub fn check_health(&self) -> Result<bool, StoreError> {
        let row = self.query_one("SELECT 1", &[])?;
        let one: i32 = row
            .try_get(0)
            .map_err(|e| StoreError::Parse(format!("health check: {e}")))?;
        Ok(one == 1)
    }
}

impl Executor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Row>, StoreError> {
        instrumented(query, || self.client.query(query, params))
    }
}
