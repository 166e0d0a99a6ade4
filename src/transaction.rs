//! Transaction Module
//!
//! Wraps a `may_postgres::Client` in an explicit `BEGIN` / `COMMIT` / `ROLLBACK`
//! scope and implements [`Executor`] so store code runs unchanged inside it.
//!
//! Savepoints are exposed by name: the cascade engine wraps every descendant
//! write in one so a failing step is rolled back on its own while the rest of
//! the cascade commits.

use crate::executor::{instrumented, Executor, StoreError};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::cell::Cell;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Savepoint names are interpolated into SQL, so only plain identifiers pass.
fn savepoint_sql(statement: &str, name: &str) -> Result<String, StoreError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::Transaction(format!(
            "invalid savepoint name {name:?}"
        )));
    }
    Ok(format!("{statement} {name}"))
}

/// A database transaction
///
/// Dropping an open transaction without calling [`Transaction::commit`] issues a
/// best-effort `ROLLBACK`.
pub struct Transaction {
    client: Client,
    closed: Cell<bool>,
}

impl Transaction {
    /// Issue `BEGIN` on `client` and wrap it.
    pub(crate) fn new(client: Client) -> Result<Self, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[])?;
        Ok(Self {
            client,
            closed: Cell::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.get() {
            return Err(StoreError::Transaction(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }
        Ok(())
    }

    fn savepoint_statement(&self, statement: &str, name: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let sql = savepoint_sql(statement, name)?;
        instrumented(&sql, || self.client.execute(sql.as_str(), &[]))?;
        Ok(())
    }

    /// `SAVEPOINT name`
    pub fn savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.savepoint_statement("SAVEPOINT", name)
    }

    /// Roll back to a savepoint. The savepoint stays defined.
    pub fn rollback_to_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.savepoint_statement("ROLLBACK TO SAVEPOINT", name)
    }

    pub fn release_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.savepoint_statement("RELEASE SAVEPOINT", name)
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been closed or `COMMIT` fails.
    pub fn commit(self) -> Result<(), StoreError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed.set(true);
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Roll back the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been closed or `ROLLBACK` fails.
    pub fn rollback(self) -> Result<(), StoreError> {
        self.ensure_open()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed.set(true);
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed.get() {
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl Executor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}
