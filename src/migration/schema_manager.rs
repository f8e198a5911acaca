//! Executor handle passed to migrations

use crate::executor::{DbError, SqlExecutor};

/// Runs schema statements for a migration. Borrowing the executor lets the
/// migrator hand in an open transaction.
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Execute one statement without parameters.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn execute(&self, sql: &str) -> Result<(), DbError> {
        log::trace!("migration statement: {}", sql.trim());
        self.executor.execute(sql, &[])?;
        Ok(())
    }

    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }
}
