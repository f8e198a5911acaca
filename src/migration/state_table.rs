//! Migration state table management

use crate::executor::{DbError, SqlExecutor};

/// Create `contractguard_migrations` and its index if missing.
///
/// # Errors
///
/// Returns `DbError` if either statement fails.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), DbError> {
    executor.execute(
        r#"
        CREATE TABLE IF NOT EXISTS contractguard_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            execution_time_ms BIGINT,
            success BOOLEAN NOT NULL DEFAULT true
        )
        "#,
        &[],
    )?;

    executor.execute(
        r#"
        CREATE INDEX IF NOT EXISTS idx_contractguard_migrations_applied_at
        ON contractguard_migrations(applied_at)
        "#,
        &[],
    )?;

    Ok(())
}
