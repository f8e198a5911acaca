//! Flyway-style lock: a reserved row in the migration table.

use crate::executor::SqlExecutor;
use crate::migration::MigrationError;
use std::time::{Duration, Instant};

/// Version of the lock row. Real migrations use positive timestamps.
pub(crate) const LOCK_VERSION: i64 = -1;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the migration lock; releases it on drop.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock, polling until `timeout_seconds` (default 60) elapse.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if another runner keeps the lock,
    /// or `MigrationError::Database` if the insert fails outright.
    pub fn new(
        executor: &'a dyn SqlExecutor,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, MigrationError> {
        acquire_migration_lock(executor, timeout_seconds.unwrap_or(60))?;
        Ok(Self { executor })
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::warn!("failed to release migration lock: {e}");
        }
    }
}

/// Insert the lock row; whoever inserts it holds the lock.
///
/// # Errors
///
/// See [`MigrationLockGuard::new`].
pub fn acquire_migration_lock(
    executor: &dyn SqlExecutor,
    timeout_seconds: u64,
) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    loop {
        if start.elapsed() >= timeout {
            return Err(MigrationError::LockTimeout(format!(
                "failed to acquire migration lock within {timeout_seconds} seconds"
            )));
        }

        let inserted = executor.execute(
            r#"
            INSERT INTO contractguard_migrations (version, name, checksum, applied_at, success)
            VALUES ($1, 'LOCK', 'lock', NOW(), true)
            ON CONFLICT (version) DO NOTHING
            "#,
            &[&LOCK_VERSION],
        )?;

        if inserted > 0 {
            log::debug!("migration lock acquired");
            return Ok(());
        }

        log::debug!("migration lock held elsewhere, waiting");
        may::coroutine::sleep(POLL_INTERVAL);
    }
}

/// Delete the lock row.
///
/// # Errors
///
/// Returns `MigrationError::Database` if the delete fails.
pub fn release_migration_lock(executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
    executor.execute(
        "DELETE FROM contractguard_migrations WHERE version = $1",
        &[&LOCK_VERSION],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns `MigrationError::Database` if the query fails.
pub fn is_migration_lock_held(executor: &dyn SqlExecutor) -> Result<bool, MigrationError> {
    let row = executor.query_one(
        "SELECT COUNT(*) FROM contractguard_migrations WHERE version = $1",
        &[&LOCK_VERSION],
    )?;
    let count: i64 = row
        .try_get(0)
        .map_err(|e| crate::executor::DbError::Parse(format!("lock count: {e}")))?;
    Ok(count > 0)
}
