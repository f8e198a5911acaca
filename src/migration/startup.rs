//! In-process migration on application startup

use crate::executor::MayPostgresExecutor;
use crate::migration::{MigrationError, Migrator};

/// Apply all pending built-in migrations before serving.
///
/// The first instance to take the lock migrates; others wait up to
/// `lock_timeout_seconds` (default 60) and then find nothing pending. A
/// checksum mismatch or failed migration is returned and the caller should
/// not start.
///
/// # Errors
///
/// Any [`MigrationError`].
pub fn startup_migrations(
    executor: &MayPostgresExecutor,
    lock_timeout_seconds: Option<u64>,
) -> Result<usize, MigrationError> {
    let applied = Migrator::default().up(executor, None, lock_timeout_seconds)?;

    if applied > 0 {
        log::info!("Applied {applied} migration(s) on startup");
    } else {
        log::debug!("No pending migrations to apply");
    }

    Ok(applied)
}
