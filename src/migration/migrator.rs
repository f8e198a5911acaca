//! Migrator - applies compiled-in migrations and tracks them in the state table

use crate::executor::{MayPostgresExecutor, SqlExecutor};
use crate::migration::checksum::validate_checksum;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::{
    builtin_migrations, initialize_state_table, Migration, MigrationError, MigrationRecord,
    SchemaManager,
};
use crate::query::FromRow;
use std::time::Instant;

/// A known migration that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<PendingMigration>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(builtin_migrations())
    }
}

impl Migrator {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    /// Compare known migrations with the state table.
    ///
    /// # Errors
    ///
    /// `ChecksumMismatch` if an applied migration changed, `MissingMigration`
    /// if the database has a version this build does not know.
    pub fn status(&self, executor: &dyn SqlExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;

        for record in &applied {
            let Some(migration) = self.find(record.version) else {
                return Err(MigrationError::MissingMigration {
                    version: record.version,
                    name: record.name.clone(),
                });
            };
            validate_checksum(
                record.version,
                &record.name,
                &record.checksum,
                &migration.checksum(),
            )?;
        }

        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|r| r.version == m.version()))
            .map(|m| PendingMigration {
                version: m.version(),
                name: m.name().to_string(),
                checksum: m.checksum(),
            })
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    /// Apply pending migrations under the migration lock.
    ///
    /// # Errors
    ///
    /// See [`Migrator::up_with_lock`]; also `LockTimeout`.
    pub fn up(
        &self,
        executor: &MayPostgresExecutor,
        steps: Option<usize>,
        lock_timeout_seconds: Option<u64>,
    ) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let _lock = MigrationLockGuard::new(executor, lock_timeout_seconds)?;
        self.up_with_lock(executor, steps)
    }

    /// Apply up to `steps` pending migrations (all when `None`), each in its
    /// own transaction together with its state-table row. Assumes the lock
    /// is held.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionFailed` naming the migration whose statements failed;
    /// that migration is rolled back, earlier ones stay applied.
    pub fn up_with_lock(
        &self,
        executor: &MayPostgresExecutor,
        steps: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;
        let take = steps.unwrap_or(status.pending.len());
        let mut applied_count = 0;

        for pending in status.pending.iter().take(take) {
            let Some(migration) = self.find(pending.version) else {
                continue;
            };
            let start = Instant::now();

            let txn = executor.begin()?;
            migration
                .up(&SchemaManager::new(&txn))
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: pending.version,
                    name: pending.name.clone(),
                    error: e.to_string(),
                })?;
            let elapsed_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
            Self::record_migration(&txn, pending, elapsed_ms)?;
            txn.commit()?;

            log::info!(
                "applied migration {} ({}) in {elapsed_ms}ms",
                pending.version,
                pending.name
            );
            applied_count += 1;
        }

        Ok(applied_count)
    }

    /// Roll back the last `steps` applied migrations (default 1).
    ///
    /// # Errors
    ///
    /// `Irreversible` if a migration has no down statements.
    pub fn down(
        &self,
        executor: &MayPostgresExecutor,
        steps: Option<usize>,
        lock_timeout_seconds: Option<u64>,
    ) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let _lock = MigrationLockGuard::new(executor, lock_timeout_seconds)?;

        let mut applied = self.status(executor)?.applied;
        applied.sort_by_key(|r| std::cmp::Reverse(r.version));

        let mut rolled_back = 0;
        for record in applied.iter().take(steps.unwrap_or(1)) {
            let Some(migration) = self.find(record.version) else {
                continue;
            };
            if migration.down_statements().is_empty() {
                return Err(MigrationError::Irreversible {
                    version: record.version,
                    name: record.name.clone(),
                });
            }

            let txn = executor.begin()?;
            migration
                .down(&SchemaManager::new(&txn))
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: record.version,
                    name: record.name.clone(),
                    error: e.to_string(),
                })?;
            txn.execute(
                "DELETE FROM contractguard_migrations WHERE version = $1",
                &[&record.version],
            )?;
            txn.commit()?;

            log::info!("rolled back migration {} ({})", record.version, record.name);
            rolled_back += 1;
        }

        Ok(rolled_back)
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.version() == version)
            .map(|m| m.as_ref())
    }

    /// Excludes the lock row.
    fn query_applied_migrations(
        executor: &dyn SqlExecutor,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let rows = executor.query_all(
            r#"
            SELECT version, name, checksum, applied_at, execution_time_ms, success
            FROM contractguard_migrations
            WHERE version > 0
            ORDER BY version ASC
            "#,
            &[],
        )?;
        rows.iter()
            .map(|row| MigrationRecord::from_row(row).map_err(MigrationError::from))
            .collect()
    }

    fn record_migration(
        executor: &dyn SqlExecutor,
        pending: &PendingMigration,
        execution_time_ms: i64,
    ) -> Result<(), MigrationError> {
        executor.execute(
            r#"
            INSERT INTO contractguard_migrations (version, name, checksum, applied_at, execution_time_ms, success)
            VALUES ($1, $2, $3, NOW(), $4, true)
            "#,
            &[
                &pending.version,
                &pending.name,
                &pending.checksum,
                &execution_time_ms,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(i64);

    impl Migration for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn version(&self) -> i64 {
            self.0
        }

        fn statements(&self) -> &'static [&'static str] {
            &["SELECT 1"]
        }
    }

    #[test]
    fn test_migrations_sorted_by_version() {
        let migrator = Migrator::new(vec![Box::new(Noop(3)), Box::new(Noop(1)), Box::new(Noop(2))]);
        let versions: Vec<i64> = migrator.migrations.iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(migrator.find(2).is_some());
        assert!(migrator.find(4).is_none());
    }

    #[test]
    fn test_builtin_migrations_have_positive_versions() {
        let migrator = Migrator::default();
        assert!(!migrator.migrations.is_empty());
        assert!(migrator.migrations.iter().all(|m| m.version() > 0));
    }
}
