//! Migration trait definition

use super::checksum::calculate_checksum;
use super::schema_manager::SchemaManager;
use crate::executor::DbError;

/// A versioned schema change.
///
/// `up` runs [`statements`](Migration::statements) in order by default; the
/// checksum is taken over the same statements, so editing an applied
/// migration is detected.
pub trait Migration: Send + Sync {
    /// Human-readable identifier
    fn name(&self) -> &str;

    /// Version timestamp: YYYYMMDDHHMMSS
    fn version(&self) -> i64;

    /// Forward statements, one SQL command each.
    fn statements(&self) -> &'static [&'static str];

    /// Reverse statements. Empty means the migration cannot be rolled back.
    fn down_statements(&self) -> &'static [&'static str] {
        &[]
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        for sql in self.statements() {
            manager.execute(sql)?;
        }
        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        for sql in self.down_statements() {
            manager.execute(sql)?;
        }
        Ok(())
    }

    fn checksum(&self) -> String {
        calculate_checksum(&self.statements().join(";\n"))
    }
}
