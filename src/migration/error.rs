//! Migration-specific error types

use crate::executor::DbError;
use crate::transaction::TransactionError;

#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(DbError),
    /// An applied migration was edited afterwards
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration lock not acquired in time
    LockTimeout(String),
    /// A migration's statements failed
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Applied in the database but unknown to this build
    MissingMigration { version: i64, name: String },
    /// No down statements
    Irreversible { version: i64, name: String },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => write!(
                f,
                "Migration '{name}' (version {version}) has been modified after being applied.\n\
                 Stored checksum: {stored}\n\
                 Current checksum: {current}"
            ),
            MigrationError::LockTimeout(msg) => write!(
                f,
                "Migration lock timeout: {msg}\n\
                 Another process may be running migrations; a stale lock can be removed with \
                 DELETE FROM contractguard_migrations WHERE version = -1"
            ),
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => write!(
                f,
                "Migration '{name}' (version {version}) failed during execution: {error}"
            ),
            MigrationError::MissingMigration { version, name } => write!(
                f,
                "Applied migration '{name}' (version {version}) is not known to this build"
            ),
            MigrationError::Irreversible { version, name } => write!(
                f,
                "Migration '{name}' (version {version}) has no down statements"
            ),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}

impl From<TransactionError> for MigrationError {
    fn from(error: TransactionError) -> Self {
        MigrationError::Database(error.into())
    }
}
