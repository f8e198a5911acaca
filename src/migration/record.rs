//! Rows of the `contractguard_migrations` state table

use crate::executor::DbError;
use crate::query::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Hex SHA-256 of the migration's statements
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl FromRow for MigrationRecord {
    fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let parse = |e: may_postgres::Error| DbError::Parse(format!("migration record: {e}"));
        Ok(Self {
            version: row.try_get("version").map_err(parse)?,
            name: row.try_get("name").map_err(parse)?,
            checksum: row.try_get("checksum").map_err(parse)?,
            applied_at: row.try_get("applied_at").map_err(parse)?,
            execution_time_ms: row.try_get("execution_time_ms").map_err(parse)?,
            success: row.try_get("success").map_err(parse)?,
        })
    }
}
