//! Append-only child records of a contract.

use crate::domain::ContractStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub id: i64,
    pub contract_id: i64,
    pub file_name: String,
    /// Location inside the document storage: `contracts/<contract_id>/<file_name>`.
    pub storage_path: String,
    pub size_bytes: i64,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Audit record of one status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistory {
    pub id: i64,
    pub contract_id: i64,
    pub old_status: ContractStatus,
    pub new_status: ContractStatus,
    pub changed_by: Option<i64>,
    pub remarks: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub contract_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
