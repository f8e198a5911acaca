//! Persistence gateway.
//!
//! [`ContractStore`] is everything the service needs from storage. Operations
//! that must be atomic (code assignment, transition + history, comment anchor
//! re-check, patch + date check) are single trait methods so each
//! implementation can run them under one lock or one transaction.

use crate::domain::{
    Comment, Contract, ContractDocument, ContractPatch, ContractStatus, ContractType, Department,
    NewContract, NewUser, Role, StatusHistory, User, UserPatch,
};
use crate::error::ContractError;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;
mod rows;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A contract ready for insertion; the store assigns `id` and `code`.
#[derive(Debug, Clone)]
pub struct ContractInsert {
    pub fields: NewContract,
    pub department_id: i64,
    pub created_by: i64,
    /// Calendar year the code sequence is drawn from.
    pub code_year: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DocumentInsert {
    pub contract_id: i64,
    pub file_name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContractOrder {
    #[default]
    CreatedAt,
    EndDate,
    Status,
}

impl ContractOrder {
    pub fn column(self) -> &'static str {
        match self {
            ContractOrder::CreatedAt => "created_at",
            ContractOrder::EndDate => "end_date",
            ContractOrder::Status => "status",
        }
    }
}

/// Contract list query. The default lists everything, newest first.
#[derive(Debug, Clone)]
pub struct ContractFilter {
    /// Case-insensitive substring over code, vendor name and title.
    pub search: Option<String>,
    pub status: Option<ContractStatus>,
    pub department_id: Option<i64>,
    pub order_by: ContractOrder,
    pub descending: bool,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Default for ContractFilter {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            department_id: None,
            order_by: ContractOrder::CreatedAt,
            descending: true,
            limit: None,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive substring over full name and email.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub trait ContractStore: Send + Sync {
    // Users

    fn insert_user(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User, ContractError>;
    fn get_user(&self, id: i64) -> Result<Option<User>, ContractError>;
    fn update_user(&self, id: i64, patch: &UserPatch) -> Result<User, ContractError>;
    /// Nulls every reference to the user and deletes their comments.
    fn delete_user(&self, id: i64) -> Result<(), ContractError>;
    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, ContractError>;
    /// Set `last_active = now` if the stored value is older than
    /// `now - min_interval`. Returns whether a write happened.
    fn touch_last_active(
        &self,
        id: i64,
        now: DateTime<Utc>,
        min_interval: chrono::Duration,
    ) -> Result<bool, ContractError>;

    // Departments and contract types

    fn insert_department(&self, name: &str) -> Result<Department, ContractError>;
    fn get_department(&self, id: i64) -> Result<Option<Department>, ContractError>;
    fn rename_department(&self, id: i64, name: &str) -> Result<Department, ContractError>;
    /// Refused while contracts reference the department.
    fn delete_department(&self, id: i64) -> Result<(), ContractError>;
    fn list_departments(&self) -> Result<Vec<Department>, ContractError>;

    fn insert_contract_type(&self, name: &str) -> Result<ContractType, ContractError>;
    fn get_contract_type(&self, id: i64) -> Result<Option<ContractType>, ContractError>;
    fn rename_contract_type(&self, id: i64, name: &str) -> Result<ContractType, ContractError>;
    /// Refused while contracts reference the type.
    fn delete_contract_type(&self, id: i64) -> Result<(), ContractError>;
    fn list_contract_types(&self) -> Result<Vec<ContractType>, ContractError>;

    // Contracts

    /// Reserve the next code for `code_year` and insert, atomically.
    fn insert_contract(&self, insert: &ContractInsert) -> Result<Contract, ContractError>;
    fn get_contract(&self, id: i64) -> Result<Option<Contract>, ContractError>;
    /// Apply `patch` to the locked row; the merged dates must still satisfy
    /// `end_date >= start_date` or nothing is written.
    fn update_contract(
        &self,
        id: i64,
        patch: &ContractPatch,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Contract, ContractError>;
    /// Cascades to documents, history and comments.
    fn delete_contract(&self, id: i64) -> Result<(), ContractError>;
    fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, ContractError>;

    /// Lock the contract, check `to` against its current status, update it
    /// and append one history record. Both writes or neither.
    fn apply_transition(
        &self,
        contract_id: i64,
        to: ContractStatus,
        actor_id: i64,
        remarks: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StatusHistory, ContractError>;
    /// Newest first.
    fn list_history(&self, contract_id: i64) -> Result<Vec<StatusHistory>, ContractError>;

    // Comments

    /// Insert after re-checking that `user_id` anchors the contract.
    fn insert_comment(
        &self,
        contract_id: i64,
        user_id: i64,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, ContractError>;
    /// Comments on contracts `viewer_id` anchors, optionally narrowed to one
    /// contract. Oldest first.
    fn list_comments(
        &self,
        contract_id: Option<i64>,
        viewer_id: i64,
    ) -> Result<Vec<Comment>, ContractError>;

    // Documents

    fn insert_document(&self, doc: &DocumentInsert) -> Result<ContractDocument, ContractError>;
    fn get_document(&self, id: i64) -> Result<Option<ContractDocument>, ContractError>;
    fn list_documents(&self, contract_id: i64) -> Result<Vec<ContractDocument>, ContractError>;
    fn delete_document(&self, id: i64) -> Result<(), ContractError>;
}

/// Lowercased needle for case-insensitive search, `None` when blank.
pub(crate) fn search_needle(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
