//! Error taxonomy surfaced to callers of the contract service.

use crate::domain::ContractStatus;
use crate::executor::DbError;
use std::fmt;

/// Failure of a contract-service or gateway operation.
///
/// None of these is fatal to the process; each is returned to the caller and
/// nothing has been written when one comes back.
#[derive(Debug)]
pub enum ContractError {
    /// Malformed or semantically invalid input.
    Validation(String),
    /// The requested status is not reachable from the current one.
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
    },
    /// The actor may not perform the action.
    Forbidden(String),
    /// A referenced entity does not exist.
    NotFound { entity: &'static str, id: i64 },
    /// Database failure.
    Database(DbError),
    /// Document storage failure.
    Storage(String),
}

impl ContractError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ContractError::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ContractError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ContractError::Forbidden(msg.into())
    }

    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ContractError::Validation(_) | ContractError::InvalidTransition { .. } => 400,
            ContractError::Forbidden(_) => 403,
            ContractError::NotFound { .. } => 404,
            ContractError::Database(_) | ContractError::Storage(_) => 500,
        }
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::Validation(msg) => write!(f, "Validation error: {msg}"),
            ContractError::InvalidTransition { from, to } => {
                write!(f, "Cannot transition from {from} to {to}")
            }
            ContractError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            ContractError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            ContractError::Database(e) => write!(f, "Database error: {e}"),
            ContractError::Storage(msg) => write!(f, "Document storage error: {msg}"),
        }
    }
}

impl std::error::Error for ContractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContractError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for ContractError {
    fn from(err: DbError) -> Self {
        ContractError::Database(err)
    }
}

impl From<std::io::Error> for ContractError {
    fn from(err: std::io::Error) -> Self {
        ContractError::Storage(err.to_string())
    }
}
