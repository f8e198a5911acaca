//! Contract lifecycle engine: date invariants and status transitions.
//!
//! Nothing here touches storage. Gateways call [`plan_transition`] while
//! holding the contract row lock and persist the resulting [`StatusChange`]
//! together with its history record.

use crate::domain::{Contract, ContractStatus};
use crate::error::ContractError;
use chrono::{DateTime, NaiveDate, Utc};

/// Check `end >= start` and, for a contract being created in draft, that it
/// does not already end before `today`.
///
/// # Errors
///
/// Returns `ContractError::Validation` when either rule is broken.
pub fn validate_dates(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    is_new_draft: bool,
) -> Result<(), ContractError> {
    if end < start {
        return Err(ContractError::validation(
            "End date cannot be before start date.",
        ));
    }
    if is_new_draft && end < today {
        return Err(ContractError::validation(
            "Contract end date cannot be in the past.",
        ));
    }
    Ok(())
}

/// Parse a requested status string.
///
/// # Errors
///
/// Returns `ContractError::Validation` for strings outside the status set.
pub fn parse_status(requested: &str) -> Result<ContractStatus, ContractError> {
    requested.parse()
}

/// A transition that passed the graph check, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub contract_id: i64,
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub actor_id: i64,
    /// `None` when no remarks (or only whitespace) were given; otherwise
    /// stored as sent.
    pub remarks: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// Write the change into the contract record. Existing remarks are kept
    /// unless new ones were supplied.
    pub fn apply(&self, contract: &mut Contract) {
        contract.status = self.to;
        if let Some(remarks) = &self.remarks {
            contract.remarks = Some(remarks.clone());
        }
        contract.updated_by = Some(self.actor_id);
        contract.updated_at = self.at;
    }
}

/// Validate `contract.status -> to` against the transition graph.
///
/// # Errors
///
/// Returns `ContractError::InvalidTransition` naming both statuses when `to`
/// is not reachable in one step.
pub fn plan_transition(
    contract: &Contract,
    to: ContractStatus,
    actor_id: i64,
    remarks: Option<&str>,
    at: DateTime<Utc>,
) -> Result<StatusChange, ContractError> {
    let from = contract.status;
    if !from.can_transition_to(to) {
        return Err(ContractError::InvalidTransition { from, to });
    }
    Ok(StatusChange {
        contract_id: contract.id,
        from,
        to,
        actor_id,
        remarks: remarks.filter(|r| !r.trim().is_empty()).map(str::to_owned),
        at,
    })
}
