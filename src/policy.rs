//! Authorization policy.
//!
//! [`can_access`] is a pure predicate over (actor, resource, action); it does
//! not build queries or touch storage. [`authorize`] is the gate the service
//! uses: it turns a denial into `ContractError::Forbidden` and records it.

use crate::domain::{Contract, Role, User};
use crate::error::ContractError;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

wire_enum! {
    Action("action") {
        Read => "read",
        Create => "create",
        Update => "update",
        Delete => "delete",
        Transition => "transition",
    }
}

impl Action {
    pub fn is_read(self) -> bool {
        self == Action::Read
    }
}

/// What an action targets. Comments carry their contract, since access to
/// them depends on the contract's anchors.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    ContractType,
    Department,
    User,
    Contract,
    Document,
    Comment(&'a Contract),
}

impl Resource<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::ContractType => "contract_type",
            Resource::Department => "department",
            Resource::User => "user",
            Resource::Contract => "contract",
            Resource::Document => "document",
            Resource::Comment(_) => "comment",
        }
    }
}

/// Staff flag or the `admin` role.
pub fn is_admin(actor: &User) -> bool {
    actor.is_admin()
}

/// May create, edit, transition and delete contracts and their documents.
pub fn is_procurement(actor: &User) -> bool {
    actor.is_admin() || actor.role == Role::ProcurementOfficer
}

/// `true` when `user_id` is one of the contract's legal officer, department
/// head, signatory or creator.
pub fn is_anchor(contract: &Contract, user_id: i64) -> bool {
    contract.is_anchor(user_id)
}

pub fn can_access(actor: Option<&User>, resource: Resource<'_>, action: Action) -> bool {
    let Some(actor) = actor.filter(|a| a.is_active) else {
        return false;
    };

    match resource {
        Resource::Comment(contract) => match action {
            Action::Read | Action::Create => is_anchor(contract, actor.id),
            // append-only
            _ => false,
        },
        Resource::User => is_admin(actor),
        _ if action.is_read() => true,
        Resource::ContractType | Resource::Department => is_admin(actor),
        Resource::Contract | Resource::Document => is_procurement(actor),
    }
}

/// [`can_access`] as a gate.
///
/// # Errors
///
/// Returns `ContractError::Forbidden` when access is denied. Every denial is
/// logged and counted.
pub fn authorize(
    actor: Option<&User>,
    resource: Resource<'_>,
    action: Action,
) -> Result<(), ContractError> {
    if can_access(actor, resource, action) {
        return Ok(());
    }

    let who = actor.map_or_else(|| "anonymous".to_string(), |a| format!("user {}", a.id));
    log::warn!(
        "denied: {who} may not {} {}",
        action.as_str(),
        resource.kind()
    );
    #[cfg(feature = "metrics")]
    METRICS.record_denied(resource.kind(), action.as_str());

    Err(match resource {
        Resource::Comment(_) if action == Action::Create => {
            ContractError::forbidden("You are not allowed to comment on this contract.")
        }
        _ => ContractError::forbidden(format!(
            "not allowed to {} {}",
            action.as_str(),
            resource.kind()
        )),
    })
}
