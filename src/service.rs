//! Contract service: the entry point an API layer calls.
//!
//! Every operation resolves the acting user, runs it through
//! [`policy::authorize`], validates input and hands the write to the
//! [`ContractStore`]. Anything that must be atomic (code assignment,
//! transition plus history, comment anchor re-check) happens inside a single
//! store call.

use crate::config::ContractsConfig;
use crate::documents::{
    document_path, sha256_hex, validate_file_name, DocumentStorage, LocalDocumentStorage, Upload,
};
use crate::domain::contract::EXPIRING_SOON_DAYS;
use crate::domain::{
    Comment, Contract, ContractDocument, ContractPatch, ContractType, Department, NewContract,
    NewUser, Role, StatusHistory, User, UserPatch,
};
use crate::error::ContractError;
use crate::lifecycle;
use crate::policy::{self, Action, Resource};
use crate::store::{ContractFilter, ContractInsert, ContractStore, DocumentInsert, UserFilter};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Minimum gap between two `last_active` writes for the same user.
const LAST_ACTIVE_INTERVAL_SECONDS: i64 = 60;

#[cfg(feature = "tracing")]
fn enter(operation: &'static str) -> tracing::span::EnteredSpan {
    crate::metrics::tracing_helpers::service_span(operation).entered()
}

#[cfg(not(feature = "tracing"))]
fn enter(_operation: &'static str) {}

/// A contract with its documents, history and derived term figures.
#[derive(Debug, Clone, Serialize)]
pub struct ContractDetails {
    pub contract: Contract,
    pub documents: Vec<ContractDocument>,
    /// Newest first.
    pub history: Vec<StatusHistory>,
    pub total_days: i64,
    pub days_remaining: i64,
    pub is_active: bool,
    pub is_expiring_soon: bool,
    /// Human-readable labels for the coded fields.
    pub status_display: &'static str,
    pub payment_terms_display: &'static str,
    pub renewal_terms_display: &'static str,
}

impl ContractDetails {
    pub fn on(
        contract: Contract,
        documents: Vec<ContractDocument>,
        history: Vec<StatusHistory>,
        today: NaiveDate,
        expiring_soon_days: i64,
    ) -> Self {
        Self {
            total_days: contract.total_days(),
            days_remaining: contract.days_remaining_on(today),
            is_active: contract.is_active_on(today),
            is_expiring_soon: contract.is_expiring_within(today, expiring_soon_days),
            status_display: contract.status.label(),
            payment_terms_display: contract.payment_terms.label(),
            renewal_terms_display: contract.renewal_terms.label(),
            contract,
            documents,
            history,
        }
    }
}

pub struct ContractService<S, D> {
    store: S,
    documents: D,
    expiring_soon_days: i64,
}

impl<S: ContractStore> ContractService<S, LocalDocumentStorage> {
    /// Service with documents stored under `config.document_root`.
    pub fn from_config(store: S, config: &ContractsConfig) -> Self {
        Self::new(store, LocalDocumentStorage::new(&config.document_root))
            .with_expiring_soon_days(config.expiring_soon_days)
    }
}

impl<S: ContractStore, D: DocumentStorage> ContractService<S, D> {
    pub fn new(store: S, documents: D) -> Self {
        Self {
            store,
            documents,
            expiring_soon_days: EXPIRING_SOON_DAYS,
        }
    }

    pub fn with_expiring_soon_days(mut self, days: i64) -> Self {
        self.expiring_soon_days = days;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    /// Resolve `actor_id` and gate `action` on `resource`. Unknown users are
    /// treated as anonymous and denied.
    fn authorize(
        &self,
        actor_id: i64,
        resource: Resource<'_>,
        action: Action,
    ) -> Result<User, ContractError> {
        let actor = self.store.get_user(actor_id)?;
        policy::authorize(actor.as_ref(), resource, action)?;
        actor.ok_or_else(|| ContractError::forbidden("authentication required"))
    }

    fn load_contract(&self, id: i64) -> Result<Contract, ContractError> {
        self.store
            .get_contract(id)?
            .ok_or_else(|| ContractError::not_found("contract", id))
    }

    /// An anchor slot may only hold a user with the matching role.
    fn check_anchor(
        &self,
        slot: &str,
        user_id: Option<i64>,
        role: Role,
    ) -> Result<(), ContractError> {
        let Some(id) = user_id else {
            return Ok(());
        };
        let user = self
            .store
            .get_user(id)?
            .ok_or_else(|| ContractError::not_found("user", id))?;
        if user.role != role {
            return Err(ContractError::validation(format!(
                "{slot} must be a user with the {} role.",
                role.label()
            )));
        }
        Ok(())
    }

    fn check_references(
        &self,
        contract_type_id: Option<i64>,
        department_id: Option<i64>,
    ) -> Result<(), ContractError> {
        if let Some(id) = contract_type_id {
            if self.store.get_contract_type(id)?.is_none() {
                return Err(ContractError::not_found("contract type", id));
            }
        }
        if let Some(id) = department_id {
            if self.store.get_department(id)?.is_none() {
                return Err(ContractError::not_found("department", id));
            }
        }
        Ok(())
    }

    // Contracts

    /// Create a draft contract and assign its code.
    ///
    /// # Errors
    ///
    /// `Forbidden` unless the actor is procurement or admin, `NotFound` for a
    /// missing type, department or anchor user, `Validation` for blank
    /// fields, mismatched anchor roles or bad dates. Nothing is written on
    /// error.
    pub fn create_contract(
        &self,
        actor_id: i64,
        mut fields: NewContract,
    ) -> Result<Contract, ContractError> {
        let _span = enter("create_contract");
        let actor = self.authorize(actor_id, Resource::Contract, Action::Create)?;

        fields.title = required("Title", &fields.title)?;
        fields.vendor_name = required("Vendor name", &fields.vendor_name)?;
        check_value(fields.estimated_value)?;

        let department_id = fields
            .department_id
            .or(actor.department_id)
            .ok_or_else(|| ContractError::validation("Department is required."))?;
        self.check_references(Some(fields.contract_type_id), Some(department_id))?;
        self.check_anchor("Legal officer", fields.legal_officer_id, Role::LegalReviewer)?;
        self.check_anchor("Department head", fields.department_head_id, Role::DepartmentHead)?;
        self.check_anchor("Signatory", fields.signatory_id, Role::Signatory)?;

        let now = Utc::now();
        lifecycle::validate_dates(fields.start_date, fields.end_date, now.date_naive(), true)?;

        let contract = self.store.insert_contract(&ContractInsert {
            fields,
            department_id,
            created_by: actor.id,
            code_year: now.year(),
            created_at: now,
        })?;

        log::info!("contract {} created by user {}", contract.code, actor.id);
        #[cfg(feature = "metrics")]
        METRICS.record_contract_created();
        Ok(contract)
    }

    /// Edit contract fields. The code, status and creator cannot be changed
    /// here.
    ///
    /// # Errors
    ///
    /// As for [`create_contract`](Self::create_contract), plus `NotFound` for
    /// the contract itself.
    pub fn update_contract(
        &self,
        actor_id: i64,
        contract_id: i64,
        mut patch: ContractPatch,
    ) -> Result<Contract, ContractError> {
        let _span = enter("update_contract");
        let actor = self.authorize(actor_id, Resource::Contract, Action::Update)?;

        if let Some(title) = &patch.title {
            patch.title = Some(required("Title", title)?);
        }
        if let Some(vendor) = &patch.vendor_name {
            patch.vendor_name = Some(required("Vendor name", vendor)?);
        }
        if let Some(value) = patch.estimated_value {
            check_value(value)?;
        }
        self.check_references(patch.contract_type_id, patch.department_id)?;
        self.check_anchor("Legal officer", patch.legal_officer_id.flatten(), Role::LegalReviewer)?;
        self.check_anchor(
            "Department head",
            patch.department_head_id.flatten(),
            Role::DepartmentHead,
        )?;
        self.check_anchor("Signatory", patch.signatory_id.flatten(), Role::Signatory)?;

        let contract = self
            .store
            .update_contract(contract_id, &patch, actor.id, Utc::now())?;
        log::info!("contract {} updated by user {}", contract.code, actor.id);
        Ok(contract)
    }

    pub fn get_contract(
        &self,
        actor_id: i64,
        contract_id: i64,
    ) -> Result<ContractDetails, ContractError> {
        let _span = enter("get_contract");
        self.authorize(actor_id, Resource::Contract, Action::Read)?;
        let contract = self.load_contract(contract_id)?;
        let documents = self.store.list_documents(contract_id)?;
        let history = self.store.list_history(contract_id)?;
        Ok(ContractDetails::on(
            contract,
            documents,
            history,
            Utc::now().date_naive(),
            self.expiring_soon_days,
        ))
    }

    pub fn list_contracts(
        &self,
        actor_id: i64,
        filter: &ContractFilter,
    ) -> Result<Vec<Contract>, ContractError> {
        let _span = enter("list_contracts");
        self.authorize(actor_id, Resource::Contract, Action::Read)?;
        self.store.list_contracts(filter)
    }

    /// Contracts ending within the configured window, soonest first.
    pub fn list_expiring_contracts(&self, actor_id: i64) -> Result<Vec<Contract>, ContractError> {
        let _span = enter("list_expiring_contracts");
        self.authorize(actor_id, Resource::Contract, Action::Read)?;
        let today = Utc::now().date_naive();
        let mut contracts: Vec<Contract> = self
            .store
            .list_contracts(&ContractFilter::default())?
            .into_iter()
            .filter(|c| c.is_expiring_within(today, self.expiring_soon_days))
            .collect();
        contracts.sort_by_key(|c| (c.end_date, c.id));
        Ok(contracts)
    }

    /// Delete a contract with its documents, history and comments.
    pub fn delete_contract(&self, actor_id: i64, contract_id: i64) -> Result<(), ContractError> {
        let _span = enter("delete_contract");
        let actor = self.authorize(actor_id, Resource::Contract, Action::Delete)?;
        let documents = self.store.list_documents(contract_id)?;
        self.store.delete_contract(contract_id)?;

        for doc in &documents {
            if let Err(e) = self.documents.delete(&doc.storage_path) {
                log::warn!("orphaned document blob {}: {e}", doc.storage_path);
            }
        }
        log::info!("contract {contract_id} deleted by user {}", actor.id);
        Ok(())
    }

    /// Move a contract to `new_status` and append a history record.
    ///
    /// # Errors
    ///
    /// `Forbidden` before anything else, then `Validation` for an unknown
    /// status string, `NotFound`, or `InvalidTransition` when the graph does
    /// not allow the move. Status and history are unchanged on any error.
    pub fn transition_status(
        &self,
        contract_id: i64,
        new_status: &str,
        actor_id: i64,
        remarks: Option<&str>,
    ) -> Result<StatusHistory, ContractError> {
        let _span = enter("transition_status");
        let actor = self.authorize(actor_id, Resource::Contract, Action::Transition)?;
        let to = lifecycle::parse_status(new_status)?;

        let record = self
            .store
            .apply_transition(contract_id, to, actor.id, remarks, Utc::now())?;

        log::info!(
            "contract {contract_id}: {} -> {} by user {}",
            record.old_status,
            record.new_status,
            actor.id
        );
        #[cfg(feature = "metrics")]
        METRICS.record_transition(record.old_status.as_str(), record.new_status.as_str());
        Ok(record)
    }

    // Comments

    /// Comment on a contract the actor is anchored to.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing contract, `Forbidden` for a non-anchor,
    /// `Validation` for an empty body.
    pub fn add_comment(
        &self,
        contract_id: i64,
        actor_id: i64,
        body: &str,
    ) -> Result<Comment, ContractError> {
        let _span = enter("add_comment");
        let contract = self.load_contract(contract_id)?;
        let actor = self.authorize(actor_id, Resource::Comment(&contract), Action::Create)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ContractError::validation("Comment cannot be empty."));
        }

        let comment = self
            .store
            .insert_comment(contract_id, actor.id, body, Utc::now())?;
        log::debug!("comment {} on contract {contract_id} by user {}", comment.id, actor.id);
        Ok(comment)
    }

    /// Comments the actor may see, oldest first: only those on contracts
    /// they are anchored to.
    pub fn list_comments(
        &self,
        contract_id: Option<i64>,
        actor_id: i64,
    ) -> Result<Vec<Comment>, ContractError> {
        let _span = enter("list_comments");
        let actor = self.store.get_user(actor_id)?;
        let Some(actor) = actor.filter(|a| a.is_active) else {
            return Err(ContractError::forbidden("authentication required"));
        };

        if let Some(id) = contract_id {
            let contract = self.load_contract(id)?;
            if !policy::can_access(Some(&actor), Resource::Comment(&contract), Action::Read) {
                return Ok(Vec::new());
            }
        }
        self.store.list_comments(contract_id, actor.id)
    }

    // Documents

    /// Attach files to a contract. Either every file is stored or none is.
    ///
    /// # Errors
    ///
    /// `Validation("No files provided")` for an empty batch or a bad file
    /// name, `NotFound`, `Forbidden`, `Storage`.
    pub fn upload_documents(
        &self,
        actor_id: i64,
        contract_id: i64,
        uploads: Vec<Upload>,
    ) -> Result<Vec<ContractDocument>, ContractError> {
        let _span = enter("upload_documents");
        let actor = self.authorize(actor_id, Resource::Document, Action::Create)?;
        if uploads.is_empty() {
            return Err(ContractError::validation("No files provided"));
        }
        self.load_contract(contract_id)?;
        for upload in &uploads {
            validate_file_name(&upload.file_name)?;
        }

        let mut stored = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            match self.store_one(contract_id, upload) {
                Ok(doc) => stored.push(doc),
                Err(e) => {
                    self.discard(&stored);
                    return Err(e);
                }
            }
        }

        log::info!(
            "{} document(s) attached to contract {contract_id} by user {}",
            stored.len(),
            actor.id
        );
        Ok(stored)
    }

    fn store_one(
        &self,
        contract_id: i64,
        upload: &Upload,
    ) -> Result<ContractDocument, ContractError> {
        let path = self
            .documents
            .store(&document_path(contract_id, &upload.file_name), &upload.bytes)?;
        let size_bytes = i64::try_from(upload.bytes.len())
            .map_err(|_| ContractError::validation("File is too large."))?;
        let insert = DocumentInsert {
            contract_id,
            file_name: upload.file_name.trim().to_string(),
            storage_path: path.clone(),
            size_bytes,
            sha256: sha256_hex(&upload.bytes),
            uploaded_at: Utc::now(),
        };
        self.store.insert_document(&insert).map_err(|e| {
            if let Err(cleanup) = self.documents.delete(&path) {
                log::warn!("orphaned document blob {path}: {cleanup}");
            }
            e
        })
    }

    /// Best-effort removal of a partially stored batch.
    fn discard(&self, docs: &[ContractDocument]) {
        for doc in docs {
            if let Err(e) = self.store.delete_document(doc.id) {
                log::warn!("could not remove document {}: {e}", doc.id);
            }
            if let Err(e) = self.documents.delete(&doc.storage_path) {
                log::warn!("orphaned document blob {}: {e}", doc.storage_path);
            }
        }
    }

    pub fn list_documents(
        &self,
        actor_id: i64,
        contract_id: i64,
    ) -> Result<Vec<ContractDocument>, ContractError> {
        let _span = enter("list_documents");
        self.authorize(actor_id, Resource::Document, Action::Read)?;
        self.load_contract(contract_id)?;
        self.store.list_documents(contract_id)
    }

    /// Document metadata and its bytes.
    pub fn download_document(
        &self,
        actor_id: i64,
        document_id: i64,
    ) -> Result<(ContractDocument, Vec<u8>), ContractError> {
        let _span = enter("download_document");
        self.authorize(actor_id, Resource::Document, Action::Read)?;
        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ContractError::not_found("document", document_id))?;
        let bytes = self.documents.read(&doc.storage_path)?;
        Ok((doc, bytes))
    }

    pub fn delete_document(&self, actor_id: i64, document_id: i64) -> Result<(), ContractError> {
        let _span = enter("delete_document");
        let actor = self.authorize(actor_id, Resource::Document, Action::Delete)?;
        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ContractError::not_found("document", document_id))?;
        self.store.delete_document(document_id)?;
        self.documents.delete(&doc.storage_path)?;
        log::info!(
            "document {document_id} removed from contract {} by user {}",
            doc.contract_id,
            actor.id
        );
        Ok(())
    }

    // Contract types

    pub fn create_contract_type(
        &self,
        actor_id: i64,
        name: &str,
    ) -> Result<ContractType, ContractError> {
        self.authorize(actor_id, Resource::ContractType, Action::Create)?;
        self.store.insert_contract_type(&required("Type name", name)?)
    }

    pub fn rename_contract_type(
        &self,
        actor_id: i64,
        id: i64,
        name: &str,
    ) -> Result<ContractType, ContractError> {
        self.authorize(actor_id, Resource::ContractType, Action::Update)?;
        self.store.rename_contract_type(id, &required("Type name", name)?)
    }

    pub fn delete_contract_type(&self, actor_id: i64, id: i64) -> Result<(), ContractError> {
        self.authorize(actor_id, Resource::ContractType, Action::Delete)?;
        self.store.delete_contract_type(id)
    }

    pub fn list_contract_types(&self, actor_id: i64) -> Result<Vec<ContractType>, ContractError> {
        self.authorize(actor_id, Resource::ContractType, Action::Read)?;
        self.store.list_contract_types()
    }

    // Departments

    pub fn create_department(&self, actor_id: i64, name: &str) -> Result<Department, ContractError> {
        self.authorize(actor_id, Resource::Department, Action::Create)?;
        self.store.insert_department(&required("Department name", name)?)
    }

    pub fn rename_department(
        &self,
        actor_id: i64,
        id: i64,
        name: &str,
    ) -> Result<Department, ContractError> {
        self.authorize(actor_id, Resource::Department, Action::Update)?;
        self.store.rename_department(id, &required("Department name", name)?)
    }

    pub fn delete_department(&self, actor_id: i64, id: i64) -> Result<(), ContractError> {
        self.authorize(actor_id, Resource::Department, Action::Delete)?;
        self.store.delete_department(id)
    }

    pub fn list_departments(&self, actor_id: i64) -> Result<Vec<Department>, ContractError> {
        self.authorize(actor_id, Resource::Department, Action::Read)?;
        self.store.list_departments()
    }

    // Users

    pub fn create_user(&self, actor_id: i64, mut new: NewUser) -> Result<User, ContractError> {
        let _span = enter("create_user");
        let actor = self.authorize(actor_id, Resource::User, Action::Create)?;
        new.email = new.email.trim().to_lowercase();
        if !new.email.contains('@') {
            return Err(ContractError::validation("Enter a valid email address."));
        }
        new.full_name = required("Full name", &new.full_name)?;
        self.check_references(None, new.department_id)?;

        let user = self.store.insert_user(&new, Utc::now())?;
        log::info!("user {} ({}) created by user {}", user.id, user.role, actor.id);
        Ok(user)
    }

    pub fn update_user(
        &self,
        actor_id: i64,
        user_id: i64,
        mut patch: UserPatch,
    ) -> Result<User, ContractError> {
        self.authorize(actor_id, Resource::User, Action::Update)?;
        if let Some(name) = &patch.full_name {
            patch.full_name = Some(required("Full name", name)?);
        }
        self.check_references(None, patch.department_id.flatten())?;
        self.store.update_user(user_id, &patch)
    }

    /// Remove a user. Contracts keep existing with the user's anchor and
    /// audit references cleared; the user's comments go with them.
    pub fn delete_user(&self, actor_id: i64, user_id: i64) -> Result<(), ContractError> {
        let actor = self.authorize(actor_id, Resource::User, Action::Delete)?;
        self.store.delete_user(user_id)?;
        log::info!("user {user_id} deleted by user {}", actor.id);
        Ok(())
    }

    pub fn get_user(&self, actor_id: i64, user_id: i64) -> Result<User, ContractError> {
        self.authorize(actor_id, Resource::User, Action::Read)?;
        self.store
            .get_user(user_id)?
            .ok_or_else(|| ContractError::not_found("user", user_id))
    }

    pub fn list_users(&self, actor_id: i64, filter: &UserFilter) -> Result<Vec<User>, ContractError> {
        self.authorize(actor_id, Resource::User, Action::Read)?;
        self.store.list_users(filter)
    }

    /// Record activity for `user_id`, writing at most once a minute.
    /// Returns whether the timestamp was updated.
    pub fn touch_last_active(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, ContractError> {
        self.store.touch_last_active(
            user_id,
            now,
            chrono::Duration::seconds(LAST_ACTIVE_INTERVAL_SECONDS),
        )
    }
}

/// Trimmed, non-empty.
fn required(field: &str, value: &str) -> Result<String, ContractError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContractError::validation(format!("{field} cannot be blank.")));
    }
    Ok(value.to_string())
}

fn check_value(value: Option<Decimal>) -> Result<(), ContractError> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => Err(ContractError::validation(
            "Estimated contract value cannot be negative.",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ContractCode;
    use crate::documents::MemoryDocumentStorage;
    use crate::domain::{ContractStatus, PaymentTerms, RenewalTerms};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use fake::faker::company::en::CompanyName;
    use fake::faker::lorem::en::Sentence;
    use fake::Fake;
    use std::collections::HashSet;
    use std::sync::Arc;

    type Service = ContractService<MemoryStore, MemoryDocumentStorage>;

    struct Fixture {
        service: Service,
        admin: i64,
        procurement: i64,
        legal: i64,
        head: i64,
        signatory: i64,
        outsider: i64,
        department: i64,
        contract_type: i64,
    }

    fn user(store: &MemoryStore, email: &str, role: Role, department: Option<i64>) -> i64 {
        let new = NewUser {
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            role,
            department_id: department,
            is_staff: false,
        };
        store.insert_user(&new, Utc::now()).expect("user").id
    }

    fn fixture() -> Fixture {
        #[cfg(feature = "tracing")]
        crate::metrics::tracing_helpers::init_registry();

        let store = MemoryStore::new();
        let department = store.insert_department("Procurement").expect("department").id;
        let contract_type = store.insert_contract_type("Services").expect("type").id;
        let admin = user(&store, "admin@example.org", Role::Admin, None);
        let procurement = user(&store, "buyer@example.org", Role::ProcurementOfficer, Some(department));
        let legal = user(&store, "legal@example.org", Role::LegalReviewer, None);
        let head = user(&store, "head@example.org", Role::DepartmentHead, Some(department));
        let signatory = user(&store, "sign@example.org", Role::Signatory, None);
        let outsider = user(&store, "other@example.org", Role::LegalReviewer, None);
        Fixture {
            service: ContractService::new(store, MemoryDocumentStorage::new()),
            admin,
            procurement,
            legal,
            head,
            signatory,
            outsider,
            department,
            contract_type,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    impl Fixture {
        fn new_contract(&self) -> NewContract {
            NewContract {
                title: Sentence(2..5).fake(),
                vendor_name: CompanyName().fake(),
                contract_type_id: self.contract_type,
                department_id: None,
                start_date: today(),
                end_date: today() + Duration::days(90),
                payment_terms: PaymentTerms::Installment,
                estimated_value: Some(Decimal::new(1_250_000, 2)),
                renewal_terms: RenewalTerms::NotRenewable,
                scope_of_work: None,
                instructions_for_reviewers: None,
                legal_officer_id: Some(self.legal),
                department_head_id: Some(self.head),
                signatory_id: Some(self.signatory),
            }
        }

        fn create(&self) -> Contract {
            self.service
                .create_contract(self.procurement, self.new_contract())
                .expect("create contract")
        }

        fn history_len(&self, contract_id: i64) -> usize {
            self.service
                .store()
                .list_history(contract_id)
                .expect("history")
                .len()
        }
    }

    #[test]
    fn test_create_assigns_code_and_defaults() {
        let f = fixture();
        let contract = f.create();

        assert_eq!(contract.status, ContractStatus::Draft);
        assert_eq!(contract.code, ContractCode::new(Utc::now().year(), 1));
        assert_eq!(contract.department_id, f.department);
        assert_eq!(contract.created_by, Some(f.procurement));
        assert!(ContractCode::parse(&contract.code.to_string()).is_ok());

        let second = f.create();
        assert_eq!(second.code.sequence(), 2);
    }

    #[test]
    fn test_create_requires_procurement_role() {
        let f = fixture();
        let err = f
            .service
            .create_contract(f.legal, f.new_contract())
            .expect_err("legal reviewers cannot create");
        assert!(matches!(err, ContractError::Forbidden(_)));

        let err = f
            .service
            .create_contract(9_999, f.new_contract())
            .expect_err("unknown actor");
        assert!(matches!(err, ContractError::Forbidden(_)));

        assert!(f.service.create_contract(f.admin, f.new_contract()).is_err());
        let mut with_department = f.new_contract();
        with_department.department_id = Some(f.department);
        assert!(f.service.create_contract(f.admin, with_department).is_ok());
    }

    #[test]
    fn test_create_rejects_bad_dates_without_writing() {
        let f = fixture();

        let mut inverted = f.new_contract();
        inverted.end_date = inverted.start_date - Duration::days(1);
        assert!(matches!(
            f.service.create_contract(f.procurement, inverted),
            Err(ContractError::Validation(_))
        ));

        let mut past = f.new_contract();
        past.start_date = today() - Duration::days(60);
        past.end_date = today() - Duration::days(1);
        assert!(matches!(
            f.service.create_contract(f.procurement, past),
            Err(ContractError::Validation(_))
        ));

        let listed = f
            .service
            .list_contracts(f.procurement, &ContractFilter::default())
            .expect("list");
        assert!(listed.is_empty());
        // the next successful create still gets the first sequence number
        assert_eq!(f.create().code.sequence(), 1);
    }

    #[test]
    fn test_create_checks_references_and_anchor_roles() {
        let f = fixture();

        let mut missing_type = f.new_contract();
        missing_type.contract_type_id = 4_242;
        assert!(matches!(
            f.service.create_contract(f.procurement, missing_type),
            Err(ContractError::NotFound { entity: "contract type", .. })
        ));

        let mut wrong_role = f.new_contract();
        wrong_role.signatory_id = Some(f.legal);
        assert!(matches!(
            f.service.create_contract(f.procurement, wrong_role),
            Err(ContractError::Validation(_))
        ));

        let mut blank = f.new_contract();
        blank.vendor_name = "   ".into();
        assert!(matches!(
            f.service.create_contract(f.procurement, blank),
            Err(ContractError::Validation(_))
        ));
    }

    #[test]
    fn test_update_keeps_date_invariant() {
        let f = fixture();
        let contract = f.create();

        let patch = ContractPatch {
            end_date: Some(contract.start_date - Duration::days(3)),
            title: Some("Renamed".into()),
            ..ContractPatch::default()
        };
        assert!(matches!(
            f.service.update_contract(f.procurement, contract.id, patch),
            Err(ContractError::Validation(_))
        ));
        let stored = f.service.store().get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.title, contract.title);
        assert_eq!(stored.end_date, contract.end_date);

        let patch = ContractPatch {
            title: Some("  Renamed  ".into()),
            signatory_id: Some(None),
            ..ContractPatch::default()
        };
        let updated = f
            .service
            .update_contract(f.procurement, contract.id, patch)
            .expect("update");
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.signatory_id, None);
        assert_eq!(updated.code, contract.code);
        assert_eq!(updated.updated_by, Some(f.procurement));
    }

    #[test]
    fn test_concurrent_creations_get_distinct_codes() {
        let f = fixture();
        let procurement = f.procurement;
        let template = f.new_contract();
        let service = Arc::new(f.service);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                let fields = template.clone();
                may::go!(move || service.create_contract(procurement, fields))
            })
            .collect();

        let year = Utc::now().year();
        let mut codes = HashSet::new();
        for handle in handles {
            let contract = handle
                .join()
                .expect("coroutine finished")
                .expect("create contract");
            let rendered = contract.code.to_string();
            assert!(rendered.starts_with(&format!("CON-{year}-")));
            assert_eq!(rendered.len(), "CON-2026-0001".len());
            assert!(codes.insert(rendered));
        }
        assert_eq!(codes.len(), 16);
    }

    #[test]
    fn test_transition_path_and_history() {
        let f = fixture();
        let contract = f.create();

        for (to, from) in [
            ("submitted", ContractStatus::Draft),
            ("returned", ContractStatus::Submitted),
            ("draft", ContractStatus::Returned),
        ] {
            let before = f.history_len(contract.id);
            let record = f
                .service
                .transition_status(contract.id, to, f.procurement, Some("ok"))
                .expect("legal transition");
            assert_eq!(record.old_status, from);
            assert_eq!(record.new_status.as_str(), to);
            assert_eq!(record.changed_by, Some(f.procurement));
            assert_eq!(f.history_len(contract.id), before + 1);
        }

        let err = f
            .service
            .transition_status(contract.id, "approved", f.procurement, None)
            .expect_err("draft -> approved");
        assert!(matches!(
            err,
            ContractError::InvalidTransition {
                from: ContractStatus::Draft,
                to: ContractStatus::Approved
            }
        ));
        assert_eq!(f.history_len(contract.id), 3);
    }

    #[test]
    fn test_terminal_status_cannot_move() {
        let f = fixture();
        let contract = f.create();
        f.service
            .transition_status(contract.id, "submitted", f.procurement, None)
            .expect("submit");
        f.service
            .transition_status(contract.id, "approved", f.procurement, Some("signed off"))
            .expect("approve");

        let err = f
            .service
            .transition_status(contract.id, "draft", f.procurement, Some("reopen"))
            .expect_err("approved is terminal");
        assert!(matches!(err, ContractError::InvalidTransition { .. }));

        let stored = f.service.store().get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.status, ContractStatus::Approved);
        assert_eq!(stored.remarks.as_deref(), Some("signed off"));
        assert_eq!(f.history_len(contract.id), 2);
    }

    #[test]
    fn test_transition_input_errors() {
        let f = fixture();
        let contract = f.create();

        assert!(matches!(
            f.service.transition_status(contract.id, "archived", f.procurement, None),
            Err(ContractError::Validation(_))
        ));
        assert!(matches!(
            f.service.transition_status(404, "submitted", f.procurement, None),
            Err(ContractError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.transition_status(contract.id, "submitted", f.signatory, None),
            Err(ContractError::Forbidden(_))
        ));
        // a bad status from someone who may not transition is still a denial
        assert!(matches!(
            f.service.transition_status(contract.id, "archived", f.signatory, None),
            Err(ContractError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.transition_status(contract.id, "archived", 999, None),
            Err(ContractError::Forbidden(_))
        ));
        assert_eq!(f.history_len(contract.id), 0);
    }

    #[test]
    fn test_blank_remarks_keep_previous_remarks() {
        let f = fixture();
        let contract = f.create();
        f.service
            .transition_status(contract.id, "submitted", f.procurement, Some("first pass"))
            .expect("submit");
        f.service
            .transition_status(contract.id, "returned", f.procurement, Some("  "))
            .expect("return");
        let stored = f.service.store().get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.remarks.as_deref(), Some("first pass"));

        let record = f
            .service
            .transition_status(contract.id, "draft", f.procurement, Some("  see clause 4\n"))
            .expect("back to draft");
        assert_eq!(record.remarks.as_deref(), Some("  see clause 4\n"));
        let stored = f.service.store().get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.remarks.as_deref(), Some("  see clause 4\n"));
    }

    #[test]
    fn test_comments_limited_to_anchors() {
        let f = fixture();
        let contract = f.create();

        let err = f
            .service
            .add_comment(contract.id, f.outsider, "let me in")
            .expect_err("outsider");
        assert!(matches!(err, ContractError::Forbidden(_)));
        assert!(f.service.list_comments(Some(contract.id), f.legal).expect("list").is_empty());

        f.service
            .add_comment(contract.id, f.legal, "Clause 4 needs a cap.")
            .expect("legal officer comments");
        f.service
            .add_comment(contract.id, f.procurement, "Updated.")
            .expect("creator comments");

        let seen = f.service.list_comments(Some(contract.id), f.head).expect("list");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].body, "Clause 4 needs a cap.");

        assert!(f.service.list_comments(Some(contract.id), f.outsider).expect("list").is_empty());
        assert!(f.service.list_comments(None, f.outsider).expect("list").is_empty());
        assert!(matches!(
            f.service.add_comment(contract.id, f.signatory, "   "),
            Err(ContractError::Validation(_))
        ));
        assert!(matches!(
            f.service.add_comment(777, f.legal, "hello"),
            Err(ContractError::NotFound { .. })
        ));
    }

    #[test]
    fn test_removed_anchor_loses_comment_access() {
        let f = fixture();
        let contract = f.create();
        let patch = ContractPatch {
            legal_officer_id: Some(None),
            ..ContractPatch::default()
        };
        f.service
            .update_contract(f.procurement, contract.id, patch)
            .expect("clear legal officer");
        assert!(matches!(
            f.service.add_comment(contract.id, f.legal, "still here?"),
            Err(ContractError::Forbidden(_))
        ));
    }

    #[test]
    fn test_upload_and_delete_documents() {
        let f = fixture();
        let contract = f.create();

        assert!(matches!(
            f.service.upload_documents(f.procurement, contract.id, Vec::new()),
            Err(ContractError::Validation(msg)) if msg == "No files provided"
        ));
        assert!(matches!(
            f.service.upload_documents(f.legal, contract.id, vec![Upload::new("a.pdf", b"x".to_vec())]),
            Err(ContractError::Forbidden(_))
        ));

        let docs = f
            .service
            .upload_documents(
                f.procurement,
                contract.id,
                vec![
                    Upload::new("terms.pdf", b"terms".to_vec()),
                    Upload::new("terms.pdf", b"annex".to_vec()),
                ],
            )
            .expect("upload");
        assert_eq!(docs.len(), 2);
        assert_ne!(docs[0].storage_path, docs[1].storage_path);
        assert_eq!(docs[0].sha256, sha256_hex(b"terms"));
        assert_eq!(docs[1].size_bytes, 5);

        let (doc, bytes) = f
            .service
            .download_document(f.legal, docs[1].id)
            .expect("download");
        assert_eq!(doc.id, docs[1].id);
        assert_eq!(bytes, b"annex");

        f.service.delete_document(f.procurement, docs[0].id).expect("delete");
        assert_eq!(f.service.list_documents(f.legal, contract.id).expect("list").len(), 1);
        assert_eq!(f.service.documents().len(), 1);

        assert!(matches!(
            f.service.upload_documents(f.procurement, contract.id, vec![Upload::new("../x", b"x".to_vec())]),
            Err(ContractError::Validation(_))
        ));
    }

    #[test]
    fn test_delete_contract_cascades() {
        let f = fixture();
        let contract = f.create();
        f.service
            .upload_documents(f.procurement, contract.id, vec![Upload::new("a.pdf", b"a".to_vec())])
            .expect("upload");
        f.service
            .transition_status(contract.id, "submitted", f.procurement, None)
            .expect("submit");
        f.service
            .add_comment(contract.id, f.legal, "noted")
            .expect("comment");

        f.service.delete_contract(f.procurement, contract.id).expect("delete");

        assert!(matches!(
            f.service.get_contract(f.legal, contract.id),
            Err(ContractError::NotFound { .. })
        ));
        assert_eq!(f.history_len(contract.id), 0);
        assert!(f.service.list_comments(None, f.legal).expect("list").is_empty());
        assert!(f.service.documents().is_empty());
    }

    #[test]
    fn test_get_contract_details() {
        let f = fixture();
        let mut fields = f.new_contract();
        fields.start_date = today() - Duration::days(5);
        fields.end_date = today() + Duration::days(10);
        let contract = f
            .service
            .create_contract(f.procurement, fields)
            .expect("create");

        let details = f.service.get_contract(f.outsider, contract.id).expect("details");
        assert_eq!(details.total_days, 15);
        assert_eq!(details.days_remaining, 10);
        assert!(details.is_expiring_soon);
        assert!(!details.is_active);

        f.service
            .transition_status(contract.id, "submitted", f.procurement, None)
            .expect("submit");
        f.service
            .transition_status(contract.id, "approved", f.procurement, None)
            .expect("approve");
        let details = f.service.get_contract(f.outsider, contract.id).expect("details");
        assert!(details.is_active);
        assert_eq!(details.history.len(), 2);
        assert_eq!(details.history[0].new_status, ContractStatus::Approved);

        let expiring = f.service.list_expiring_contracts(f.legal).expect("expiring");
        assert_eq!(expiring.len(), 1);
    }

    #[test]
    fn test_details_computed_for_given_day() {
        let f = fixture();
        let contract = f.create();
        let day = contract.end_date + Duration::days(1);
        let details = ContractDetails::on(contract, Vec::new(), Vec::new(), day, 30);
        assert_eq!(details.days_remaining, 0);
        assert!(!details.is_expiring_soon);

        assert_eq!(details.status_display, "Draft");
        assert_eq!(details.payment_terms_display, "Installment");
        assert_eq!(details.renewal_terms_display, "Not Renewable");
        let json = serde_json::to_value(&details).expect("serialize details");
        assert_eq!(json["payment_terms_display"], "Installment");
        assert_eq!(json["contract"]["payment_terms"], "installment");
    }

    #[test]
    fn test_admin_only_reference_data() {
        let f = fixture();
        assert!(matches!(
            f.service.create_contract_type(f.procurement, "Lease"),
            Err(ContractError::Forbidden(_))
        ));
        let lease = f.service.create_contract_type(f.admin, " Lease ").expect("admin creates");
        assert_eq!(lease.name, "Lease");
        assert_eq!(f.service.list_contract_types(f.signatory).expect("read").len(), 2);

        f.create();
        assert!(matches!(
            f.service.delete_department(f.admin, f.department),
            Err(ContractError::Validation(_))
        ));
        assert!(matches!(
            f.service.delete_contract_type(f.admin, f.contract_type),
            Err(ContractError::Validation(_))
        ));
        f.service.delete_contract_type(f.admin, lease.id).expect("unused type");

        let legal = f.service.create_department(f.admin, "Legal").expect("department");
        let renamed = f
            .service
            .rename_department(f.admin, legal.id, "Legal Affairs")
            .expect("rename");
        assert_eq!(renamed.name, "Legal Affairs");
    }

    #[test]
    fn test_user_management_and_deletion() {
        let f = fixture();
        assert!(matches!(
            f.service.list_users(f.procurement, &UserFilter::default()),
            Err(ContractError::Forbidden(_))
        ));

        let created = f
            .service
            .create_user(
                f.admin,
                NewUser {
                    email: " New.Signer@Example.org ".into(),
                    full_name: "New Signer".into(),
                    role: Role::Signatory,
                    department_id: None,
                    is_staff: false,
                },
            )
            .expect("create user");
        assert_eq!(created.email, "new.signer@example.org");

        let filter = UserFilter {
            role: Some(Role::Signatory),
            ..UserFilter::default()
        };
        assert_eq!(f.service.list_users(f.admin, &filter).expect("list").len(), 2);

        let contract = f.create();
        f.service
            .add_comment(contract.id, f.legal, "before leaving")
            .expect("comment");
        f.service.delete_user(f.admin, f.legal).expect("delete user");

        let stored = f.service.store().get_contract(contract.id).expect("get").expect("kept");
        assert_eq!(stored.legal_officer_id, None);
        assert!(f.service.list_comments(Some(contract.id), f.procurement).expect("list").is_empty());

        let patch = UserPatch {
            is_active: Some(false),
            ..UserPatch::default()
        };
        f.service.update_user(f.admin, f.head, patch).expect("deactivate");
        assert!(matches!(
            f.service.get_contract(f.head, contract.id),
            Err(ContractError::Forbidden(_))
        ));
    }

    #[test]
    fn test_touch_last_active_once_a_minute() {
        let f = fixture();
        let user = f.service.store().get_user(f.legal).expect("get").expect("exists");
        let t0 = user.last_active;
        assert!(!f.service.touch_last_active(f.legal, t0 + Duration::seconds(30)).expect("touch"));
        assert!(f.service.touch_last_active(f.legal, t0 + Duration::seconds(61)).expect("touch"));
        assert!(matches!(
            f.service.touch_last_active(12_345, t0),
            Err(ContractError::NotFound { .. })
        ));
    }
}
