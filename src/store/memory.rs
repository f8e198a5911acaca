//! Process-local gateway.
//!
//! All tables live behind one `may::sync::Mutex`, so every trait method is
//! atomic with respect to the others. Cascades that the SQL schema expresses
//! with `ON DELETE` clauses are written out here by hand.

use super::{
    search_needle, ContractFilter, ContractInsert, ContractOrder, ContractStore, DocumentInsert,
    UserFilter,
};
use crate::code::ContractCode;
use crate::domain::{
    Comment, Contract, ContractDocument, ContractPatch, ContractStatus, ContractType, Department,
    NewUser, StatusHistory, User, UserPatch,
};
use crate::error::ContractError;
use crate::executor::DbError;
use crate::lifecycle;
use chrono::{DateTime, Utc};
use may::sync::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<i64, User>,
    departments: BTreeMap<i64, Department>,
    contract_types: BTreeMap<i64, ContractType>,
    contracts: BTreeMap<i64, Contract>,
    code_counters: HashMap<i32, u32>,
    documents: BTreeMap<i64, ContractDocument>,
    history: BTreeMap<i64, StatusHistory>,
    comments: BTreeMap<i64, Comment>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn contract(&self, id: i64) -> Result<&Contract, ContractError> {
        self.contracts
            .get(&id)
            .ok_or_else(|| ContractError::not_found("contract", id))
    }

    fn contract_mut(&mut self, id: i64) -> Result<&mut Contract, ContractError> {
        self.contracts
            .get_mut(&id)
            .ok_or_else(|| ContractError::not_found("contract", id))
    }

    fn check_references(
        &self,
        contract_type_id: i64,
        department_id: i64,
    ) -> Result<(), ContractError> {
        if !self.contract_types.contains_key(&contract_type_id) {
            return Err(ContractError::validation(format!(
                "contract type {contract_type_id} does not exist"
            )));
        }
        if !self.departments.contains_key(&department_id) {
            return Err(ContractError::validation(format!(
                "department {department_id} does not exist"
            )));
        }
        Ok(())
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, ContractError> {
        self.tables
            .lock()
            .map_err(|_| ContractError::Database(DbError::Other("memory store lock poisoned".into())))
    }
}

fn duplicate(what: &str, name: &str) -> ContractError {
    ContractError::validation(format!("{what} with name '{name}' already exists"))
}

impl ContractStore for MemoryStore {
    fn insert_user(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User, ContractError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(ContractError::validation(format!(
                "user with email '{}' already exists",
                new.email
            )));
        }
        if let Some(dep) = new.department_id {
            if !t.departments.contains_key(&dep) {
                return Err(ContractError::validation(format!("department {dep} does not exist")));
            }
        }
        let id = t.next_id();
        let user = User {
            id,
            email: new.email.clone(),
            full_name: new.full_name.clone(),
            role: new.role,
            department_id: new.department_id,
            is_staff: new.is_staff,
            is_active: true,
            created_at: now,
            last_active: now,
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, ContractError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn update_user(&self, id: i64, patch: &UserPatch) -> Result<User, ContractError> {
        let mut t = self.lock()?;
        if let Some(Some(dep)) = patch.department_id {
            if !t.departments.contains_key(&dep) {
                return Err(ContractError::validation(format!("department {dep} does not exist")));
            }
        }
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| ContractError::not_found("user", id))?;
        patch.apply(user);
        Ok(user.clone())
    }

    fn delete_user(&self, id: i64) -> Result<(), ContractError> {
        let mut t = self.lock()?;
        if t.users.remove(&id).is_none() {
            return Err(ContractError::not_found("user", id));
        }
        for contract in t.contracts.values_mut() {
            contract.detach_user(id);
        }
        for entry in t.history.values_mut() {
            if entry.changed_by == Some(id) {
                entry.changed_by = None;
            }
        }
        t.comments.retain(|_, c| c.user_id != id);
        Ok(())
    }

    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, ContractError> {
        let t = self.lock()?;
        let needle = search_needle(filter.search.as_deref());
        let mut users: Vec<User> = t
            .users
            .values()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| filter.is_active.map_or(true, |a| u.is_active == a))
            .filter(|u| {
                needle.as_deref().map_or(true, |n| {
                    u.full_name.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    fn touch_last_active(
        &self,
        id: i64,
        now: DateTime<Utc>,
        min_interval: chrono::Duration,
    ) -> Result<bool, ContractError> {
        let mut t = self.lock()?;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| ContractError::not_found("user", id))?;
        if now - user.last_active > min_interval {
            user.last_active = now;
            return Ok(true);
        }
        Ok(false)
    }

    fn insert_department(&self, name: &str) -> Result<Department, ContractError> {
        let mut t = self.lock()?;
        if t.departments.values().any(|d| d.name == name) {
            return Err(duplicate("department", name));
        }
        let id = t.next_id();
        let department = Department { id, name: name.to_string() };
        t.departments.insert(id, department.clone());
        Ok(department)
    }

    fn get_department(&self, id: i64) -> Result<Option<Department>, ContractError> {
        Ok(self.lock()?.departments.get(&id).cloned())
    }

    fn rename_department(&self, id: i64, name: &str) -> Result<Department, ContractError> {
        let mut t = self.lock()?;
        if t.departments.values().any(|d| d.name == name && d.id != id) {
            return Err(duplicate("department", name));
        }
        let department = t
            .departments
            .get_mut(&id)
            .ok_or_else(|| ContractError::not_found("department", id))?;
        department.name = name.to_string();
        Ok(department.clone())
    }

    fn delete_department(&self, id: i64) -> Result<(), ContractError> {
        let mut t = self.lock()?;
        if !t.departments.contains_key(&id) {
            return Err(ContractError::not_found("department", id));
        }
        if t.contracts.values().any(|c| c.department_id == id) {
            return Err(ContractError::validation(
                "department is referenced by contracts and cannot be deleted",
            ));
        }
        t.departments.remove(&id);
        for user in t.users.values_mut() {
            if user.department_id == Some(id) {
                user.department_id = None;
            }
        }
        Ok(())
    }

    fn list_departments(&self) -> Result<Vec<Department>, ContractError> {
        let mut departments: Vec<Department> = self.lock()?.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    fn insert_contract_type(&self, name: &str) -> Result<ContractType, ContractError> {
        let mut t = self.lock()?;
        if t.contract_types.values().any(|c| c.name == name) {
            return Err(duplicate("contract type", name));
        }
        let id = t.next_id();
        let contract_type = ContractType { id, name: name.to_string() };
        t.contract_types.insert(id, contract_type.clone());
        Ok(contract_type)
    }

    fn get_contract_type(&self, id: i64) -> Result<Option<ContractType>, ContractError> {
        Ok(self.lock()?.contract_types.get(&id).cloned())
    }

    fn rename_contract_type(&self, id: i64, name: &str) -> Result<ContractType, ContractError> {
        let mut t = self.lock()?;
        if t.contract_types.values().any(|c| c.name == name && c.id != id) {
            return Err(duplicate("contract type", name));
        }
        let contract_type = t
            .contract_types
            .get_mut(&id)
            .ok_or_else(|| ContractError::not_found("contract type", id))?;
        contract_type.name = name.to_string();
        Ok(contract_type.clone())
    }

    fn delete_contract_type(&self, id: i64) -> Result<(), ContractError> {
        let mut t = self.lock()?;
        if !t.contract_types.contains_key(&id) {
            return Err(ContractError::not_found("contract type", id));
        }
        if t.contracts.values().any(|c| c.contract_type_id == id) {
            return Err(ContractError::validation(
                "contract type is referenced by contracts and cannot be deleted",
            ));
        }
        t.contract_types.remove(&id);
        Ok(())
    }

    fn list_contract_types(&self) -> Result<Vec<ContractType>, ContractError> {
        let mut types: Vec<ContractType> = self.lock()?.contract_types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    fn insert_contract(&self, insert: &ContractInsert) -> Result<Contract, ContractError> {
        let mut t = self.lock()?;
        let f = &insert.fields;
        t.check_references(f.contract_type_id, insert.department_id)?;

        let sequence = {
            let counter = t.code_counters.entry(insert.code_year).or_insert(0);
            *counter += 1;
            *counter
        };
        let id = t.next_id();
        let contract = Contract {
            id,
            code: ContractCode::new(insert.code_year, sequence),
            title: f.title.clone(),
            vendor_name: f.vendor_name.clone(),
            contract_type_id: f.contract_type_id,
            department_id: insert.department_id,
            start_date: f.start_date,
            end_date: f.end_date,
            payment_terms: f.payment_terms,
            estimated_value: f.estimated_value,
            renewal_terms: f.renewal_terms,
            scope_of_work: f.scope_of_work.clone(),
            instructions_for_reviewers: f.instructions_for_reviewers.clone(),
            status: ContractStatus::Draft,
            remarks: None,
            legal_officer_id: f.legal_officer_id,
            department_head_id: f.department_head_id,
            signatory_id: f.signatory_id,
            created_by: Some(insert.created_by),
            updated_by: Some(insert.created_by),
            created_at: insert.created_at,
            updated_at: insert.created_at,
        };
        t.contracts.insert(id, contract.clone());
        Ok(contract)
    }

    fn get_contract(&self, id: i64) -> Result<Option<Contract>, ContractError> {
        Ok(self.lock()?.contracts.get(&id).cloned())
    }

    fn update_contract(
        &self,
        id: i64,
        patch: &ContractPatch,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Contract, ContractError> {
        let mut t = self.lock()?;
        let mut updated = t.contract(id)?.clone();
        patch.apply(&mut updated);
        lifecycle::validate_dates(updated.start_date, updated.end_date, at.date_naive(), false)?;
        t.check_references(updated.contract_type_id, updated.department_id)?;
        updated.updated_by = Some(actor_id);
        updated.updated_at = at;
        t.contracts.insert(id, updated.clone());
        Ok(updated)
    }

    fn delete_contract(&self, id: i64) -> Result<(), ContractError> {
        let mut t = self.lock()?;
        if t.contracts.remove(&id).is_none() {
            return Err(ContractError::not_found("contract", id));
        }
        t.documents.retain(|_, d| d.contract_id != id);
        t.history.retain(|_, h| h.contract_id != id);
        t.comments.retain(|_, c| c.contract_id != id);
        Ok(())
    }

    fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, ContractError> {
        let t = self.lock()?;
        let needle = search_needle(filter.search.as_deref());
        let mut contracts: Vec<Contract> = t
            .contracts
            .values()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.department_id.map_or(true, |d| c.department_id == d))
            .filter(|c| {
                needle.as_deref().map_or(true, |n| {
                    c.code.to_string().to_lowercase().contains(n)
                        || c.vendor_name.to_lowercase().contains(n)
                        || c.title.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        contracts.sort_by(|a, b| {
            let ord = match filter.order_by {
                ContractOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                ContractOrder::EndDate => a.end_date.cmp(&b.end_date),
                ContractOrder::Status => a.status.as_str().cmp(b.status.as_str()),
            }
            .then(a.id.cmp(&b.id));
            if filter.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let limit = filter
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(contracts.into_iter().skip(offset).take(limit).collect())
    }

    fn apply_transition(
        &self,
        contract_id: i64,
        to: ContractStatus,
        actor_id: i64,
        remarks: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StatusHistory, ContractError> {
        let mut t = self.lock()?;
        let change = lifecycle::plan_transition(t.contract(contract_id)?, to, actor_id, remarks, at)?;
        change.apply(t.contract_mut(contract_id)?);

        let id = t.next_id();
        let entry = StatusHistory {
            id,
            contract_id,
            old_status: change.from,
            new_status: change.to,
            changed_by: Some(actor_id),
            remarks: change.remarks,
            changed_at: at,
        };
        t.history.insert(id, entry.clone());
        Ok(entry)
    }

    fn list_history(&self, contract_id: i64) -> Result<Vec<StatusHistory>, ContractError> {
        let t = self.lock()?;
        let mut entries: Vec<StatusHistory> = t
            .history
            .values()
            .filter(|h| h.contract_id == contract_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    fn insert_comment(
        &self,
        contract_id: i64,
        user_id: i64,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, ContractError> {
        let mut t = self.lock()?;
        if !t.contract(contract_id)?.is_anchor(user_id) {
            return Err(ContractError::forbidden(
                "You are not allowed to comment on this contract.",
            ));
        }
        let id = t.next_id();
        let comment = Comment {
            id,
            contract_id,
            user_id,
            body: body.to_string(),
            created_at: at,
        };
        t.comments.insert(id, comment.clone());
        Ok(comment)
    }

    fn list_comments(
        &self,
        contract_id: Option<i64>,
        viewer_id: i64,
    ) -> Result<Vec<Comment>, ContractError> {
        let t = self.lock()?;
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| contract_id.map_or(true, |id| c.contract_id == id))
            .filter(|c| {
                t.contracts
                    .get(&c.contract_id)
                    .is_some_and(|contract| contract.is_anchor(viewer_id))
            })
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    fn insert_document(&self, doc: &DocumentInsert) -> Result<ContractDocument, ContractError> {
        let mut t = self.lock()?;
        t.contract(doc.contract_id)?;
        let id = t.next_id();
        let document = ContractDocument {
            id,
            contract_id: doc.contract_id,
            file_name: doc.file_name.clone(),
            storage_path: doc.storage_path.clone(),
            size_bytes: doc.size_bytes,
            sha256: doc.sha256.clone(),
            uploaded_at: doc.uploaded_at,
        };
        t.documents.insert(id, document.clone());
        Ok(document)
    }

    fn get_document(&self, id: i64) -> Result<Option<ContractDocument>, ContractError> {
        Ok(self.lock()?.documents.get(&id).cloned())
    }

    fn list_documents(&self, contract_id: i64) -> Result<Vec<ContractDocument>, ContractError> {
        let t = self.lock()?;
        let mut docs: Vec<ContractDocument> = t
            .documents
            .values()
            .filter(|d| d.contract_id == contract_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    fn delete_document(&self, id: i64) -> Result<(), ContractError> {
        let mut t = self.lock()?;
        t.documents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ContractError::not_found("document", id))
    }
}
