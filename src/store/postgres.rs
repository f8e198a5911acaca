//! PostgreSQL gateway over a [`ConnectionPool`].
//!
//! Multi-write operations run in one transaction on one pooled connection.
//! Code assignment bumps the per-year row in `contract_code_counters` with an
//! upsert; the row lock it takes is held until the contract insert commits,
//! so concurrent creations in the same year queue behind each other. Status
//! transitions and field edits lock the contract row with `FOR UPDATE`.

use super::rows::{
    map_rows, COMMENT_COLUMNS, CONTRACT_COLUMNS, DOCUMENT_COLUMNS, HISTORY_COLUMNS, USER_COLUMNS,
};
use super::{
    search_needle, ContractFilter, ContractInsert, ContractStore, DocumentInsert, UserFilter,
};
use crate::code::ContractCode;
use crate::domain::{
    Comment, Contract, ContractDocument, ContractPatch, ContractStatus, ContractType, Department,
    NewUser, StatusHistory, User, UserPatch,
};
use crate::error::ContractError;
use crate::executor::{DbError, SqlExecutor};
use crate::lifecycle;
use crate::pool::ConnectionPool;
use crate::query::{with_converted_params, FromRow};
use crate::transaction::{in_transaction, IsolationLevel};
use chrono::{DateTime, Utc};
use may_postgres::types::ToSql;
use sea_query::{Asterisk, Cond, Expr, ExprTrait, Order, PostgresQueryBuilder, Query};

pub struct PostgresStore {
    pool: ConnectionPool,
}

impl PostgresStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn fetch_opt<T: FromRow>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Option<T>, ContractError> {
        let conn = self.pool.acquire()?;
        Ok(conn.query_opt(sql, params)?.as_ref().map(T::from_row).transpose()?)
    }

    fn fetch_all<T: FromRow>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<T>, ContractError> {
        let conn = self.pool.acquire()?;
        Ok(map_rows(&conn.query_all(sql, params)?)?)
    }

    fn fetch_one<T: FromRow>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<T, ContractError> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(sql, params).map_err(constraint_error)?;
        Ok(T::from_row(&row)?)
    }

    fn fetch_built<T: FromRow>(
        &self,
        sql: &str,
        values: &sea_query::Values,
    ) -> Result<Vec<T>, ContractError> {
        let conn = self.pool.acquire()?;
        let rows = with_converted_params(values, |params| conn.query_all(sql, params))?;
        Ok(map_rows(&rows)?)
    }

    fn delete_by_id(&self, sql: &str, id: i64, entity: &'static str) -> Result<(), ContractError> {
        let conn = self.pool.acquire()?;
        match conn.execute(sql, &[&id]).map_err(constraint_error)? {
            0 => Err(ContractError::not_found(entity, id)),
            _ => Ok(()),
        }
    }
}

/// Map constraint violations to validation errors; anything else stays a
/// database error.
fn constraint_error(err: DbError) -> ContractError {
    let detail = match &err {
        DbError::Postgres(e) => e
            .as_db_error()
            .map_or_else(|| e.to_string(), |db| db.message().to_string()),
        other => other.to_string(),
    };
    if err.is_unique_violation() {
        ContractError::validation(format!("already exists: {detail}"))
    } else if err.is_foreign_key_violation() {
        ContractError::validation(format!("invalid reference: {detail}"))
    } else if err.is_check_violation() {
        ContractError::validation(format!("constraint violated: {detail}"))
    } else {
        ContractError::Database(err)
    }
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn lock_contract(tx: &dyn SqlExecutor, id: i64, mode: &str) -> Result<Contract, ContractError> {
    let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1 FOR {mode}");
    let row = tx
        .query_opt(&sql, &[&id])?
        .ok_or_else(|| ContractError::not_found("contract", id))?;
    Ok(Contract::from_row(&row)?)
}

impl ContractStore for PostgresStore {
    fn insert_user(&self, new: &NewUser, now: DateTime<Utc>) -> Result<User, ContractError> {
        let sql = format!(
            "INSERT INTO users (email, full_name, role, department_id, is_staff, is_active, created_at, last_active) \
             VALUES ($1, $2, $3, $4, $5, true, $6, $6) RETURNING {USER_COLUMNS}"
        );
        self.fetch_one(
            &sql,
            &[
                &new.email,
                &new.full_name,
                &new.role.as_str(),
                &new.department_id,
                &new.is_staff,
                &now,
            ],
        )
    }

    fn get_user(&self, id: i64) -> Result<Option<User>, ContractError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.fetch_opt(&sql, &[&id])
    }

    fn update_user(&self, id: i64, patch: &UserPatch) -> Result<User, ContractError> {
        let conn = self.pool.acquire()?;
        in_transaction(conn.client(), IsolationLevel::ReadCommitted, |tx| {
            let select = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
            let row = tx
                .query_opt(&select, &[&id])?
                .ok_or_else(|| ContractError::not_found("user", id))?;
            let mut user = User::from_row(&row)?;
            patch.apply(&mut user);

            let update = format!(
                "UPDATE users SET full_name = $2, role = $3, department_id = $4, is_staff = $5, is_active = $6 \
                 WHERE id = $1 RETURNING {USER_COLUMNS}"
            );
            let row = tx
                .query_one(
                    &update,
                    &[
                        &id,
                        &user.full_name,
                        &user.role.as_str(),
                        &user.department_id,
                        &user.is_staff,
                        &user.is_active,
                    ],
                )
                .map_err(constraint_error)?;
            Ok(User::from_row(&row)?)
        })
    }

    fn delete_user(&self, id: i64) -> Result<(), ContractError> {
        // anchors, audit columns and history go NULL, comments cascade
        self.delete_by_id("DELETE FROM users WHERE id = $1", id, "user")
    }

    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, ContractError> {
        let mut query = Query::select();
        query.column(Asterisk).from("users");

        if let Some(needle) = search_needle(filter.search.as_deref()) {
            let pattern = like_pattern(&needle);
            query.cond_where(
                Cond::any()
                    .add(Expr::cust("LOWER(full_name)").like(pattern.clone()))
                    .add(Expr::cust("LOWER(email)").like(pattern)),
            );
        }
        if let Some(role) = filter.role {
            query.and_where(Expr::col("role").eq(role.as_str()));
        }
        if let Some(active) = filter.is_active {
            query.and_where(Expr::col("is_active").eq(active));
        }
        query
            .order_by("full_name", Order::Asc)
            .order_by("id", Order::Asc);

        let (sql, values) = query.build(PostgresQueryBuilder);
        self.fetch_built(&sql, &values)
    }

    fn touch_last_active(
        &self,
        id: i64,
        now: DateTime<Utc>,
        min_interval: chrono::Duration,
    ) -> Result<bool, ContractError> {
        let stale_before = now - min_interval;
        let conn = self.pool.acquire()?;
        let updated = conn.execute(
            "UPDATE users SET last_active = $2 WHERE id = $1 AND last_active < $3",
            &[&id, &now, &stale_before],
        )?;
        if updated > 0 {
            return Ok(true);
        }
        match conn.query_opt("SELECT 1 FROM users WHERE id = $1", &[&id])? {
            Some(_) => Ok(false),
            None => Err(ContractError::not_found("user", id)),
        }
    }

    fn insert_department(&self, name: &str) -> Result<Department, ContractError> {
        self.fetch_one(
            "INSERT INTO departments (name) VALUES ($1) RETURNING id, name",
            &[&name],
        )
    }

    fn get_department(&self, id: i64) -> Result<Option<Department>, ContractError> {
        self.fetch_opt("SELECT id, name FROM departments WHERE id = $1", &[&id])
    }

    fn rename_department(&self, id: i64, name: &str) -> Result<Department, ContractError> {
        self.fetch_opt(
            "UPDATE departments SET name = $2 WHERE id = $1 RETURNING id, name",
            &[&id, &name],
        )
        .map_err(|e| match e {
            ContractError::Database(db) => constraint_error(db),
            other => other,
        })?
        .ok_or_else(|| ContractError::not_found("department", id))
    }

    fn delete_department(&self, id: i64) -> Result<(), ContractError> {
        // users.department_id goes NULL; contracts restrict
        self.delete_by_id("DELETE FROM departments WHERE id = $1", id, "department")
            .map_err(|e| match e {
                ContractError::Validation(_) => ContractError::validation(
                    "department is referenced by contracts and cannot be deleted",
                ),
                other => other,
            })
    }

    fn list_departments(&self) -> Result<Vec<Department>, ContractError> {
        self.fetch_all("SELECT id, name FROM departments ORDER BY name", &[])
    }

    fn insert_contract_type(&self, name: &str) -> Result<ContractType, ContractError> {
        self.fetch_one(
            "INSERT INTO contract_types (name) VALUES ($1) RETURNING id, name",
            &[&name],
        )
    }

    fn get_contract_type(&self, id: i64) -> Result<Option<ContractType>, ContractError> {
        self.fetch_opt("SELECT id, name FROM contract_types WHERE id = $1", &[&id])
    }

    fn rename_contract_type(&self, id: i64, name: &str) -> Result<ContractType, ContractError> {
        self.fetch_opt(
            "UPDATE contract_types SET name = $2 WHERE id = $1 RETURNING id, name",
            &[&id, &name],
        )
        .map_err(|e| match e {
            ContractError::Database(db) => constraint_error(db),
            other => other,
        })?
        .ok_or_else(|| ContractError::not_found("contract type", id))
    }

    fn delete_contract_type(&self, id: i64) -> Result<(), ContractError> {
        self.delete_by_id("DELETE FROM contract_types WHERE id = $1", id, "contract type")
            .map_err(|e| match e {
                ContractError::Validation(_) => ContractError::validation(
                    "contract type is referenced by contracts and cannot be deleted",
                ),
                other => other,
            })
    }

    fn list_contract_types(&self) -> Result<Vec<ContractType>, ContractError> {
        self.fetch_all("SELECT id, name FROM contract_types ORDER BY name", &[])
    }

    fn insert_contract(&self, insert: &ContractInsert) -> Result<Contract, ContractError> {
        let conn = self.pool.acquire()?;
        in_transaction(conn.client(), IsolationLevel::ReadCommitted, |tx| {
            let row = tx.query_one(
                "INSERT INTO contract_code_counters (year, last_value) VALUES ($1, 1) \
                 ON CONFLICT (year) DO UPDATE SET last_value = contract_code_counters.last_value + 1 \
                 RETURNING last_value",
                &[&insert.code_year],
            )?;
            let last_value: i32 = row
                .try_get(0)
                .map_err(|e| DbError::Parse(format!("code counter: {e}")))?;
            let sequence = u32::try_from(last_value)
                .map_err(|_| DbError::Parse(format!("code counter out of range: {last_value}")))?;
            let code = ContractCode::new(insert.code_year, sequence).to_string();

            let f = &insert.fields;
            let sql = format!(
                "INSERT INTO contracts (code, title, vendor_name, contract_type_id, department_id, \
                 start_date, end_date, payment_terms, estimated_value, renewal_terms, scope_of_work, \
                 instructions_for_reviewers, status, legal_officer_id, department_head_id, signatory_id, \
                 created_by, updated_by, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17, $18, $18) \
                 RETURNING {CONTRACT_COLUMNS}"
            );
            let row = tx
                .query_one(
                    &sql,
                    &[
                        &code,
                        &f.title,
                        &f.vendor_name,
                        &f.contract_type_id,
                        &insert.department_id,
                        &f.start_date,
                        &f.end_date,
                        &f.payment_terms.as_str(),
                        &f.estimated_value,
                        &f.renewal_terms.as_str(),
                        &f.scope_of_work,
                        &f.instructions_for_reviewers,
                        &ContractStatus::Draft.as_str(),
                        &f.legal_officer_id,
                        &f.department_head_id,
                        &f.signatory_id,
                        &insert.created_by,
                        &insert.created_at,
                    ],
                )
                .map_err(constraint_error)?;
            Ok(Contract::from_row(&row)?)
        })
    }

    fn get_contract(&self, id: i64) -> Result<Option<Contract>, ContractError> {
        let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1");
        self.fetch_opt(&sql, &[&id])
    }

    fn update_contract(
        &self,
        id: i64,
        patch: &ContractPatch,
        actor_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Contract, ContractError> {
        let conn = self.pool.acquire()?;
        in_transaction(conn.client(), IsolationLevel::ReadCommitted, |tx| {
            let mut c = lock_contract(tx, id, "UPDATE")?;
            patch.apply(&mut c);
            lifecycle::validate_dates(c.start_date, c.end_date, at.date_naive(), false)?;

            let sql = format!(
                "UPDATE contracts SET title = $2, vendor_name = $3, contract_type_id = $4, \
                 department_id = $5, start_date = $6, end_date = $7, payment_terms = $8, \
                 estimated_value = $9, renewal_terms = $10, scope_of_work = $11, \
                 instructions_for_reviewers = $12, legal_officer_id = $13, department_head_id = $14, \
                 signatory_id = $15, updated_by = $16, updated_at = $17 \
                 WHERE id = $1 RETURNING {CONTRACT_COLUMNS}"
            );
            let row = tx
                .query_one(
                    &sql,
                    &[
                        &id,
                        &c.title,
                        &c.vendor_name,
                        &c.contract_type_id,
                        &c.department_id,
                        &c.start_date,
                        &c.end_date,
                        &c.payment_terms.as_str(),
                        &c.estimated_value,
                        &c.renewal_terms.as_str(),
                        &c.scope_of_work,
                        &c.instructions_for_reviewers,
                        &c.legal_officer_id,
                        &c.department_head_id,
                        &c.signatory_id,
                        &actor_id,
                        &at,
                    ],
                )
                .map_err(constraint_error)?;
            Ok(Contract::from_row(&row)?)
        })
    }

    fn delete_contract(&self, id: i64) -> Result<(), ContractError> {
        // documents, history and comments cascade
        self.delete_by_id("DELETE FROM contracts WHERE id = $1", id, "contract")
    }

    fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, ContractError> {
        let mut query = Query::select();
        query.column(Asterisk).from("contracts");

        if let Some(needle) = search_needle(filter.search.as_deref()) {
            let pattern = like_pattern(&needle);
            query.cond_where(
                Cond::any()
                    .add(Expr::cust("LOWER(code)").like(pattern.clone()))
                    .add(Expr::cust("LOWER(vendor_name)").like(pattern.clone()))
                    .add(Expr::cust("LOWER(title)").like(pattern)),
            );
        }
        if let Some(status) = filter.status {
            query.and_where(Expr::col("status").eq(status.as_str()));
        }
        if let Some(department_id) = filter.department_id {
            query.and_where(Expr::col("department_id").eq(department_id));
        }

        let order = if filter.descending { Order::Desc } else { Order::Asc };
        query
            .order_by(filter.order_by.column(), order.clone())
            .order_by("id", order);
        if let Some(limit) = filter.limit {
            query.limit(limit);
        }
        if filter.offset > 0 {
            query.offset(filter.offset);
        }

        let (sql, values) = query.build(PostgresQueryBuilder);
        self.fetch_built(&sql, &values)
    }

    fn apply_transition(
        &self,
        contract_id: i64,
        to: ContractStatus,
        actor_id: i64,
        remarks: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<StatusHistory, ContractError> {
        let conn = self.pool.acquire()?;
        in_transaction(conn.client(), IsolationLevel::ReadCommitted, |tx| {
            let mut contract = lock_contract(tx, contract_id, "UPDATE")?;
            let change = lifecycle::plan_transition(&contract, to, actor_id, remarks, at)?;
            change.apply(&mut contract);

            tx.execute(
                "UPDATE contracts SET status = $2, remarks = $3, updated_by = $4, updated_at = $5 \
                 WHERE id = $1",
                &[
                    &contract_id,
                    &contract.status.as_str(),
                    &contract.remarks,
                    &actor_id,
                    &at,
                ],
            )?;

            let sql = format!(
                "INSERT INTO contract_status_history (contract_id, old_status, new_status, changed_by, remarks, changed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {HISTORY_COLUMNS}"
            );
            let row = tx.query_one(
                &sql,
                &[
                    &contract_id,
                    &change.from.as_str(),
                    &change.to.as_str(),
                    &actor_id,
                    &change.remarks,
                    &at,
                ],
            )?;
            Ok(StatusHistory::from_row(&row)?)
        })
    }

    fn list_history(&self, contract_id: i64) -> Result<Vec<StatusHistory>, ContractError> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM contract_status_history WHERE contract_id = $1 \
             ORDER BY changed_at DESC, id DESC"
        );
        self.fetch_all(&sql, &[&contract_id])
    }

    fn insert_comment(
        &self,
        contract_id: i64,
        user_id: i64,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<Comment, ContractError> {
        let conn = self.pool.acquire()?;
        in_transaction(conn.client(), IsolationLevel::ReadCommitted, |tx| {
            // anchors may not change under us until the comment is in
            let contract = lock_contract(tx, contract_id, "SHARE")?;
            if !contract.is_anchor(user_id) {
                return Err(ContractError::forbidden(
                    "You are not allowed to comment on this contract.",
                ));
            }
            let sql = format!(
                "INSERT INTO contract_comments (contract_id, user_id, body, created_at) \
                 VALUES ($1, $2, $3, $4) RETURNING {COMMENT_COLUMNS}"
            );
            let row = tx.query_one(&sql, &[&contract_id, &user_id, &body, &at])?;
            Ok(Comment::from_row(&row)?)
        })
    }

    fn list_comments(
        &self,
        contract_id: Option<i64>,
        viewer_id: i64,
    ) -> Result<Vec<Comment>, ContractError> {
        self.fetch_all(
            "SELECT cc.id, cc.contract_id, cc.user_id, cc.body, cc.created_at \
             FROM contract_comments cc JOIN contracts c ON c.id = cc.contract_id \
             WHERE ($1::BIGINT IS NULL OR cc.contract_id = $1) \
               AND $2 IN (c.legal_officer_id, c.department_head_id, c.signatory_id, c.created_by) \
             ORDER BY cc.created_at ASC, cc.id ASC",
            &[&contract_id, &viewer_id],
        )
    }

    fn insert_document(&self, doc: &DocumentInsert) -> Result<ContractDocument, ContractError> {
        let sql = format!(
            "INSERT INTO contract_documents (contract_id, file_name, storage_path, size_bytes, sha256, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOCUMENT_COLUMNS}"
        );
        self.fetch_one(
            &sql,
            &[
                &doc.contract_id,
                &doc.file_name,
                &doc.storage_path,
                &doc.size_bytes,
                &doc.sha256,
                &doc.uploaded_at,
            ],
        )
    }

    fn get_document(&self, id: i64) -> Result<Option<ContractDocument>, ContractError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM contract_documents WHERE id = $1");
        self.fetch_opt(&sql, &[&id])
    }

    fn list_documents(&self, contract_id: i64) -> Result<Vec<ContractDocument>, ContractError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM contract_documents WHERE contract_id = $1 \
             ORDER BY uploaded_at DESC, id DESC"
        );
        self.fetch_all(&sql, &[&contract_id])
    }

    fn delete_document(&self, id: i64) -> Result<(), ContractError> {
        self.delete_by_id("DELETE FROM contract_documents WHERE id = $1", id, "document")
    }
}
