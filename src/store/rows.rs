//! Column lists and row mapping for the PostgreSQL gateway.

use crate::code::ContractCode;
use crate::domain::{
    Comment, Contract, ContractDocument, ContractType, Department, StatusHistory, User,
};
use crate::executor::DbError;
use crate::query::FromRow;
use may_postgres::types::FromSql;
use may_postgres::Row;
use std::str::FromStr;

pub(crate) const CONTRACT_COLUMNS: &str = "id, code, title, vendor_name, contract_type_id, \
     department_id, start_date, end_date, payment_terms, estimated_value, renewal_terms, \
     scope_of_work, instructions_for_reviewers, status, remarks, legal_officer_id, \
     department_head_id, signatory_id, created_by, updated_by, created_at, updated_at";

pub(crate) const USER_COLUMNS: &str =
    "id, email, full_name, role, department_id, is_staff, is_active, created_at, last_active";

pub(crate) const DOCUMENT_COLUMNS: &str =
    "id, contract_id, file_name, storage_path, size_bytes, sha256, uploaded_at";

pub(crate) const HISTORY_COLUMNS: &str =
    "id, contract_id, old_status, new_status, changed_by, remarks, changed_at";

pub(crate) const COMMENT_COLUMNS: &str = "id, contract_id, user_id, body, created_at";

fn get<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> Result<T, DbError> {
    row.try_get(column)
        .map_err(|e| DbError::Parse(format!("column {column}: {e}")))
}

/// Text column holding a wire string.
fn parse<T: FromStr>(row: &Row, column: &str) -> Result<T, DbError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|e| DbError::Parse(format!("column {column}: {e}")))
}

impl FromRow for Contract {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        let code: String = get(row, "code")?;
        Ok(Contract {
            id: get(row, "id")?,
            code: ContractCode::parse(&code)
                .map_err(|e| DbError::Parse(format!("column code: {e}")))?,
            title: get(row, "title")?,
            vendor_name: get(row, "vendor_name")?,
            contract_type_id: get(row, "contract_type_id")?,
            department_id: get(row, "department_id")?,
            start_date: get(row, "start_date")?,
            end_date: get(row, "end_date")?,
            payment_terms: parse(row, "payment_terms")?,
            estimated_value: get(row, "estimated_value")?,
            renewal_terms: parse(row, "renewal_terms")?,
            scope_of_work: get(row, "scope_of_work")?,
            instructions_for_reviewers: get(row, "instructions_for_reviewers")?,
            status: parse(row, "status")?,
            remarks: get(row, "remarks")?,
            legal_officer_id: get(row, "legal_officer_id")?,
            department_head_id: get(row, "department_head_id")?,
            signatory_id: get(row, "signatory_id")?,
            created_by: get(row, "created_by")?,
            updated_by: get(row, "updated_by")?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
        })
    }
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(User {
            id: get(row, "id")?,
            email: get(row, "email")?,
            full_name: get(row, "full_name")?,
            role: parse(row, "role")?,
            department_id: get(row, "department_id")?,
            is_staff: get(row, "is_staff")?,
            is_active: get(row, "is_active")?,
            created_at: get(row, "created_at")?,
            last_active: get(row, "last_active")?,
        })
    }
}

impl FromRow for Department {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Department {
            id: get(row, "id")?,
            name: get(row, "name")?,
        })
    }
}

impl FromRow for ContractType {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(ContractType {
            id: get(row, "id")?,
            name: get(row, "name")?,
        })
    }
}

impl FromRow for ContractDocument {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(ContractDocument {
            id: get(row, "id")?,
            contract_id: get(row, "contract_id")?,
            file_name: get(row, "file_name")?,
            storage_path: get(row, "storage_path")?,
            size_bytes: get(row, "size_bytes")?,
            sha256: get(row, "sha256")?,
            uploaded_at: get(row, "uploaded_at")?,
        })
    }
}

impl FromRow for StatusHistory {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(StatusHistory {
            id: get(row, "id")?,
            contract_id: get(row, "contract_id")?,
            old_status: parse(row, "old_status")?,
            new_status: parse(row, "new_status")?,
            changed_by: get(row, "changed_by")?,
            remarks: get(row, "remarks")?,
            changed_at: get(row, "changed_at")?,
        })
    }
}

impl FromRow for Comment {
    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Comment {
            id: get(row, "id")?,
            contract_id: get(row, "contract_id")?,
            user_id: get(row, "user_id")?,
            body: get(row, "body")?,
            created_at: get(row, "created_at")?,
        })
    }
}

pub(crate) fn map_rows<T: FromRow>(rows: &[Row]) -> Result<Vec<T>, DbError> {
    rows.iter().map(T::from_row).collect()
}
