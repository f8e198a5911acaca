//! Migration: contract tracking schema
//! Version: 20261019000001
//!
//! Referential rules live in the `ON DELETE` clauses: contract children
//! cascade, user references go null, departments and contract types that
//! are still referenced cannot be deleted.

use crate::migration::Migration;

pub struct CreateContractSchema;

const UP: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS departments (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contract_types (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email VARCHAR(254) NOT NULL UNIQUE,
        full_name VARCHAR(255) NOT NULL,
        role VARCHAR(30) NOT NULL
            CHECK (role IN ('admin', 'procurement_officer', 'legal_reviewer', 'department_head', 'signatory')),
        department_id BIGINT REFERENCES departments(id) ON DELETE SET NULL,
        is_staff BOOLEAN NOT NULL DEFAULT false,
        is_active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_active TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contracts (
        id BIGSERIAL PRIMARY KEY,
        code VARCHAR(20) NOT NULL UNIQUE,
        title VARCHAR(255) NOT NULL,
        vendor_name VARCHAR(255) NOT NULL,
        contract_type_id BIGINT NOT NULL REFERENCES contract_types(id) ON DELETE RESTRICT,
        department_id BIGINT NOT NULL REFERENCES departments(id) ON DELETE RESTRICT,
        start_date DATE NOT NULL,
        end_date DATE NOT NULL,
        payment_terms VARCHAR(20) NOT NULL
            CHECK (payment_terms IN ('one_time_payment', 'installment', 'milestone_based', 'others')),
        estimated_value NUMERIC(15, 2),
        renewal_terms VARCHAR(20) NOT NULL DEFAULT 'not_renewable'
            CHECK (renewal_terms IN ('renewable_fixed', 'not_renewable', 'on_request')),
        scope_of_work TEXT,
        instructions_for_reviewers TEXT,
        status VARCHAR(20) NOT NULL DEFAULT 'draft'
            CHECK (status IN ('draft', 'submitted', 'approved', 'rejected', 'returned')),
        remarks TEXT,
        legal_officer_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
        department_head_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
        signatory_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
        created_by BIGINT REFERENCES users(id) ON DELETE SET NULL,
        updated_by BIGINT REFERENCES users(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT contracts_end_after_start CHECK (end_date >= start_date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contracts_created_at ON contracts(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_contracts_status ON contracts(status)",
    "CREATE INDEX IF NOT EXISTS idx_contracts_department ON contracts(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_contracts_end_date ON contracts(end_date)",
    r#"
    CREATE TABLE IF NOT EXISTS contract_code_counters (
        year INTEGER PRIMARY KEY,
        last_value INTEGER NOT NULL CHECK (last_value > 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contract_documents (
        id BIGSERIAL PRIMARY KEY,
        contract_id BIGINT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
        file_name VARCHAR(255) NOT NULL,
        storage_path VARCHAR(512) NOT NULL,
        size_bytes BIGINT NOT NULL,
        sha256 VARCHAR(64) NOT NULL,
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contract_documents_contract ON contract_documents(contract_id)",
    r#"
    CREATE TABLE IF NOT EXISTS contract_status_history (
        id BIGSERIAL PRIMARY KEY,
        contract_id BIGINT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
        old_status VARCHAR(20) NOT NULL,
        new_status VARCHAR(20) NOT NULL,
        changed_by BIGINT REFERENCES users(id) ON DELETE SET NULL,
        remarks TEXT,
        changed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contract_status_history_contract ON contract_status_history(contract_id, changed_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS contract_comments (
        id BIGSERIAL PRIMARY KEY,
        contract_id BIGINT NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        body TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_contract_comments_contract ON contract_comments(contract_id, created_at)",
];

const DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS contract_comments",
    "DROP TABLE IF EXISTS contract_status_history",
    "DROP TABLE IF EXISTS contract_documents",
    "DROP TABLE IF EXISTS contract_code_counters",
    "DROP TABLE IF EXISTS contracts",
    "DROP TABLE IF EXISTS users",
    "DROP TABLE IF EXISTS contract_types",
    "DROP TABLE IF EXISTS departments",
];

impl Migration for CreateContractSchema {
    fn name(&self) -> &str {
        "create_contract_schema"
    }

    fn version(&self) -> i64 {
        20261019000001
    }

    fn statements(&self) -> &'static [&'static str] {
        UP
    }

    fn down_statements(&self) -> &'static [&'static str] {
        DOWN
    }
}
