//! PostgresStore against a real database.
//!
//! Each test starts its own container, applies the built-in migrations and
//! seeds one department, one contract type and a user per role.

mod common;

use chrono::Utc;
use common::{executor, migrated_store, seed, with_database};
use contractguard::store::DocumentInsert;
use contractguard::{
    ContractCode, ContractError, ContractFilter, ContractOrder, ContractPatch, ContractService,
    ContractStatus, ContractStore, MemoryDocumentStorage, SqlExecutor, Upload, UserFilter,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_codes_unique_under_concurrent_inserts() {
    with_database(|url| {
        let store = Arc::new(migrated_store(url, 4));
        let seed = Arc::new(seed(&store));

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let store = Arc::clone(&store);
                let seed = Arc::clone(&seed);
                may::go!(move || seed.insert(&store, &format!("Parallel {i}"), 2026))
            })
            .collect();

        let mut sequences = HashSet::new();
        for handle in handles {
            let contract = handle.join().expect("coroutine finished");
            assert_eq!(contract.code.year(), 2026);
            assert!(ContractCode::parse(&contract.code.to_string()).is_ok());
            assert!(sequences.insert(contract.code.sequence()));
        }
        assert_eq!(sequences, (1..=24).collect::<HashSet<u32>>());
        assert_eq!(store.pool().idle(), store.pool().size());

        // another year has its own counter
        let next_year = seed.insert(&store, "Next year", 2027);
        assert_eq!(next_year.code, ContractCode::new(2027, 1));

        // deleting does not free a sequence number
        store.delete_contract(next_year.id).expect("delete");
        assert_eq!(seed.insert(&store, "Again", 2027).code.sequence(), 2);
    });
}

#[test]
fn test_transitions_write_history_atomically() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let contract = seed.insert(&store, "Cleaning", 2026);

        let submitted = store
            .apply_transition(contract.id, ContractStatus::Submitted, seed.procurement, Some("please review"), Utc::now())
            .expect("draft -> submitted");
        assert_eq!(submitted.old_status, ContractStatus::Draft);
        assert_eq!(submitted.new_status, ContractStatus::Submitted);
        assert_eq!(submitted.changed_by, Some(seed.procurement));

        store
            .apply_transition(contract.id, ContractStatus::Approved, seed.admin, None, Utc::now())
            .expect("submitted -> approved");

        let err = store
            .apply_transition(contract.id, ContractStatus::Draft, seed.admin, Some("reopen"), Utc::now())
            .expect_err("approved is terminal");
        assert!(matches!(
            err,
            ContractError::InvalidTransition {
                from: ContractStatus::Approved,
                to: ContractStatus::Draft
            }
        ));

        let stored = store.get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.status, ContractStatus::Approved);
        assert_eq!(stored.remarks.as_deref(), Some("please review"));
        assert_eq!(stored.updated_by, Some(seed.admin));

        let history = store.list_history(contract.id).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status, ContractStatus::Approved);
        assert_eq!(history[1].old_status, ContractStatus::Draft);

        assert!(matches!(
            store.apply_transition(9_999, ContractStatus::Submitted, seed.admin, None, Utc::now()),
            Err(ContractError::NotFound { .. })
        ));
    });
}

#[test]
fn test_failed_history_insert_rolls_back_status() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let contract = seed.insert(&store, "Catering", 2026);

        let admin = executor(url);
        for ddl in [
            "CREATE FUNCTION reject_history() RETURNS trigger AS $$ \
             BEGIN RAISE EXCEPTION 'history is read-only'; END; $$ LANGUAGE plpgsql",
            "CREATE TRIGGER reject_history BEFORE INSERT ON contract_status_history \
             FOR EACH ROW EXECUTE FUNCTION reject_history()",
        ] {
            admin.execute(ddl, &[]).expect("install trigger");
        }

        let err = store
            .apply_transition(contract.id, ContractStatus::Submitted, seed.procurement, Some("go"), Utc::now())
            .expect_err("history insert fails");
        assert!(matches!(err, ContractError::Database(_)));

        let stored = store.get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.status, ContractStatus::Draft);
        assert_eq!(stored.remarks, None);
        assert_eq!(stored.updated_at, contract.updated_at);
        assert!(store.list_history(contract.id).expect("history").is_empty());

        admin
            .execute("DROP TRIGGER reject_history ON contract_status_history", &[])
            .expect("drop trigger");
        store
            .apply_transition(contract.id, ContractStatus::Submitted, seed.procurement, Some("go"), Utc::now())
            .expect("draft -> submitted once history accepts rows");
        assert_eq!(store.list_history(contract.id).expect("history").len(), 1);
    });
}

#[test]
fn test_comment_anchor_checked_at_insert() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let contract = seed.insert(&store, "Security", 2026);
        let other = seed.insert(&store, "Catering", 2026);

        let err = store
            .insert_comment(contract.id, seed.outsider, "hello", Utc::now())
            .expect_err("outsider");
        assert!(matches!(err, ContractError::Forbidden(_)));

        store
            .insert_comment(contract.id, seed.signatory, "Ready to sign.", Utc::now())
            .expect("signatory");
        store
            .insert_comment(other.id, seed.legal, "Check clause 9.", Utc::now())
            .expect("legal officer");

        assert!(store.list_comments(None, seed.outsider).expect("list").is_empty());
        assert_eq!(store.list_comments(None, seed.head).expect("list").len(), 2);
        let narrowed = store.list_comments(Some(contract.id), seed.head).expect("list");
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].body, "Ready to sign.");

        // once removed as signatory, the user can no longer comment
        let patch = ContractPatch {
            signatory_id: Some(None),
            ..ContractPatch::default()
        };
        store
            .update_contract(contract.id, &patch, seed.procurement, Utc::now())
            .expect("clear signatory");
        assert!(matches!(
            store.insert_comment(contract.id, seed.signatory, "still here", Utc::now()),
            Err(ContractError::Forbidden(_))
        ));
        assert!(store.list_comments(Some(contract.id), seed.signatory).expect("list").is_empty());
    });
}

#[test]
fn test_update_rejects_inverted_dates() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let contract = seed.insert(&store, "Printing", 2026);

        let patch = ContractPatch {
            title: Some("Printing and binding".into()),
            end_date: Some(contract.start_date.pred_opt().expect("previous day")),
            ..ContractPatch::default()
        };
        assert!(matches!(
            store.update_contract(contract.id, &patch, seed.procurement, Utc::now()),
            Err(ContractError::Validation(_))
        ));
        let stored = store.get_contract(contract.id).expect("get").expect("exists");
        assert_eq!(stored.title, "Printing");

        let patch = ContractPatch {
            estimated_value: Some(Some(Decimal::new(9_950_050, 2))),
            ..ContractPatch::default()
        };
        let updated = store
            .update_contract(contract.id, &patch, seed.procurement, Utc::now())
            .expect("update value");
        assert_eq!(updated.estimated_value, Some(Decimal::new(9_950_050, 2)));
        assert_eq!(updated.code, contract.code);
    });
}

#[test]
fn test_deletes_follow_referential_rules() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let contract = seed.insert(&store, "Transport", 2026);

        store
            .insert_document(&DocumentInsert {
                contract_id: contract.id,
                file_name: "route.pdf".into(),
                storage_path: format!("contracts/{}/route.pdf", contract.id),
                size_bytes: 3,
                sha256: "0".repeat(64),
                uploaded_at: Utc::now(),
            })
            .expect("document");
        store
            .apply_transition(contract.id, ContractStatus::Submitted, seed.procurement, None, Utc::now())
            .expect("submit");
        store
            .insert_comment(contract.id, seed.legal, "ok", Utc::now())
            .expect("comment");

        assert!(matches!(
            store.delete_department(seed.department),
            Err(ContractError::Validation(_))
        ));
        assert!(matches!(
            store.delete_contract_type(seed.contract_type),
            Err(ContractError::Validation(_))
        ));

        // user deletion keeps the contract and clears the reference
        store.delete_user(seed.legal).expect("delete legal officer");
        let stored = store.get_contract(contract.id).expect("get").expect("kept");
        assert_eq!(stored.legal_officer_id, None);
        assert!(store.list_comments(Some(contract.id), seed.head).expect("list").is_empty());

        store.delete_user(seed.procurement).expect("delete creator");
        let history = store.list_history(contract.id).expect("history");
        assert_eq!(history[0].changed_by, None);

        store.delete_contract(contract.id).expect("delete contract");
        assert!(store.list_documents(contract.id).expect("documents").is_empty());
        assert!(store.list_history(contract.id).expect("history").is_empty());
        assert!(matches!(
            store.delete_contract(contract.id),
            Err(ContractError::NotFound { .. })
        ));

        store.delete_department(seed.department).expect("now unreferenced");
        let head = store.get_user(seed.head).expect("get").expect("exists");
        assert_eq!(head.department_id, None);
    });
}

#[test]
fn test_list_filters_and_ordering() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let first = seed.insert(&store, "Office cleaning", 2026);
        let second = seed.insert(&store, "Legal_advice 100%", 2026);
        let third = seed.insert(&store, "IT support", 2026);
        store
            .apply_transition(third.id, ContractStatus::Submitted, seed.procurement, None, Utc::now())
            .expect("submit");

        let all = store.list_contracts(&ContractFilter::default()).expect("list");
        let ids: Vec<i64> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let search = ContractFilter {
            search: Some("  CLEANING ".into()),
            ..ContractFilter::default()
        };
        assert_eq!(store.list_contracts(&search).expect("search")[0].id, first.id);

        let by_code = ContractFilter {
            search: Some(second.code.to_string().to_lowercase()),
            ..ContractFilter::default()
        };
        assert_eq!(store.list_contracts(&by_code).expect("search").len(), 1);

        let literal = ContractFilter {
            search: Some("100%".into()),
            ..ContractFilter::default()
        };
        let found = store.list_contracts(&literal).expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, second.id);

        let submitted = ContractFilter {
            status: Some(ContractStatus::Submitted),
            ..ContractFilter::default()
        };
        assert_eq!(store.list_contracts(&submitted).expect("status")[0].id, third.id);

        let paged = ContractFilter {
            order_by: ContractOrder::CreatedAt,
            descending: false,
            limit: Some(1),
            offset: 1,
            ..ContractFilter::default()
        };
        let page = store.list_contracts(&paged).expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);

        let filter = UserFilter {
            search: Some("EXAMPLE.ORG".into()),
            is_active: Some(true),
            ..UserFilter::default()
        };
        assert_eq!(store.list_users(&filter).expect("users").len(), 6);
    });
}

#[test]
fn test_touch_last_active_throttled() {
    with_database(|url| {
        let store = migrated_store(url, 1);
        let seed = seed(&store);
        let user = store.get_user(seed.head).expect("get").expect("exists");
        let interval = chrono::Duration::minutes(1);

        assert!(!store
            .touch_last_active(user.id, user.last_active + chrono::Duration::seconds(20), interval)
            .expect("touch"));
        assert!(store
            .touch_last_active(user.id, user.last_active + chrono::Duration::seconds(90), interval)
            .expect("touch"));
        assert!(matches!(
            store.touch_last_active(424_242, Utc::now(), interval),
            Err(ContractError::NotFound { .. })
        ));
    });
}

#[test]
fn test_service_end_to_end() {
    with_database(|url| {
        let store = migrated_store(url, 2);
        let seed = seed(&store);
        let service = ContractService::new(store, MemoryDocumentStorage::new());

        let mut fields = seed.new_contract("Waste collection");
        fields.end_date = chrono::Local::now().date_naive() + chrono::Duration::days(20);
        fields.start_date = fields.end_date - chrono::Duration::days(365);
        let contract = service
            .create_contract(seed.procurement, fields)
            .expect("create");
        assert!(contract.code.to_string().starts_with("CON-"));

        service
            .upload_documents(seed.procurement, contract.id, vec![Upload::new("bid.pdf", b"bid".to_vec())])
            .expect("upload");
        service
            .transition_status(contract.id, "submitted", seed.procurement, None)
            .expect("submit");
        service
            .transition_status(contract.id, "approved", seed.admin, Some("approved by board"))
            .expect("approve");
        service
            .add_comment(contract.id, seed.head, "Noted.")
            .expect("comment");

        let details = service.get_contract(seed.outsider, contract.id).expect("details");
        assert!(details.is_active);
        assert!(details.is_expiring_soon);
        assert_eq!(details.days_remaining, 20);
        assert_eq!(details.documents.len(), 1);
        assert_eq!(details.history.len(), 2);

        assert!(matches!(
            service.add_comment(contract.id, seed.outsider, "me too"),
            Err(ContractError::Forbidden(_))
        ));
        assert_eq!(service.list_comments(Some(contract.id), seed.legal).expect("list").len(), 1);
    });
}
