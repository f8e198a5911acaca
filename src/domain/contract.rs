use crate::code::ContractCode;
use crate::domain::{ContractStatus, PaymentTerms, RenewalTerms};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default window for [`Contract::is_expiring_soon_on`].
pub const EXPIRING_SOON_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub code: ContractCode,
    pub title: String,
    pub vendor_name: String,
    pub contract_type_id: i64,
    pub department_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub estimated_value: Option<Decimal>,
    pub renewal_terms: RenewalTerms,
    pub scope_of_work: Option<String>,
    pub instructions_for_reviewers: Option<String>,
    pub status: ContractStatus,
    pub remarks: Option<String>,
    pub legal_officer_id: Option<i64>,
    pub department_head_id: Option<i64>,
    pub signatory_id: Option<i64>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Length of the contract term in days.
    pub fn total_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Approved and `today` within `[start_date, end_date]`.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.status == ContractStatus::Approved
            && self.start_date <= today
            && today <= self.end_date
    }

    /// Days until `end_date`, floored at zero.
    pub fn days_remaining_on(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days().max(0)
    }

    /// `0 < days_remaining <= window`.
    pub fn is_expiring_within(&self, today: NaiveDate, window_days: i64) -> bool {
        let remaining = self.days_remaining_on(today);
        remaining > 0 && remaining <= window_days
    }

    pub fn is_expiring_soon_on(&self, today: NaiveDate) -> bool {
        self.is_expiring_within(today, EXPIRING_SOON_DAYS)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_on(Utc::now().date_naive())
    }

    pub fn days_remaining(&self) -> i64 {
        self.days_remaining_on(Utc::now().date_naive())
    }

    pub fn is_expiring_soon(&self) -> bool {
        self.is_expiring_soon_on(Utc::now().date_naive())
    }

    /// Users anchored to this contract: legal officer, department head,
    /// signatory and creator. Unset slots are skipped.
    pub fn anchors(&self) -> impl Iterator<Item = i64> + '_ {
        [
            self.legal_officer_id,
            self.department_head_id,
            self.signatory_id,
            self.created_by,
        ]
        .into_iter()
        .flatten()
    }

    pub fn is_anchor(&self, user_id: i64) -> bool {
        self.anchors().any(|id| id == user_id)
    }

    /// Clear every reference to `user_id` (user deletion).
    pub(crate) fn detach_user(&mut self, user_id: i64) {
        for slot in [
            &mut self.legal_officer_id,
            &mut self.department_head_id,
            &mut self.signatory_id,
            &mut self.created_by,
            &mut self.updated_by,
        ] {
            if *slot == Some(user_id) {
                *slot = None;
            }
        }
    }
}

impl std::fmt::Display for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.title)
    }
}

/// Fields supplied when creating a contract. Code, status and audit fields
/// are assigned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewContract {
    pub title: String,
    pub vendor_name: String,
    pub contract_type_id: i64,
    /// Defaults to the creator's department.
    #[serde(default)]
    pub department_id: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    #[serde(default)]
    pub estimated_value: Option<Decimal>,
    #[serde(default)]
    pub renewal_terms: RenewalTerms,
    #[serde(default)]
    pub scope_of_work: Option<String>,
    #[serde(default)]
    pub instructions_for_reviewers: Option<String>,
    #[serde(default)]
    pub legal_officer_id: Option<i64>,
    #[serde(default)]
    pub department_head_id: Option<i64>,
    #[serde(default)]
    pub signatory_id: Option<i64>,
}

/// Partial field edit. `None` (or a missing key) leaves a field as is; for
/// nullable fields `Some(None)` (a JSON `null`) clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractPatch {
    pub title: Option<String>,
    pub vendor_name: Option<String>,
    pub contract_type_id: Option<i64>,
    pub department_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub payment_terms: Option<PaymentTerms>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub estimated_value: Option<Option<Decimal>>,
    pub renewal_terms: Option<RenewalTerms>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub scope_of_work: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub instructions_for_reviewers: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub legal_officer_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub department_head_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub signatory_id: Option<Option<i64>>,
}

impl ContractPatch {
    pub fn apply(&self, contract: &mut Contract) {
        if let Some(v) = &self.title {
            contract.title = v.clone();
        }
        if let Some(v) = &self.vendor_name {
            contract.vendor_name = v.clone();
        }
        if let Some(v) = self.contract_type_id {
            contract.contract_type_id = v;
        }
        if let Some(v) = self.department_id {
            contract.department_id = v;
        }
        if let Some(v) = self.start_date {
            contract.start_date = v;
        }
        if let Some(v) = self.end_date {
            contract.end_date = v;
        }
        if let Some(v) = self.payment_terms {
            contract.payment_terms = v;
        }
        if let Some(v) = self.estimated_value {
            contract.estimated_value = v;
        }
        if let Some(v) = self.renewal_terms {
            contract.renewal_terms = v;
        }
        if let Some(v) = &self.scope_of_work {
            contract.scope_of_work = v.clone();
        }
        if let Some(v) = &self.instructions_for_reviewers {
            contract.instructions_for_reviewers = v.clone();
        }
        if let Some(v) = self.legal_officer_id {
            contract.legal_officer_id = v;
        }
        if let Some(v) = self.department_head_id {
            contract.department_head_id = v;
        }
        if let Some(v) = self.signatory_id {
            contract.signatory_id = v;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_contract(start: NaiveDate, end: NaiveDate, status: ContractStatus) -> Contract {
        let now = Utc::now();
        Contract {
            id: 1,
            code: ContractCode::new(2026, 1),
            title: "Office cleaning".to_string(),
            vendor_name: "Sparkle Ltd".to_string(),
            contract_type_id: 1,
            department_id: 1,
            start_date: start,
            end_date: end,
            payment_terms: PaymentTerms::Installment,
            estimated_value: None,
            renewal_terms: RenewalTerms::NotRenewable,
            scope_of_work: None,
            instructions_for_reviewers: None,
            status,
            remarks: None,
            legal_officer_id: Some(10),
            department_head_id: None,
            signatory_id: Some(30),
            created_by: Some(40),
            updated_by: Some(40),
            created_at: now,
            updated_at: now,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_days_remaining() {
        let today = day(2026, 10, 19);
        let c = sample_contract(day(2026, 1, 1), today + Duration::days(10), ContractStatus::Approved);
        assert_eq!(c.days_remaining_on(today), 10);

        let expired = sample_contract(day(2026, 1, 1), today - Duration::days(1), ContractStatus::Approved);
        assert_eq!(expired.days_remaining_on(today), 0);
    }

    #[test]
    fn test_is_active_requires_approved_and_in_window() {
        let today = day(2026, 10, 19);
        let start = today - Duration::days(5);
        let end = today + Duration::days(5);
        assert!(sample_contract(start, end, ContractStatus::Approved).is_active_on(today));
        assert!(!sample_contract(start, end, ContractStatus::Submitted).is_active_on(today));
        assert!(sample_contract(today, today, ContractStatus::Approved).is_active_on(today));
        assert!(!sample_contract(today + Duration::days(1), end, ContractStatus::Approved)
            .is_active_on(today));
    }

    #[test]
    fn test_is_expiring_soon_bounds() {
        let today = day(2026, 10, 19);
        let start = day(2026, 1, 1);
        let at = |n: i64| sample_contract(start, today + Duration::days(n), ContractStatus::Approved);
        assert!(!at(0).is_expiring_soon_on(today));
        assert!(at(1).is_expiring_soon_on(today));
        assert!(at(30).is_expiring_soon_on(today));
        assert!(!at(31).is_expiring_soon_on(today));
        assert!(at(45).is_expiring_within(today, 60));
    }

    #[test]
    fn test_total_days() {
        let c = sample_contract(day(2026, 1, 1), day(2026, 12, 31), ContractStatus::Draft);
        assert_eq!(c.total_days(), 364);
    }

    #[test]
    fn test_anchors_skip_unset_slots() {
        let c = sample_contract(day(2026, 1, 1), day(2026, 2, 1), ContractStatus::Draft);
        let anchors: Vec<i64> = c.anchors().collect();
        assert_eq!(anchors, vec![10, 30, 40]);
        assert!(c.is_anchor(30));
        assert!(!c.is_anchor(20));
    }

    #[test]
    fn test_patch_clears_nullable_fields() {
        let mut c = sample_contract(day(2026, 1, 1), day(2026, 2, 1), ContractStatus::Draft);
        let patch = ContractPatch {
            title: Some("Renamed".to_string()),
            legal_officer_id: Some(None),
            ..ContractPatch::default()
        };
        patch.apply(&mut c);
        assert_eq!(c.title, "Renamed");
        assert_eq!(c.legal_officer_id, None);
        assert_eq!(c.signatory_id, Some(30));
    }

    #[test]
    fn test_patch_null_differs_from_missing() {
        let patch: ContractPatch = serde_json::from_str(
            r#"{"legal_officer_id": null, "scope_of_work": "Night shifts", "estimated_value": null}"#,
        )
        .expect("patch json");
        assert_eq!(patch.legal_officer_id, Some(None));
        assert_eq!(patch.estimated_value, Some(None));
        assert_eq!(patch.scope_of_work, Some(Some("Night shifts".to_string())));
        assert_eq!(patch.signatory_id, None);
        assert_eq!(patch.department_head_id, None);
        assert_eq!(patch.title, None);

        let mut c = sample_contract(day(2026, 1, 1), day(2026, 2, 1), ContractStatus::Draft);
        c.estimated_value = Some(Decimal::new(50_000, 2));
        patch.apply(&mut c);
        assert_eq!(c.legal_officer_id, None);
        assert_eq!(c.estimated_value, None);
        assert_eq!(c.scope_of_work.as_deref(), Some("Night shifts"));
        assert_eq!(c.signatory_id, Some(30));

        let empty: ContractPatch = serde_json::from_str("{}").expect("empty patch");
        assert_eq!(empty.legal_officer_id, None);
        assert_eq!(empty.estimated_value, None);
    }
}
