use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

wire_enum! {
    Role("role") {
        Admin => "admin",
        ProcurementOfficer => "procurement_officer",
        LegalReviewer => "legal_reviewer",
        DepartmentHead => "department_head",
        Signatory => "signatory",
    }
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::ProcurementOfficer => "Procurement Officer",
            Role::LegalReviewer => "Legal Reviewer",
            Role::DepartmentHead => "Department Head",
            Role::Signatory => "Signatory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

/// A user of the system. Identity and credentials are managed elsewhere;
/// the core only needs the role, department and activity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub department_id: Option<i64>,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    /// Staff flag or the `admin` role.
    pub fn is_admin(&self) -> bool {
        self.is_staff || self.role == Role::Admin
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.full_name, self.role)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<i64>,
    #[serde(default)]
    pub is_staff: bool,
}

/// Partial update; `None` leaves a field unchanged. `department_id:
/// Some(None)` (a JSON `null`) clears the department.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub department_id: Option<Option<i64>>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.full_name {
            user.full_name = name.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(department_id) = self.department_id {
            user.department_id = department_id;
        }
        if let Some(is_staff) = self.is_staff {
            user.is_staff = is_staff;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}
