//! RBAC data models: Principal, RoleDefinition, Department.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed role identifier.
///
/// Roles are opaque strings (`"sales_officer"`, `"hr_manager"`); the Role
/// Registry is the only authority on what a role may do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Department
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of departments a principal may be granted access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Sales,
    Manufacturing,
    Qc,
    Warehouse,
    Finance,
    Hr,
    Fieldops,
    Rnd,
    Executive,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Manufacturing => "manufacturing",
            Self::Qc => "qc",
            Self::Warehouse => "warehouse",
            Self::Finance => "finance",
            Self::Hr => "hr",
            Self::Fieldops => "fieldops",
            Self::Rnd => "rnd",
            Self::Executive => "executive",
        }
    }

    /// All departments, in registry order.
    pub fn all() -> [Department; 9] {
        [
            Self::Sales,
            Self::Manufacturing,
            Self::Qc,
            Self::Warehouse,
            Self::Finance,
            Self::Hr,
            Self::Fieldops,
            Self::Rnd,
            Self::Executive,
        ]
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sales" => Ok(Self::Sales),
            "manufacturing" => Ok(Self::Manufacturing),
            "qc" => Ok(Self::Qc),
            "warehouse" => Ok(Self::Warehouse),
            "finance" => Ok(Self::Finance),
            "hr" => Ok(Self::Hr),
            "fieldops" => Ok(Self::Fieldops),
            "rnd" => Ok(Self::Rnd),
            "executive" => Ok(Self::Executive),
            other => Err(format!("unknown department: {}", other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Definition
// ═══════════════════════════════════════════════════════════════════════════════

/// A role's permission set and accessible departments.
///
/// Immutable at runtime; defined once per deployment in the Role Registry.
/// Permission keys are opaque strings matched exactly, or granted wholesale
/// by the wildcard `"*"`. Keys that look hierarchical (`"sales_view"`) are
/// never prefix-matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// The role this definition applies to.
    pub role: RoleId,

    /// Set of permission keys granted by this role (may contain `"*"`).
    pub permissions: HashSet<String>,

    /// Departments the role may access.
    pub departments: HashSet<Department>,
}

impl RoleDefinition {
    /// Create a new role definition.
    pub fn new(
        role: impl Into<RoleId>,
        permissions: impl IntoIterator<Item = impl Into<String>>,
        departments: impl IntoIterator<Item = Department>,
    ) -> Self {
        Self {
            role: role.into(),
            permissions: permissions.into_iter().map(|p| p.into()).collect(),
            departments: departments.into_iter().collect(),
        }
    }

    /// Check if this role grants a permission key.
    ///
    /// Matching is flat: the wildcard `"*"` grants everything, otherwise the
    /// key must be an exact member of the set.
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains("*") || self.permissions.contains(permission)
    }

    /// Check if this role may access a department.
    pub fn covers(&self, department: Department) -> bool {
        self.departments.contains(&department)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated user together with their role, department, and region.
///
/// Created on successful authentication, held by the `Session` for its
/// lifetime, destroyed on logout. Exactly one role at a time; a principal
/// whose role is unset (or absent from the registry) is denied everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Identity-provider subject id.
    pub id: String,

    /// Sign-in email.
    pub email: String,

    /// Display name from the profile record, when one was provisioned.
    pub display_name: Option<String>,

    /// The principal's single role, if provisioned.
    pub role: Option<RoleId>,

    /// Home department, if provisioned.
    pub department: Option<Department>,

    /// Optional region assignment.
    pub region: Option<String>,

    /// Optional avatar URL from the profile record.
    pub avatar_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Credentials
// ═══════════════════════════════════════════════════════════════════════════════

/// Sign-in credentials. The password is never logged.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
