//! The static Role Registry.
//!
//! The registry is the single source of truth for enforcement. A role/
//! permission-matrix editor may exist at the UI layer as an ordinary CRUD
//! page over a `roles` collection, but nothing here reads from it.

use std::collections::HashMap;

use super::models::{Department, RoleDefinition, RoleId};

/// Static table mapping each role to its permission set and departments.
///
/// Immutable at runtime; built once per deployment. Lookups for roles not in
/// the table deny every permission and every department.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: HashMap<RoleId, RoleDefinition>,
}

impl RoleRegistry {
    /// Build a registry from explicit definitions.
    pub fn new(definitions: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let roles = definitions
            .into_iter()
            .map(|def| (def.role.clone(), def))
            .collect();
        Self { roles }
    }

    /// The deployment's built-in roles.
    pub fn builtin() -> Self {
        use Department::*;

        let every_department = Department::all();

        Self::new([
            RoleDefinition::new("super_admin", ["*"], every_department),
            RoleDefinition::new(
                "executive",
                ["view_all", "view_reports", "approve_high"],
                every_department,
            ),
            RoleDefinition::new(
                "sales_officer",
                ["sales_view", "sales_create", "sales_edit"],
                [Sales],
            ),
            RoleDefinition::new("field_officer", ["field_view", "field_create"], [Fieldops]),
            RoleDefinition::new("mdo", ["marketing_manage"], [Sales]),
            RoleDefinition::new(
                "regional_manager",
                ["sales_view", "sales_approve"],
                [Sales, Fieldops],
            ),
            RoleDefinition::new(
                "zonal_manager",
                ["sales_view", "sales_approve"],
                [Sales, Fieldops],
            ),
            RoleDefinition::new("warehouse_manager", ["warehouse_manage"], [Warehouse]),
            RoleDefinition::new(
                "manufacturing_manager",
                ["manufacturing_manage"],
                [Manufacturing],
            ),
            RoleDefinition::new("qc_analyst", ["qc_manage"], [Qc]),
            RoleDefinition::new("finance_officer", ["finance_manage"], [Finance]),
            RoleDefinition::new("hr_manager", ["hr_manage"], [Hr]),
            RoleDefinition::new("rnd_manager", ["rnd_manage"], [Rnd]),
        ])
    }

    /// Look up a role definition.
    pub fn get(&self, role: &RoleId) -> Option<&RoleDefinition> {
        self.roles.get(role)
    }

    /// Whether the registry knows this role.
    pub fn contains(&self, role: &RoleId) -> bool {
        self.roles.contains_key(role)
    }

    /// Number of registered roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Iterate over all definitions.
    pub fn iter(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.values()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
