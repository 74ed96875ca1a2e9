//! # Role Policy
//!
//! Pure authorization rules for inventory movements.
//!
//! ## Role Capabilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Inventory Capabilities                             │
//! │                                                                         │
//! │   Role        Read   Create/Update/Delete   Scope matched on            │
//! │   ─────────   ────   ────────────────────   ─────────────────           │
//! │   Company      ✅            ✅              company_id                 │
//! │   Branch       ✅            ✅              branch_id                  │
//! │   Store        ✅            ❌              store_id                   │
//! │   (other)      ❌            ❌              -                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The recognized role names are deployment configuration. They are loaded once
//! at startup into a [`RolePolicy`] and passed to whoever needs them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::{NewMovement, TenantIds};

// =============================================================================
// Role Scope
// =============================================================================

/// The tenant level a recognized role operates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    Company,
    Branch,
    Store,
}

impl RoleScope {
    /// Store users may read the ledger but never change it.
    pub const fn can_mutate_inventory(self) -> bool {
        matches!(self, RoleScope::Company | RoleScope::Branch)
    }

    pub const fn can_read_inventory(self) -> bool {
        true
    }

    /// Whether a caller at this scope may touch a record.
    ///
    /// A record without the id the scope is matched on is never in scope.
    pub fn permits(self, record: &TenantIds, caller: &TenantIds) -> bool {
        match self {
            RoleScope::Company => record.company_id == caller.company_id,
            RoleScope::Branch => same_id(record.branch_id, caller.branch_id),
            RoleScope::Store => same_id(record.store_id, caller.store_id),
        }
    }

    /// Short label used in log fields and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            RoleScope::Company => "company",
            RoleScope::Branch => "branch",
            RoleScope::Store => "store",
        }
    }
}

fn same_id(record: Option<Uuid>, caller: Option<Uuid>) -> bool {
    matches!((record, caller), (Some(r), Some(c)) if r == c)
}

// =============================================================================
// Role Policy
// =============================================================================

/// The three role names this deployment recognizes.
///
/// ## Usage
/// ```rust
/// use stockline_core::{RolePolicy, RoleScope};
///
/// let policy = RolePolicy::new("company_admin", "branch_manager", "store_clerk");
/// assert_eq!(policy.classify("branch_manager"), Some(RoleScope::Branch));
/// assert!(!policy.can_mutate_inventory("store_clerk"));
/// assert!(!policy.can_read_inventory("guest"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub company_role: String,
    pub branch_role: String,
    pub store_role: String,
}

impl RolePolicy {
    pub fn new(
        company_role: impl Into<String>,
        branch_role: impl Into<String>,
        store_role: impl Into<String>,
    ) -> Self {
        RolePolicy {
            company_role: company_role.into(),
            branch_role: branch_role.into(),
            store_role: store_role.into(),
        }
    }

    /// Maps a role name to its scope; `None` for unrecognized roles.
    pub fn classify(&self, role_name: &str) -> Option<RoleScope> {
        if role_name == self.company_role {
            Some(RoleScope::Company)
        } else if role_name == self.branch_role {
            Some(RoleScope::Branch)
        } else if role_name == self.store_role {
            Some(RoleScope::Store)
        } else {
            None
        }
    }

    pub fn can_mutate_inventory(&self, role_name: &str) -> bool {
        self.classify(role_name)
            .is_some_and(RoleScope::can_mutate_inventory)
    }

    pub fn can_read_inventory(&self, role_name: &str) -> bool {
        self.classify(role_name)
            .is_some_and(RoleScope::can_read_inventory)
    }

    /// Tenant boundary check. Unrecognized roles never pass.
    pub fn scope_check(&self, role_name: &str, record: &TenantIds, caller: &TenantIds) -> bool {
        self.classify(role_name)
            .is_some_and(|scope| scope.permits(record, caller))
    }
}

// =============================================================================
// Movement Scope Resolution
// =============================================================================

/// Decides the branch and store a new movement is booked against.
///
/// ## Rules
/// - Company callers must name a branch; the store may stay unset.
/// - Branch callers take the branch from their token and need a store, from
///   the request or else from the token.
/// - Store callers take both from their token.
///
/// The company always comes from the caller's token.
pub fn resolve_movement_scope(
    scope: RoleScope,
    caller: &TenantIds,
    request: &NewMovement,
) -> Result<TenantIds, ValidationError> {
    let mut tenant = TenantIds::company(caller.company_id);

    match scope {
        RoleScope::Company => {
            tenant.branch_id = Some(
                request
                    .branch_id
                    .ok_or_else(|| ValidationError::required("branch_id"))?,
            );
            tenant.store_id = request.store_id;
        }
        RoleScope::Branch => {
            tenant.branch_id = Some(
                caller
                    .branch_id
                    .ok_or_else(|| ValidationError::required("token branch_id"))?,
            );
            tenant.store_id = Some(
                request
                    .store_id
                    .or(caller.store_id)
                    .ok_or_else(|| ValidationError::required("store_id"))?,
            );
        }
        RoleScope::Store => {
            tenant.branch_id = Some(
                caller
                    .branch_id
                    .ok_or_else(|| ValidationError::required("token branch_id"))?,
            );
            tenant.store_id = Some(
                caller
                    .store_id
                    .ok_or_else(|| ValidationError::required("token store_id"))?,
            );
        }
    }

    Ok(tenant)
}

// =============================================================================
// Unit Tests
// =============================================================================
