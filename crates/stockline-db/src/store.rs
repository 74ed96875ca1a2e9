//! # Store-of-Record Traits
//!
//! Row-level access to movements and products, independent of the backing
//! database. PostgreSQL implementations live in [`crate::repository`], in-memory
//! ones in [`crate::memory`].
//!
//! The relational store has no partial-update primitive: updates always write
//! the full row.

use async_trait::async_trait;
use stockline_core::{InventoryMovement, Page, Pagination, Product, RolePolicy, TenantIds};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

// =============================================================================
// Scope Filter
// =============================================================================

/// Which tenant column a listing is filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Company(Uuid),
    Branch(Uuid),
    Store(Uuid),
}

impl ScopeFilter {
    /// Builds the filter for a caller's role name and token ids.
    ///
    /// ## Errors
    /// `UnsupportedScope` for an unrecognized role, or when the token lacks the
    /// id the role is scoped on. An unknown role never degrades to an empty
    /// listing.
    pub fn for_role(policy: &RolePolicy, role_name: &str, caller: &TenantIds) -> DbResult<Self> {
        use stockline_core::RoleScope;

        let scope = policy
            .classify(role_name)
            .ok_or_else(|| DbError::UnsupportedScope(format!("invalid role '{role_name}'")))?;

        let missing = |field: &str| DbError::UnsupportedScope(format!("token has no {field}"));

        match scope {
            RoleScope::Company => Ok(ScopeFilter::Company(caller.company_id)),
            RoleScope::Branch => caller
                .branch_id
                .map(ScopeFilter::Branch)
                .ok_or_else(|| missing("branch_id")),
            RoleScope::Store => caller
                .store_id
                .map(ScopeFilter::Store)
                .ok_or_else(|| missing("store_id")),
        }
    }

    /// Whether a record's tenant ids fall inside this filter.
    pub fn matches(&self, tenant: &TenantIds) -> bool {
        match *self {
            ScopeFilter::Company(id) => tenant.company_id == id,
            ScopeFilter::Branch(id) => tenant.branch_id == Some(id),
            ScopeFilter::Store(id) => tenant.store_id == Some(id),
        }
    }
}

// =============================================================================
// Movement Store
// =============================================================================

/// Store of record for inventory movements.
#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Inserts a new row. `UniqueViolation` if the id is taken.
    async fn insert(&self, movement: &InventoryMovement) -> DbResult<()>;

    /// Reads a row by id; `Ok(None)` when absent.
    async fn get(&self, inventory_id: Uuid) -> DbResult<Option<InventoryMovement>>;

    /// Overwrites every column of the row if its stored version equals
    /// `expected_version`.
    ///
    /// ## Returns
    /// * `Ok(InventoryMovement)` - The row as stored, with `version = expected_version + 1`
    /// * `Err(DbError::Conflict)` - The stored version moved on
    /// * `Err(DbError::NotFound)` - No such movement
    async fn update(
        &self,
        movement: &InventoryMovement,
        expected_version: i64,
    ) -> DbResult<InventoryMovement>;

    /// Deletes the row if its stored version equals `expected_version`.
    /// `Conflict` when it moved on, `NotFound` when absent.
    async fn delete(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<()>;

    /// Lists rows inside a tenant scope, newest first.
    async fn list(
        &self,
        filter: ScopeFilter,
        pagination: Pagination,
    ) -> DbResult<Page<InventoryMovement>>;
}

// =============================================================================
// Product Store
// =============================================================================

/// Store of record for products.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts a new product row.
    async fn insert(&self, product: &Product) -> DbResult<()>;

    /// Reads a row by id; `Ok(None)` when absent.
    async fn get(&self, product_id: Uuid) -> DbResult<Option<Product>>;

    /// Overwrites the full row if its stored version equals `expected_version`.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The row as stored, with `version = expected_version + 1`
    /// * `Err(DbError::Conflict)` - The stored version moved on
    /// * `Err(DbError::NotFound)` - No such product
    async fn update(&self, product: &Product, expected_version: i64) -> DbResult<Product>;
}
