//! # Domain Types
//!
//! Core domain types used throughout Stockline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────────┐      ┌──────────────────────┐                 │
//! │  │  InventoryMovement   │      │      Product         │                 │
//! │  │  ──────────────────  │ ───► │  ──────────────────  │                 │
//! │  │  inventory_id (UUID) │      │  product_id (UUID)   │                 │
//! │  │  product_id (FK)     │      │  stock_quantity ≥ 0  │                 │
//! │  │  quantity (signed)   │      │  version (CAS)       │                 │
//! │  └──────────────────────┘      └──────────────────────┘                 │
//! │                                                                         │
//! │  ┌──────────────────────┐      ┌──────────────────────┐                 │
//! │  │     TenantIds        │      │    CallerClaims      │                 │
//! │  │  company / branch /  │      │  user_id, role_id,   │                 │
//! │  │  store               │      │  tenant (TenantIds)  │                 │
//! │  └──────────────────────┘      └──────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tenant Hierarchy
//! Company → Branch → Store. A movement always carries its company; branch and
//! store are optional because company-scoped callers may book stock at branch
//! level without naming a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Tenant Scope
// =============================================================================

/// Company / branch / store identifiers bounding a record or a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIds {
    pub company_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
}

impl TenantIds {
    /// Company-level scope with no branch or store.
    pub fn company(company_id: Uuid) -> Self {
        TenantIds {
            company_id,
            branch_id: None,
            store_id: None,
        }
    }

    /// Adds a branch id.
    pub fn with_branch(mut self, branch_id: Uuid) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    /// Adds a store id.
    pub fn with_store(mut self, store_id: Uuid) -> Self {
        self.store_id = Some(store_id);
        self
    }
}

/// What the caller's token carries once it has been verified upstream.
///
/// Token parsing itself happens at the transport edge; the engine only sees
/// the decoded claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerClaims {
    /// Authenticated user, written to the audit columns.
    pub user_id: Uuid,
    /// Opaque role identifier resolved through the role service.
    pub role_id: String,
    /// Tenant ids embedded in the token.
    pub tenant: TenantIds,
}

// =============================================================================
// Inventory Movement
// =============================================================================

/// A signed quantity change recorded against a product (a ledger entry).
///
/// The net effect of a live movement on its product's stock is exactly
/// `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub store_id: Option<Uuid>,
    /// When the movement occurred.
    pub date: DateTime<Utc>,
    /// Signed delta: positive restocks, negative removes.
    pub quantity: i64,
    pub branch_id: Option<Uuid>,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    /// Incremented on every committed write; guards edits and deletes
    /// against a concurrent writer.
    pub version: i64,
}

impl InventoryMovement {
    /// Tenant ids recorded on the movement.
    pub fn tenant(&self) -> TenantIds {
        TenantIds {
            company_id: self.company_id,
            branch_id: self.branch_id,
            store_id: self.store_id,
        }
    }
}

/// Caller input for a new movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    /// Pre-assigned identity; generated when absent.
    pub inventory_id: Option<Uuid>,
    pub product_id: Uuid,
    pub quantity: i64,
    /// Required for company-scoped callers, ignored otherwise.
    pub branch_id: Option<Uuid>,
    /// Used by company- and branch-scoped callers.
    pub store_id: Option<Uuid>,
}

impl NewMovement {
    pub fn new(product_id: Uuid, quantity: i64) -> Self {
        NewMovement {
            inventory_id: None,
            product_id,
            quantity,
            branch_id: None,
            store_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: Uuid) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_store(mut self, store_id: Uuid) -> Self {
        self.store_id = Some(store_id);
        self
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product. Only `stock_quantity` is mutated by this system; every
/// other attribute passes through unchanged on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub product_id: Uuid,
    pub product_barcode_id: String,
    pub product_name: String,
    /// Price in cents (smallest currency unit).
    pub price_cents: i64,
    pub cost_price_cents: i64,
    pub category_id: Uuid,
    pub sub_category_id: Uuid,
    /// Running stock level. Never negative once committed.
    pub stock_quantity: i64,
    pub reorder_level: i64,
    pub supplier_id: Option<Uuid>,
    pub product_description: String,
    pub active: bool,
    pub store_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    /// Incremented on every committed write; used for compare-and-swap.
    pub version: i64,
}

impl Product {
    /// Tenant ids recorded on the product.
    pub fn tenant(&self) -> TenantIds {
        TenantIds {
            company_id: self.company_id,
            branch_id: self.branch_id,
            store_id: self.store_id,
        }
    }

    /// Whether stock has dropped to or below the reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Page request: `limit` rows per page, 1-based `page`.
///
/// Either value being zero disables paging and returns every matching row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub page: u32,
}

impl Pagination {
    pub fn new(limit: u32, page: u32) -> Self {
        Pagination { limit, page }
    }

    /// Returns `(limit, offset)` when paging is enabled.
    pub fn window(&self) -> Option<(i64, i64)> {
        if self.limit > 0 && self.page > 0 {
            let limit = i64::from(self.limit);
            Some((limit, i64::from(self.page - 1) * limit))
        } else {
            None
        }
    }
}

/// One page of typed records plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total_records: i64,
    pub current_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Builds a page, deriving `total_pages` from the request.
    pub fn new(records: Vec<T>, total_records: i64, pagination: Pagination) -> Self {
        let total = u64::try_from(total_records).unwrap_or(0);
        let total_pages = match pagination.window() {
            Some(_) => total.div_ceil(u64::from(pagination.limit)),
            None if total > 0 => 1,
            None => 0,
        };

        Page {
            records,
            total_records,
            current_page: pagination.page,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
