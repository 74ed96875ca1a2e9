//! # Stock Ledger Store
//!
//! Cached access to inventory movement rows.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create / update          delete                   read_by_id           │
//! │  ───────────────          ──────                   ──────────           │
//! │  1. store write           1. store delete          1. cache GET         │
//! │  2. cache SET (7d)        2. cache tombstone       2. store read        │
//! │                              (skipped when 1 fails) 3. cache fill (NX)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`StockLedger::read_authoritative`] skips the cache entirely; anything that
//! feeds stock arithmetic reads through it. Updates and deletes carry the
//! version that read returned and fail with `Conflict` if the row changed
//! since.

use std::sync::Arc;

use stockline_core::{InventoryMovement, Page, Pagination, RolePolicy, TenantIds};
use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, CacheAside, CacheSettings};
use crate::error::{DbError, DbResult};
use crate::store::{MovementStore, ScopeFilter};

/// Cache key namespace for movement rows.
pub const MOVEMENT_NAMESPACE: &str = "inventory_movement";

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn MovementStore>,
    cache: CacheAside<InventoryMovement>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn MovementStore>, cache: Arc<dyn Cache>, settings: CacheSettings) -> Self {
        StockLedger {
            store,
            cache: CacheAside::new(cache, MOVEMENT_NAMESPACE, settings),
        }
    }

    /// Persists a new movement, assigning an id when it has none.
    pub async fn create(&self, mut movement: InventoryMovement) -> DbResult<InventoryMovement> {
        if movement.inventory_id.is_nil() {
            movement.inventory_id = Uuid::new_v4();
        }

        self.store.insert(&movement).await?;
        self.cache.put(movement.inventory_id, &movement).await;

        debug!(inventory_id = %movement.inventory_id, "Ledger row created");
        Ok(movement)
    }

    /// Cache-aside read. `NotFound` when the store has no such row.
    pub async fn read_by_id(&self, inventory_id: Uuid) -> DbResult<InventoryMovement> {
        if let Some(movement) = self.cache.get(inventory_id).await {
            return Ok(movement);
        }

        let movement = self.read_authoritative(inventory_id).await?;
        self.cache.fill(inventory_id, &movement).await;
        Ok(movement)
    }

    /// Store-of-record read that never consults the cache.
    pub async fn read_authoritative(&self, inventory_id: Uuid) -> DbResult<InventoryMovement> {
        self.store
            .get(inventory_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryMovement", inventory_id))
    }

    /// Full-row overwrite guarded by `expected_version`, then cache
    /// overwrite. Returns the row as stored.
    pub async fn update(
        &self,
        movement: &InventoryMovement,
        expected_version: i64,
    ) -> DbResult<InventoryMovement> {
        let written = self.store.update(movement, expected_version).await?;
        self.cache.put(written.inventory_id, &written).await;

        debug!(inventory_id = %written.inventory_id, version = written.version, "Ledger row updated");
        Ok(written)
    }

    /// Deletes the row if it is still at `expected_version`, then tombstones
    /// the cache key. A failed row delete leaves the cache alone.
    pub async fn delete(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<()> {
        self.store.delete(inventory_id, expected_version).await?;
        self.cache.invalidate(inventory_id).await;

        debug!(%inventory_id, "Ledger row deleted");
        Ok(())
    }

    /// Lists movements visible to a role, filtered on the tenant id that role
    /// is scoped by.
    ///
    /// ## Errors
    /// `UnsupportedScope` for an unrecognized role name.
    pub async fn read_all_by_tenant_scope(
        &self,
        pagination: Pagination,
        policy: &RolePolicy,
        role_name: &str,
        tenant: &TenantIds,
    ) -> DbResult<Page<InventoryMovement>> {
        let filter = ScopeFilter::for_role(policy, role_name, tenant)?;
        self.store.list(filter, pagination).await
    }
}
