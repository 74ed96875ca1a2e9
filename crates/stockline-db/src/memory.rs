//! In-memory implementations of [`MovementStore`] and [`ProductStore`].
//!
//! Intended for tests and local development. Semantics match the PostgreSQL
//! repositories, including the version compare-and-swap on both tables.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use stockline_core::{InventoryMovement, Page, Pagination, Product};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::store::{MovementStore, ProductStore, ScopeFilter};

fn poisoned() -> DbError {
    DbError::Internal("lock poisoned".to_string())
}

// =============================================================================
// Movements
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryMovementStore {
    rows: RwLock<HashMap<Uuid, InventoryMovement>>,
}

impl InMemoryMovementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every row for one product, in no particular order.
    pub fn for_product(&self, product_id: Uuid) -> Vec<InventoryMovement> {
        self.rows
            .read()
            .map(|rows| {
                rows.values()
                    .filter(|m| m.product_id == product_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MovementStore for InMemoryMovementStore {
    async fn insert(&self, movement: &InventoryMovement) -> DbResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        if rows.contains_key(&movement.inventory_id) {
            return Err(DbError::UniqueViolation {
                field: "inventory_id".to_string(),
                value: movement.inventory_id.to_string(),
            });
        }

        rows.insert(movement.inventory_id, movement.clone());
        Ok(())
    }

    async fn get(&self, inventory_id: Uuid) -> DbResult<Option<InventoryMovement>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&inventory_id).cloned())
    }

    async fn update(
        &self,
        movement: &InventoryMovement,
        expected_version: i64,
    ) -> DbResult<InventoryMovement> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        let row = rows
            .get_mut(&movement.inventory_id)
            .ok_or_else(|| DbError::not_found("InventoryMovement", movement.inventory_id))?;

        if row.version != expected_version {
            return Err(DbError::conflict(
                "InventoryMovement",
                movement.inventory_id,
                expected_version,
            ));
        }

        let written = InventoryMovement {
            version: expected_version + 1,
            ..movement.clone()
        };
        *row = written.clone();
        Ok(written)
    }

    async fn delete(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        match rows.get(&inventory_id) {
            None => Err(DbError::not_found("InventoryMovement", inventory_id)),
            Some(row) if row.version != expected_version => Err(DbError::conflict(
                "InventoryMovement",
                inventory_id,
                expected_version,
            )),
            Some(_) => {
                rows.remove(&inventory_id);
                Ok(())
            }
        }
    }

    async fn list(
        &self,
        filter: ScopeFilter,
        pagination: Pagination,
    ) -> DbResult<Page<InventoryMovement>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;

        let mut matching: Vec<InventoryMovement> = rows
            .values()
            .filter(|m| filter.matches(&m.tenant()))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.inventory_id.cmp(&b.inventory_id))
        });

        let total = matching.len() as i64;
        let records = match pagination.window() {
            Some((limit, offset)) => matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            None => matching,
        };

        Ok(Page::new(records, total, pagination))
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    rows: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: &Product) -> DbResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        if rows.contains_key(&product.product_id) {
            return Err(DbError::UniqueViolation {
                field: "product_id".to_string(),
                value: product.product_id.to_string(),
            });
        }

        rows.insert(product.product_id, product.clone());
        Ok(())
    }

    async fn get(&self, product_id: Uuid) -> DbResult<Option<Product>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&product_id).cloned())
    }

    async fn update(&self, product: &Product, expected_version: i64) -> DbResult<Product> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        let row = rows
            .get_mut(&product.product_id)
            .ok_or_else(|| DbError::not_found("Product", product.product_id))?;

        if row.version != expected_version {
            return Err(DbError::conflict("Product", product.product_id, expected_version));
        }

        let written = Product {
            version: expected_version + 1,
            ..product.clone()
        };
        *row = written.clone();
        Ok(written)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{movement, product};
    use super::*;
    use stockline_core::TenantIds;

    #[tokio::test]
    async fn test_product_compare_and_swap() {
        let store = InMemoryProductStore::new();
        let p = product(TenantIds::company(Uuid::new_v4()), 10);
        store.insert(&p).await.unwrap();

        let written = store
            .update(&Product { stock_quantity: 5, ..p.clone() }, 0)
            .await
            .unwrap();
        assert_eq!(written.version, 1);

        let err = store
            .update(&Product { stock_quantity: 1, ..p.clone() }, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { expected_version: 0, .. }));

        let stored = store.get(p.product_id).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_update_missing_product_is_not_found() {
        let store = InMemoryProductStore::new();
        let p = product(TenantIds::company(Uuid::new_v4()), 10);
        assert!(store.update(&p, 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_movement_crud() {
        let store = InMemoryMovementStore::new();
        let m = movement(Uuid::new_v4(), TenantIds::company(Uuid::new_v4()), 5, 0);

        store.insert(&m).await.unwrap();
        assert!(matches!(
            store.insert(&m).await.unwrap_err(),
            DbError::UniqueViolation { .. }
        ));

        let edited = InventoryMovement { quantity: -3, ..m.clone() };
        let written = store.update(&edited, 0).await.unwrap();
        assert_eq!(written.version, 1);
        assert_eq!(store.get(m.inventory_id).await.unwrap().unwrap().quantity, -3);

        store.delete(m.inventory_id, 1).await.unwrap();
        assert!(store.delete(m.inventory_id, 1).await.unwrap_err().is_not_found());
        assert!(store.get(m.inventory_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_movement_writes_conflict() {
        let store = InMemoryMovementStore::new();
        let m = movement(Uuid::new_v4(), TenantIds::company(Uuid::new_v4()), 5, 0);
        store.insert(&m).await.unwrap();

        store
            .update(&InventoryMovement { quantity: 8, ..m.clone() }, 0)
            .await
            .unwrap();

        // both writers read version 0; the second one loses
        let err = store
            .update(&InventoryMovement { quantity: 2, ..m.clone() }, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { expected_version: 0, .. }));

        let err = store.delete(m.inventory_id, 0).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let stored = store.get(m.inventory_id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 8);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = InMemoryMovementStore::new();
        let company = Uuid::new_v4();
        let branch_a = TenantIds::company(company).with_branch(Uuid::new_v4());
        let branch_b = TenantIds::company(company).with_branch(Uuid::new_v4());
        let product_id = Uuid::new_v4();

        for age in 0..5 {
            store.insert(&movement(product_id, branch_a, 1, age)).await.unwrap();
        }
        store.insert(&movement(product_id, branch_b, 1, 0)).await.unwrap();

        let all = store
            .list(ScopeFilter::Company(company), Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.total_records, 6);
        assert_eq!(all.records.len(), 6);

        let branch_id = branch_a.branch_id.unwrap();
        let page = store
            .list(ScopeFilter::Branch(branch_id), Pagination::new(2, 3))
            .await
            .unwrap();
        assert_eq!(page.total_records, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.records.len(), 1);

        let newest = store
            .list(ScopeFilter::Branch(branch_id), Pagination::new(1, 1))
            .await
            .unwrap();
        let oldest = store
            .list(ScopeFilter::Branch(branch_id), Pagination::new(1, 5))
            .await
            .unwrap();
        assert!(newest.records[0].date > oldest.records[0].date);
    }
}
