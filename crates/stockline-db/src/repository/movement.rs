//! # Inventory Movement Repository
//!
//! PostgreSQL store of record for the `inventory_movements` table.
//!
//! ## Key Operations
//! - Insert / read by `inventory_id`
//! - Full-row update and delete guarded by `version`
//! - Tenant-scoped listing with limit/page paging

use async_trait::async_trait;
use sqlx::PgPool;
use stockline_core::{InventoryMovement, Page, Pagination};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::store::{MovementStore, ScopeFilter};

const COLUMNS: &str = r#"
    inventory_id, product_id, store_id, date, quantity,
    branch_id, company_id, created_at, created_by, updated_at, updated_by, version
"#;

/// Repository for inventory movement rows.
///
/// ## Usage
/// ```rust,ignore
/// let repo = PgMovementStore::new(pool);
/// repo.insert(&movement).await?;
/// let found = repo.get(movement.inventory_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PgMovementStore {
    pool: PgPool,
}

impl PgMovementStore {
    /// Creates a new PgMovementStore.
    pub fn new(pool: PgPool) -> Self {
        PgMovementStore { pool }
    }

    /// Explains a guarded write that matched no row: `Conflict` if the row
    /// exists under another version, `NotFound` otherwise.
    async fn missed(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<DbError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT version FROM inventory_movements WHERE inventory_id = $1")
                .bind(inventory_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match found {
            Some(_) => DbError::conflict("InventoryMovement", inventory_id, expected_version),
            None => DbError::not_found("InventoryMovement", inventory_id),
        })
    }
}

fn filter_column(filter: ScopeFilter) -> (&'static str, Uuid) {
    match filter {
        ScopeFilter::Company(id) => ("company_id", id),
        ScopeFilter::Branch(id) => ("branch_id", id),
        ScopeFilter::Store(id) => ("store_id", id),
    }
}

#[async_trait]
impl MovementStore for PgMovementStore {
    async fn insert(&self, movement: &InventoryMovement) -> DbResult<()> {
        debug!(inventory_id = %movement.inventory_id, "Inserting inventory movement");

        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                inventory_id, product_id, store_id, date, quantity,
                branch_id, company_id, created_at, created_by, updated_at, updated_by, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(movement.inventory_id)
        .bind(movement.product_id)
        .bind(movement.store_id)
        .bind(movement.date)
        .bind(movement.quantity)
        .bind(movement.branch_id)
        .bind(movement.company_id)
        .bind(movement.created_at)
        .bind(movement.created_by)
        .bind(movement.updated_at)
        .bind(movement.updated_by)
        .bind(movement.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, inventory_id: Uuid) -> DbResult<Option<InventoryMovement>> {
        let sql = format!("SELECT {COLUMNS} FROM inventory_movements WHERE inventory_id = $1");

        let movement = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(inventory_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movement)
    }

    async fn update(
        &self,
        movement: &InventoryMovement,
        expected_version: i64,
    ) -> DbResult<InventoryMovement> {
        debug!(
            inventory_id = %movement.inventory_id,
            quantity = movement.quantity,
            expected_version,
            "Updating inventory movement"
        );

        let sql = format!(
            r#"
            UPDATE inventory_movements SET
                product_id = $3,
                store_id = $4,
                date = $5,
                quantity = $6,
                branch_id = $7,
                company_id = $8,
                created_at = $9,
                created_by = $10,
                updated_at = $11,
                updated_by = $12,
                version = version + 1
            WHERE inventory_id = $1 AND version = $2
            RETURNING {COLUMNS}
            "#
        );

        let written = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(movement.inventory_id)
            .bind(expected_version)
            .bind(movement.product_id)
            .bind(movement.store_id)
            .bind(movement.date)
            .bind(movement.quantity)
            .bind(movement.branch_id)
            .bind(movement.company_id)
            .bind(movement.created_at)
            .bind(movement.created_by)
            .bind(movement.updated_at)
            .bind(movement.updated_by)
            .fetch_optional(&self.pool)
            .await?;

        match written {
            Some(row) => Ok(row),
            None => Err(self.missed(movement.inventory_id, expected_version).await?),
        }
    }

    async fn delete(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<()> {
        debug!(%inventory_id, expected_version, "Deleting inventory movement");

        let result =
            sqlx::query("DELETE FROM inventory_movements WHERE inventory_id = $1 AND version = $2")
                .bind(inventory_id)
                .bind(expected_version)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(self.missed(inventory_id, expected_version).await?);
        }

        Ok(())
    }

    async fn list(
        &self,
        filter: ScopeFilter,
        pagination: Pagination,
    ) -> DbResult<Page<InventoryMovement>> {
        let (column, id) = filter_column(filter);
        let (limit, offset) = match pagination.window() {
            Some((limit, offset)) => (Some(limit), offset),
            // LIMIT NULL means no limit in PostgreSQL
            None => (None, 0),
        };

        let sql = format!(
            "SELECT {COLUMNS} FROM inventory_movements WHERE {column} = $1 \
             ORDER BY date DESC, inventory_id LIMIT $2 OFFSET $3"
        );
        let records = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM inventory_movements WHERE {column} = $1");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        debug!(column, count = records.len(), total, "Listed inventory movements");
        Ok(Page::new(records, total, pagination))
    }
}
