//! # Product Repository
//!
//! PostgreSQL store of record for the `products` table.
//!
//! ## Version Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ WRONG: blind overwrite (lost update between two writers)           │
//! │     UPDATE products SET stock_quantity = 70 WHERE product_id = ?       │
//! │                                                                         │
//! │  ✅ CORRECT: overwrite only the version we read                        │
//! │     UPDATE products SET stock_quantity = 70, version = version + 1     │
//! │     WHERE product_id = ? AND version = 4                               │
//! │                                                                         │
//! │  0 rows affected + row exists → DbError::Conflict → caller re-reads    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use stockline_core::Product;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::store::ProductStore;

const COLUMNS: &str = r#"
    product_id, product_barcode_id, product_name, price_cents, cost_price_cents,
    category_id, sub_category_id, stock_quantity, reorder_level, supplier_id,
    product_description, active, store_id, branch_id, company_id,
    created_at, created_by, updated_at, updated_by, version
"#;

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    /// Creates a new PgProductStore.
    pub fn new(pool: PgPool) -> Self {
        PgProductStore { pool }
    }

    async fn exists(&self, product_id: Uuid) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT version FROM products WHERE product_id = $1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(product_id = %product.product_id, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                product_id, product_barcode_id, product_name, price_cents, cost_price_cents,
                category_id, sub_category_id, stock_quantity, reorder_level, supplier_id,
                product_description, active, store_id, branch_id, company_id,
                created_at, created_by, updated_at, updated_by, version
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20
            )
            "#,
        )
        .bind(product.product_id)
        .bind(&product.product_barcode_id)
        .bind(&product.product_name)
        .bind(product.price_cents)
        .bind(product.cost_price_cents)
        .bind(product.category_id)
        .bind(product.sub_category_id)
        .bind(product.stock_quantity)
        .bind(product.reorder_level)
        .bind(product.supplier_id)
        .bind(&product.product_description)
        .bind(product.active)
        .bind(product.store_id)
        .bind(product.branch_id)
        .bind(product.company_id)
        .bind(product.created_at)
        .bind(product.created_by)
        .bind(product.updated_at)
        .bind(product.updated_by)
        .bind(product.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, product_id: Uuid) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {COLUMNS} FROM products WHERE product_id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    async fn update(&self, product: &Product, expected_version: i64) -> DbResult<Product> {
        debug!(
            product_id = %product.product_id,
            stock_quantity = product.stock_quantity,
            expected_version,
            "Updating product"
        );

        let sql = format!(
            r#"
            UPDATE products SET
                product_barcode_id = $3,
                product_name = $4,
                price_cents = $5,
                cost_price_cents = $6,
                category_id = $7,
                sub_category_id = $8,
                stock_quantity = $9,
                reorder_level = $10,
                supplier_id = $11,
                product_description = $12,
                active = $13,
                store_id = $14,
                branch_id = $15,
                company_id = $16,
                updated_at = $17,
                updated_by = $18,
                version = version + 1
            WHERE product_id = $1 AND version = $2
            RETURNING {COLUMNS}
            "#
        );

        let written = sqlx::query_as::<_, Product>(&sql)
            .bind(product.product_id)
            .bind(expected_version)
            .bind(&product.product_barcode_id)
            .bind(&product.product_name)
            .bind(product.price_cents)
            .bind(product.cost_price_cents)
            .bind(product.category_id)
            .bind(product.sub_category_id)
            .bind(product.stock_quantity)
            .bind(product.reorder_level)
            .bind(product.supplier_id)
            .bind(&product.product_description)
            .bind(product.active)
            .bind(product.store_id)
            .bind(product.branch_id)
            .bind(product.company_id)
            .bind(product.updated_at)
            .bind(product.updated_by)
            .fetch_optional(&self.pool)
            .await?;

        match written {
            Some(row) => Ok(row),
            None if self.exists(product.product_id).await? => {
                Err(DbError::conflict("Product", product.product_id, expected_version))
            }
            None => Err(DbError::not_found("Product", product.product_id)),
        }
    }
}
