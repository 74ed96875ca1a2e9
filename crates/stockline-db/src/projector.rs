//! # Product Stock Projector
//!
//! Cached access to product rows; the only writer of `stock_quantity`.
//!
//! Updates persist the whole row through the store's version
//! compare-and-swap and then overwrite the `product:<id>` cache entry with the
//! row as written.

use std::sync::Arc;

use stockline_core::Product;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{Cache, CacheAside, CacheSettings};
use crate::error::{DbError, DbResult};
use crate::store::ProductStore;

/// Cache key namespace for product rows.
pub const PRODUCT_NAMESPACE: &str = "product";

#[derive(Clone)]
pub struct ProductProjector {
    store: Arc<dyn ProductStore>,
    cache: CacheAside<Product>,
}

impl ProductProjector {
    pub fn new(store: Arc<dyn ProductStore>, cache: Arc<dyn Cache>, settings: CacheSettings) -> Self {
        ProductProjector {
            store,
            cache: CacheAside::new(cache, PRODUCT_NAMESPACE, settings),
        }
    }

    /// Inserts a product row and caches it.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        self.store.insert(product).await?;
        self.cache.put(product.product_id, product).await;
        Ok(())
    }

    /// Cache-aside read. `NotFound` when the store has no such row.
    pub async fn read_by_id(&self, product_id: Uuid) -> DbResult<Product> {
        if let Some(product) = self.cache.get(product_id).await {
            return Ok(product);
        }

        let product = self.read_authoritative(product_id).await?;
        self.cache.fill(product_id, &product).await;
        Ok(product)
    }

    /// Store-of-record read that never consults the cache.
    pub async fn read_authoritative(&self, product_id: Uuid) -> DbResult<Product> {
        self.store
            .get(product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Writes the full row if the stored version still equals
    /// `expected_version`; returns the row as written.
    ///
    /// ## Errors
    /// * `Conflict` - Someone else wrote the product first
    /// * `NotFound` - No such product
    pub async fn update(&self, product: &Product, expected_version: i64) -> DbResult<Product> {
        let written = self.store.update(product, expected_version).await?;
        self.cache.put(written.product_id, &written).await;

        debug!(
            product_id = %written.product_id,
            stock_quantity = written.stock_quantity,
            version = written.version,
            "Product stock projected"
        );
        Ok(written)
    }
}
