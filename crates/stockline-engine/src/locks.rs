//! Per-product serialization.
//!
//! Every stock mutation for a product runs while holding that product's
//! mutex. The registry only keeps weak references, so a product's entry goes
//! away once no request holds or waits for its lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Held for the duration of one reconciliation on a product.
pub type ProductGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct ProductLocks {
    registry: Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `product_id`.
    pub async fn lock(&self, product_id: Uuid) -> ProductGuard {
        self.handle(product_id).lock_owned().await
    }

    fn handle(&self, product_id: Uuid) -> Arc<AsyncMutex<()>> {
        // a poisoned registry still holds valid weak pointers
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());

        registry.retain(|_, weak| weak.strong_count() > 0);

        if let Some(existing) = registry.get(&product_id).and_then(Weak::upgrade) {
            return existing;
        }

        let fresh = Arc::new(AsyncMutex::new(()));
        registry.insert(product_id, Arc::downgrade(&fresh));
        fresh
    }

    /// Number of products with a held or awaited lock.
    pub fn active(&self) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
