//! Shared fixtures: an engine wired to in-memory collaborators, with stores
//! that can be told to fail, to race an outside writer, or to run a second
//! engine in the middle of a call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stockline_core::{CallerClaims, InventoryMovement, Page, Pagination, Product, RolePolicy, TenantIds};
use stockline_db::{
    CacheSettings, DbError, DbResult, InMemoryCache, InMemoryMovementStore, InMemoryProductStore,
    MovementStore, ProductProjector, ProductStore, ScopeFilter, StockLedger,
};
use stockline_engine::{
    AuthorizationResolver, CallerContext, EngineSettings, InMemoryRoleDirectory,
    ReconciliationEngine,
};
use uuid::Uuid;

pub const COMPANY_ROLE: &str = "role-company";
pub const BRANCH_ROLE: &str = "role-branch";
pub const STORE_ROLE: &str = "role-store";
pub const CASHIER_ROLE: &str = "role-cashier";

// =============================================================================
// Fault Injection
// =============================================================================

/// Fails an operation once armed, optionally after letting some calls through.
#[derive(Debug, Default)]
pub struct Trip {
    armed: AtomicBool,
    pass: AtomicU32,
}

impl Trip {
    pub fn fail_always(&self) {
        self.fail_after(0);
    }

    pub fn fail_after(&self, successes: u32) {
        self.pass.store(successes, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn check(&self, what: &str) -> DbResult<()> {
        if !self.armed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let pass = self.pass.load(Ordering::SeqCst);
        if pass > 0 {
            self.pass.store(pass - 1, Ordering::SeqCst);
            return Ok(());
        }
        Err(DbError::ConnectionFailed(format!("injected {what} failure")))
    }
}

/// One-shot async callback run inside a store call.
pub type Hook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

fn take(slot: &Mutex<Option<Hook>>) -> Option<Hook> {
    slot.lock().unwrap().take()
}

#[derive(Default)]
pub struct FaultyMovementStore {
    pub inner: InMemoryMovementStore,
    pub insert: Trip,
    pub update: Trip,
    pub delete: Trip,
    before_update: Mutex<Option<Hook>>,
    after_get: Mutex<Option<Hook>>,
}

impl std::fmt::Debug for FaultyMovementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyMovementStore").finish_non_exhaustive()
    }
}

impl FaultyMovementStore {
    /// Runs `hook` once, when the next update reaches the store and before
    /// it writes.
    pub fn before_next_update<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.before_update.lock().unwrap() = Some(Box::new(move || Box::pin(hook())));
    }

    /// Runs `hook` once, after the next read has loaded its row and before
    /// the row is handed back.
    pub fn after_next_get<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.after_get.lock().unwrap() = Some(Box::new(move || Box::pin(hook())));
    }
}

#[async_trait]
impl MovementStore for FaultyMovementStore {
    async fn insert(&self, movement: &InventoryMovement) -> DbResult<()> {
        self.insert.check("movement insert")?;
        self.inner.insert(movement).await
    }

    async fn get(&self, inventory_id: Uuid) -> DbResult<Option<InventoryMovement>> {
        let row = self.inner.get(inventory_id).await?;
        if let Some(hook) = take(&self.after_get) {
            hook().await;
        }
        Ok(row)
    }

    async fn update(&self, movement: &InventoryMovement, expected_version: i64) -> DbResult<InventoryMovement> {
        if let Some(hook) = take(&self.before_update) {
            hook().await;
        }
        self.update.check("movement update")?;
        self.inner.update(movement, expected_version).await
    }

    async fn delete(&self, inventory_id: Uuid, expected_version: i64) -> DbResult<()> {
        self.delete.check("movement delete")?;
        self.inner.delete(inventory_id, expected_version).await
    }

    async fn list(&self, filter: ScopeFilter, pagination: Pagination) -> DbResult<Page<InventoryMovement>> {
        self.inner.list(filter, pagination).await
    }
}

/// Product store that can fail writes, always conflict, or let an outside
/// writer change stock just before the next compare-and-swap.
#[derive(Debug, Default)]
pub struct FaultyProductStore {
    pub inner: InMemoryProductStore,
    pub update: Trip,
    pub always_conflict: AtomicBool,
    outside_writes: Mutex<VecDeque<i64>>,
}

impl FaultyProductStore {
    /// Queues a stock change by another service instance, applied right
    /// before the next update reaches the store.
    pub fn race_outside_writer(&self, delta: i64) {
        self.outside_writes.lock().unwrap().push_back(delta);
    }
}

#[async_trait]
impl ProductStore for FaultyProductStore {
    async fn insert(&self, product: &Product) -> DbResult<()> {
        self.inner.insert(product).await
    }

    async fn get(&self, product_id: Uuid) -> DbResult<Option<Product>> {
        self.inner.get(product_id).await
    }

    async fn update(&self, product: &Product, expected_version: i64) -> DbResult<Product> {
        let outside = self.outside_writes.lock().unwrap().pop_front();
        if let Some(delta) = outside {
            let current = self.inner.get(product.product_id).await?.unwrap();
            let changed = Product {
                stock_quantity: current.stock_quantity + delta,
                ..current.clone()
            };
            self.inner.update(&changed, current.version).await?;
        }

        if self.always_conflict.load(Ordering::SeqCst) {
            return Err(DbError::conflict("Product", product.product_id, expected_version));
        }

        self.update.check("product update")?;
        self.inner.update(product, expected_version).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub engine: Arc<ReconciliationEngine>,
    pub settings: EngineSettings,
    pub movements: Arc<FaultyMovementStore>,
    pub products: Arc<FaultyProductStore>,
    pub cache: Arc<InMemoryCache>,
    pub directory: Arc<InMemoryRoleDirectory>,
    pub company: Uuid,
    pub branch: Uuid,
    pub store: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        stockline_engine::telemetry::init_tracing();

        let movements = Arc::new(FaultyMovementStore::default());
        let products = Arc::new(FaultyProductStore::default());
        let cache = Arc::new(InMemoryCache::new());
        let directory = Arc::new(
            InMemoryRoleDirectory::new()
                .with_role(COMPANY_ROLE, "company_admin")
                .with_role(BRANCH_ROLE, "branch_manager")
                .with_role(STORE_ROLE, "store_clerk")
                .with_role(CASHIER_ROLE, "cashier"),
        );

        Harness {
            engine: build_engine(&movements, &products, &cache, &directory, settings.clone()),
            settings,
            movements,
            products,
            cache,
            directory,
            company: Uuid::new_v4(),
            branch: Uuid::new_v4(),
            store: Uuid::new_v4(),
        }
    }

    /// Another service instance over the same stores, cache and role
    /// directory. It has its own product lock registry.
    pub fn second_engine(&self) -> Arc<ReconciliationEngine> {
        build_engine(
            &self.movements,
            &self.products,
            &self.cache,
            &self.directory,
            self.settings.clone(),
        )
    }

    pub fn home(&self) -> TenantIds {
        TenantIds::company(self.company)
            .with_branch(self.branch)
            .with_store(self.store)
    }

    pub fn ctx(&self, role_id: &str, tenant: TenantIds) -> CallerContext {
        CallerContext::with_timeout(
            CallerClaims {
                user_id: Uuid::new_v4(),
                role_id: role_id.to_string(),
                tenant,
            },
            Duration::from_secs(5),
        )
    }

    pub fn company_ctx(&self) -> CallerContext {
        self.ctx(COMPANY_ROLE, TenantIds::company(self.company))
    }

    pub fn branch_ctx(&self) -> CallerContext {
        self.ctx(BRANCH_ROLE, TenantIds::company(self.company).with_branch(self.branch))
    }

    pub fn store_ctx(&self) -> CallerContext {
        self.ctx(STORE_ROLE, self.home())
    }

    /// Seeds a product in this harness's home branch and store.
    pub async fn seed_product(&self, stock: i64) -> Product {
        self.seed_product_in(self.home(), stock).await
    }

    pub async fn seed_product_in(&self, tenant: TenantIds, stock: i64) -> Product {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let product = Product {
            product_id: Uuid::new_v4(),
            product_barcode_id: "8964000000017".to_string(),
            product_name: "Mineral Water 1.5L".to_string(),
            price_cents: 12_000,
            cost_price_cents: 9_000,
            category_id: Uuid::new_v4(),
            sub_category_id: Uuid::new_v4(),
            stock_quantity: stock,
            reorder_level: 10,
            supplier_id: None,
            product_description: String::new(),
            active: true,
            store_id: tenant.store_id,
            branch_id: tenant.branch_id,
            company_id: tenant.company_id,
            created_at: now,
            created_by: user,
            updated_at: now,
            updated_by: user,
            version: 0,
        };
        self.products.inner.insert(&product).await.unwrap();
        product
    }

    /// Store-of-record stock, bypassing every cache.
    pub async fn stock(&self, product_id: Uuid) -> i64 {
        self.products
            .inner
            .get(product_id)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    /// Σ quantity of the product's live movements.
    pub fn ledger_sum(&self, product_id: Uuid) -> i64 {
        self.movements
            .inner
            .for_product(product_id)
            .iter()
            .map(|m| m.quantity)
            .sum()
    }

    pub fn live_movements(&self, product_id: Uuid) -> usize {
        self.movements.inner.for_product(product_id).len()
    }
}

fn build_engine(
    movements: &Arc<FaultyMovementStore>,
    products: &Arc<FaultyProductStore>,
    cache: &Arc<InMemoryCache>,
    directory: &Arc<InMemoryRoleDirectory>,
    settings: EngineSettings,
) -> Arc<ReconciliationEngine> {
    let cache_settings = CacheSettings::default()
        .repair(Duration::from_millis(5), Duration::from_secs(2));
    let ledger = StockLedger::new(movements.clone(), cache.clone(), cache_settings.clone());
    let projector = ProductProjector::new(products.clone(), cache.clone(), cache_settings);
    let auth = AuthorizationResolver::new(
        directory.clone(),
        RolePolicy::new("company_admin", "branch_manager", "store_clerk"),
    );
    Arc::new(ReconciliationEngine::new(ledger, projector, auth, settings))
}
