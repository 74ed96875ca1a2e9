//! # Reconciliation Engine
//!
//! The only writer of product stock. Every create, edit or delete of an
//! inventory movement is paired with the matching product stock change, so
//! that for every product:
//!
//! ```text
//! stock_quantity == initial stock + Σ quantity of its live movements  (≥ 0)
//! ```
//!
//! ## Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve role ─► can mutate? ─► resolve branch/store                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────── product lock ──────────────────────────────────────┐ │
//! │  │ read product (authoritative) ─► product in scope? ─► guard stock  │ │
//! │  │      │                           (rejections have no side effect) │ │
//! │  │      ▼                                                            │ │
//! │  │ ledger.create ──► product CAS ──┬── ok ───────────► committed     │ │
//! │  │                       ▲         ├── Conflict ─► re-read, re-guard │ │
//! │  │                       └─────────┘                                 │ │
//! │  │                                 └── failure ─► ledger.delete      │ │
//! │  │                                                 └── fails ─► Inconsistent
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Update / Delete
//! Update writes the movement first and restores its pre-image if the
//! product write fails. Delete writes the product first and restores its
//! stock if the movement delete fails.
//!
//! Both carry the movement version read under the product lock. Another
//! service instance that changed the movement in between makes the movement
//! write fail with `Conflict`, so stock is never reconciled against a
//! quantity the ledger no longer holds.
//!
//! ## Deadlines
//! Reads, the role lookup and lock acquisition run under the caller's
//! deadline. The deadline is checked before each write; a write already sent
//! is never abandoned. Compensating writes get their own `rollback_timeout`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use stockline_core::reconcile::{stock_after_create, stock_after_delete, stock_after_update};
use stockline_core::{
    policy::resolve_movement_scope, CallerClaims, CoreResult, InventoryMovement, NewMovement, Page,
    Pagination, Product,
};
use stockline_db::{DbError, DbResult, ProductProjector, StockLedger};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::locks::{ProductGuard, ProductLocks};
use crate::roles::{AuthorizationResolver, ResolvedCaller};

// =============================================================================
// Settings / Caller Context
// =============================================================================

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Time allowed for each compensating write.
    /// Default: 2 seconds
    pub rollback_timeout: Duration,

    /// Product compare-and-swap retries before giving up.
    /// Default: 3
    pub max_stock_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            rollback_timeout: Duration::from_secs(2),
            max_stock_retries: 3,
        }
    }
}

/// Authenticated caller plus the point in time the request must finish by.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub claims: CallerClaims,
    pub deadline: Instant,
}

impl CallerContext {
    pub fn new(claims: CallerClaims, deadline: Instant) -> Self {
        CallerContext { claims, deadline }
    }

    pub fn with_timeout(claims: CallerClaims, timeout: Duration) -> Self {
        CallerContext {
            claims,
            deadline: Instant::now() + timeout,
        }
    }

    fn user_id(&self) -> Uuid {
        self.claims.user_id
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct ReconciliationEngine {
    ledger: StockLedger,
    projector: ProductProjector,
    auth: AuthorizationResolver,
    locks: ProductLocks,
    settings: EngineSettings,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: StockLedger,
        projector: ProductProjector,
        auth: AuthorizationResolver,
        settings: EngineSettings,
    ) -> Self {
        ReconciliationEngine {
            ledger,
            projector,
            auth,
            locks: ProductLocks::new(),
            settings,
        }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn projector(&self) -> &ProductProjector {
        &self.projector
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Records a movement and applies its quantity to the product's stock.
    ///
    /// ## Errors
    /// * `PermissionDenied` - Role cannot mutate, or the product is outside the caller's scope
    /// * `InvalidInput` - Branch or store could not be resolved
    /// * `NotFound` - No such product
    /// * `InsufficientStock` - A decrease larger than the stock on hand
    /// * `ExternalUnavailable` - Collaborator failure, deadline, retries exhausted
    /// * `Inconsistent` - The ledger row could not be rolled back
    pub async fn create_movement(
        &self,
        ctx: &CallerContext,
        request: NewMovement,
    ) -> EngineResult<InventoryMovement> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_mutate()?;
        let tenant = resolve_movement_scope(caller.scope, &ctx.claims.tenant, &request)?;

        let _guard = self.lock_product(ctx, request.product_id).await?;

        let product = self
            .within(ctx, self.projector.read_authoritative(request.product_id))
            .await?;
        caller.require_scope("products", &product.tenant(), &ctx.claims.tenant)?;
        stock_after_create(product.stock_quantity, request.quantity)?;

        let now = now();
        let movement = InventoryMovement {
            inventory_id: request.inventory_id.unwrap_or_else(Uuid::nil),
            product_id: request.product_id,
            store_id: tenant.store_id,
            date: now,
            quantity: request.quantity,
            branch_id: tenant.branch_id,
            company_id: tenant.company_id,
            created_at: now,
            created_by: ctx.user_id(),
            updated_at: now,
            updated_by: ctx.user_id(),
            version: 0,
        };

        ensure_time_left(ctx)?;
        let movement = self.ledger.create(movement).await?;

        let quantity = movement.quantity;
        let stock_before = product.stock_quantity;
        match self
            .project_stock(ctx.deadline, ctx.user_id(), product, |stock| {
                stock_after_create(stock, quantity)
            })
            .await
        {
            Ok(written) => {
                info!(
                    inventory_id = %movement.inventory_id,
                    product_id = %movement.product_id,
                    quantity,
                    stock_before,
                    stock_after = written.stock_quantity,
                    "Movement created"
                );
                Ok(movement)
            }
            Err(cause) => Err(self.undo_create(&movement, cause).await),
        }
    }

    async fn undo_create(&self, movement: &InventoryMovement, cause: EngineError) -> EngineError {
        warn!(inventory_id = %movement.inventory_id, error = %cause, "Rolling back ledger row");

        match self
            .compensate(self.ledger.delete(movement.inventory_id, movement.version))
            .await
        {
            Ok(()) => cause,
            Err(rollback) if rollback.is_not_found() => cause,
            Err(rollback) => {
                error!(
                    inventory_id = %movement.inventory_id,
                    product_id = %movement.product_id,
                    quantity = movement.quantity,
                    cause = %cause,
                    rollback_error = %rollback,
                    "Ledger row persisted without its stock change"
                );
                EngineError::Inconsistent(format!(
                    "movement {} was recorded but product stock was not updated: {cause}",
                    movement.inventory_id
                ))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Changes a movement's quantity and repairs the product stock by the
    /// difference.
    ///
    /// ## Errors
    /// * `PermissionDenied` - Role cannot mutate, or the movement/product is outside scope
    /// * `NotFound` - No such movement or product
    /// * `CannotReverse` - The repaired stock would be negative
    /// * `ExternalUnavailable` - Collaborator failure, deadline, retries exhausted
    /// * `Inconsistent` - The movement could not be restored
    pub async fn update_movement(
        &self,
        ctx: &CallerContext,
        inventory_id: Uuid,
        new_quantity: i64,
    ) -> EngineResult<InventoryMovement> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_mutate()?;

        let (_guard, pre, product) = self.load_for_change(ctx, &caller, inventory_id).await?;
        stock_after_update(product.stock_quantity, pre.quantity, new_quantity)?;

        let updated = InventoryMovement {
            quantity: new_quantity,
            updated_at: now(),
            updated_by: ctx.user_id(),
            ..pre.clone()
        };

        ensure_time_left(ctx)?;
        // Conflict here means another instance edited the movement; nothing
        // has been written yet
        let written = self.ledger.update(&updated, pre.version).await?;

        let stock_before = product.stock_quantity;
        match self
            .project_stock(ctx.deadline, ctx.user_id(), product, |stock| {
                stock_after_update(stock, pre.quantity, new_quantity)
            })
            .await
        {
            Ok(projected) => {
                info!(
                    %inventory_id,
                    product_id = %pre.product_id,
                    from = pre.quantity,
                    to = new_quantity,
                    stock_before,
                    stock_after = projected.stock_quantity,
                    "Movement updated"
                );
                Ok(written)
            }
            Err(cause) => Err(self.undo_update(&pre, &written, cause).await),
        }
    }

    async fn undo_update(
        &self,
        pre: &InventoryMovement,
        written: &InventoryMovement,
        cause: EngineError,
    ) -> EngineError {
        warn!(inventory_id = %pre.inventory_id, error = %cause, "Restoring movement pre-image");

        let attempted = written.quantity;
        match self.compensate(self.ledger.update(pre, written.version)).await {
            Ok(_) => cause,
            Err(rollback) => {
                error!(
                    inventory_id = %pre.inventory_id,
                    product_id = %pre.product_id,
                    quantity_before = pre.quantity,
                    quantity_after = attempted,
                    cause = %cause,
                    rollback_error = %rollback,
                    "Movement edited without its stock change"
                );
                EngineError::Inconsistent(format!(
                    "movement {} holds quantity {attempted} but product stock reflects {}: {cause}",
                    pre.inventory_id, pre.quantity
                ))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------------

    /// Removes a movement and reverses its effect on the product stock.
    ///
    /// ## Errors
    /// * `PermissionDenied` - Role cannot mutate, or the movement/product is outside scope
    /// * `NotFound` - No such movement or product
    /// * `CannotReverse` - Reversing a prior increase would drive stock negative
    /// * `ExternalUnavailable` - Collaborator failure, deadline, retries exhausted
    /// * `Inconsistent` - The product stock could not be restored
    pub async fn delete_movement(&self, ctx: &CallerContext, inventory_id: Uuid) -> EngineResult<()> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_mutate()?;

        let (_guard, pre, product) = self.load_for_change(ctx, &caller, inventory_id).await?;
        stock_after_delete(product.stock_quantity, pre.quantity)?;

        ensure_time_left(ctx)?;
        let stock_before = product.stock_quantity;
        let written = self
            .project_stock(ctx.deadline, ctx.user_id(), product, |stock| {
                stock_after_delete(stock, pre.quantity)
            })
            .await?;

        let removed = match ensure_time_left(ctx) {
            Ok(()) => self
                .ledger
                .delete(inventory_id, pre.version)
                .await
                .map_err(EngineError::from),
            Err(e) => Err(e),
        };

        match removed {
            Ok(()) => {
                info!(
                    %inventory_id,
                    product_id = %pre.product_id,
                    quantity = pre.quantity,
                    stock_before,
                    stock_after = written.stock_quantity,
                    "Movement deleted"
                );
                Ok(())
            }
            Err(cause) => Err(self.undo_delete(ctx, &pre, written, cause).await),
        }
    }

    async fn undo_delete(
        &self,
        ctx: &CallerContext,
        pre: &InventoryMovement,
        written: Product,
        cause: EngineError,
    ) -> EngineError {
        warn!(inventory_id = %pre.inventory_id, error = %cause, "Restoring product stock");

        let stock_after = written.stock_quantity;
        let deadline = Instant::now() + self.settings.rollback_timeout;
        let restore = self.project_stock(deadline, ctx.user_id(), written, |stock| {
            stock_after_create(stock, pre.quantity)
        });

        let outcome = match tokio::time::timeout(self.settings.rollback_timeout, restore).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::unavailable("rollback timed out")),
        };

        match outcome {
            Ok(_) => cause,
            Err(rollback) => {
                error!(
                    inventory_id = %pre.inventory_id,
                    product_id = %pre.product_id,
                    quantity = pre.quantity,
                    stock_after,
                    cause = %cause,
                    rollback_error = %rollback,
                    "Product stock reversed but movement still present"
                );
                EngineError::Inconsistent(format!(
                    "product {} stock no longer reflects live movement {}: {cause}",
                    pre.product_id, pre.inventory_id
                ))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Reads one movement the caller is allowed to see.
    pub async fn read_movement(
        &self,
        ctx: &CallerContext,
        inventory_id: Uuid,
    ) -> EngineResult<InventoryMovement> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_read()?;

        let movement = self.within(ctx, self.ledger.read_by_id(inventory_id)).await?;
        caller.require_scope("inventory history", &movement.tenant(), &ctx.claims.tenant)?;
        Ok(movement)
    }

    /// Lists the movements inside the caller's tenant scope, newest first.
    pub async fn list_movements(
        &self,
        ctx: &CallerContext,
        pagination: Pagination,
    ) -> EngineResult<Page<InventoryMovement>> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_read()?;

        self.within(
            ctx,
            self.ledger.read_all_by_tenant_scope(
                pagination,
                self.auth.policy(),
                &caller.role_name,
                &ctx.claims.tenant,
            ),
        )
        .await
    }

    /// Current product row for display, served cache-aside.
    pub async fn read_product_stock(&self, ctx: &CallerContext, product_id: Uuid) -> EngineResult<Product> {
        let caller = self.auth.resolve(&ctx.claims, ctx.deadline).await?;
        caller.require_read()?;

        let product = self.within(ctx, self.projector.read_by_id(product_id)).await?;
        caller.require_scope("products", &product.tenant(), &ctx.claims.tenant)?;
        Ok(product)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Locates a movement, takes its product's lock, then re-reads the movement
    /// and product under the lock and scope-checks both.
    async fn load_for_change(
        &self,
        ctx: &CallerContext,
        caller: &ResolvedCaller,
        inventory_id: Uuid,
    ) -> EngineResult<(ProductGuard, InventoryMovement, Product)> {
        let located = self
            .within(ctx, self.ledger.read_authoritative(inventory_id))
            .await?;

        let guard = self.lock_product(ctx, located.product_id).await?;

        let pre = self
            .within(ctx, self.ledger.read_authoritative(inventory_id))
            .await?;
        caller.require_scope("inventory history", &pre.tenant(), &ctx.claims.tenant)?;

        let product = self
            .within(ctx, self.projector.read_authoritative(pre.product_id))
            .await?;
        caller.require_scope("products", &product.tenant(), &ctx.claims.tenant)?;

        Ok((guard, pre, product))
    }

    async fn lock_product(&self, ctx: &CallerContext, product_id: Uuid) -> EngineResult<ProductGuard> {
        tokio::time::timeout_at(ctx.deadline, self.locks.lock(product_id))
            .await
            .map_err(|_| EngineError::unavailable("deadline exceeded waiting for product lock"))
    }

    async fn within<T>(&self, ctx: &CallerContext, op: impl Future<Output = DbResult<T>>) -> EngineResult<T> {
        match tokio::time::timeout_at(ctx.deadline, op).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::unavailable("deadline exceeded")),
        }
    }

    async fn compensate<T>(&self, op: impl Future<Output = DbResult<T>>) -> DbResult<T> {
        tokio::time::timeout(self.settings.rollback_timeout, op)
            .await
            .map_err(|_| DbError::Internal("rollback timed out".to_string()))?
    }

    /// Writes `compute(stock)` to the product through the version
    /// compare-and-swap, re-reading and recomputing on `Conflict`.
    async fn project_stock(
        &self,
        deadline: Instant,
        user_id: Uuid,
        mut current: Product,
        compute: impl Fn(i64) -> CoreResult<i64>,
    ) -> EngineResult<Product> {
        let mut retries = 0;

        loop {
            let stock = compute(current.stock_quantity)?;
            if Instant::now() >= deadline {
                return Err(EngineError::unavailable("deadline exceeded before stock write"));
            }

            let next = Product {
                stock_quantity: stock,
                updated_at: now(),
                updated_by: user_id,
                ..current.clone()
            };

            match self.projector.update(&next, current.version).await {
                Ok(written) => {
                    if written.needs_reorder() {
                        info!(
                            product_id = %written.product_id,
                            stock_quantity = written.stock_quantity,
                            reorder_level = written.reorder_level,
                            "Product at or below reorder level"
                        );
                    }
                    return Ok(written);
                }
                Err(DbError::Conflict { .. }) if retries < self.settings.max_stock_retries => {
                    retries += 1;
                    debug!(product_id = %current.product_id, retries, "Stock write conflicted, re-reading");

                    current = tokio::time::timeout_at(
                        deadline,
                        self.projector.read_authoritative(current.product_id),
                    )
                    .await
                    .map_err(|_| EngineError::unavailable("deadline exceeded"))??;
                }
                Err(DbError::Conflict { .. }) => {
                    return Err(EngineError::unavailable(format!(
                        "product {} kept changing; gave up after {retries} retries",
                        current.product_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Current time at the store's microsecond resolution, so a cached row
/// matches the stored one.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ensure_time_left(ctx: &CallerContext) -> EngineResult<()> {
    if Instant::now() >= ctx.deadline {
        return Err(EngineError::unavailable("deadline exceeded"));
    }
    Ok(())
}
