//! End-to-end reconciliation behavior against in-memory collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{Harness, CASHIER_ROLE, COMPANY_ROLE};
use stockline_core::{InventoryMovement, NewMovement, Pagination, Product, TenantIds};
use chrono::Timelike;
use stockline_db::{Cache, MovementStore, ProductStore, MOVEMENT_NAMESPACE, PRODUCT_NAMESPACE, TOMBSTONE};
use stockline_engine::{CallerContext, EngineError, EngineSettings, ErrorKind};
use tokio::time::Instant;
use uuid::Uuid;

fn order(h: &Harness, product_id: Uuid, quantity: i64) -> NewMovement {
    NewMovement::new(product_id, quantity)
        .with_branch(h.branch)
        .with_store(h.store)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_create_update_delete_round_trip_restores_stock() {
    let h = Harness::new();
    let product = h.seed_product(100).await;
    let ctx = h.company_ctx();

    let sale = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -30))
        .await
        .unwrap();
    assert_eq!(h.stock(product.product_id).await, 70);

    let edited = h
        .engine
        .update_movement(&ctx, sale.inventory_id, -50)
        .await
        .unwrap();
    assert_eq!(edited.quantity, -50);
    assert_eq!(h.stock(product.product_id).await, 50);

    h.engine.delete_movement(&ctx, sale.inventory_id).await.unwrap();
    assert_eq!(h.stock(product.product_id).await, 100);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_oversized_decrease_is_rejected_without_a_ledger_row() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -20))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::InsufficientStock {
            available: 10,
            requested: 20
        }
    );
    assert_eq!(h.stock(product.product_id).await, 10);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_decrease_to_exactly_zero_is_allowed() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    h.engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -10))
        .await
        .unwrap();
    assert_eq!(h.stock(product.product_id).await, 0);
}

#[tokio::test]
async fn test_edit_that_would_go_negative_cannot_reverse() {
    let h = Harness::new();
    let product = h.seed_product(100).await;
    let ctx = h.company_ctx();

    let restock = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 50))
        .await
        .unwrap();
    h.engine
        .create_movement(&ctx, order(&h, product.product_id, -120))
        .await
        .unwrap();
    assert_eq!(h.stock(product.product_id).await, 30);

    // 30 - 50 - 40 = -60
    let err = h
        .engine
        .update_movement(&ctx, restock.inventory_id, -40)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotReverse);
    assert_eq!(h.stock(product.product_id).await, 30);

    let unchanged = h.movements.inner.get(restock.inventory_id).await.unwrap().unwrap();
    assert_eq!(unchanged.quantity, 50);
}

#[tokio::test]
async fn test_deleting_a_consumed_restock_cannot_reverse() {
    let h = Harness::new();
    let product = h.seed_product(0).await;
    let ctx = h.company_ctx();

    let restock = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 20))
        .await
        .unwrap();
    h.engine
        .create_movement(&ctx, order(&h, product.product_id, -15))
        .await
        .unwrap();

    let err = h
        .engine
        .delete_movement(&ctx, restock.inventory_id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::CannotReverse {
            stock: 5,
            would_be: -15
        }
    );
    assert_eq!(h.stock(product.product_id).await, 5);
    assert_eq!(h.live_movements(product.product_id), 2);
}

#[tokio::test]
async fn test_deleting_a_decrease_adds_stock_back() {
    let h = Harness::new();
    let product = h.seed_product(40).await;
    let ctx = h.company_ctx();

    let sale = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -25))
        .await
        .unwrap();
    h.engine.delete_movement(&ctx, sale.inventory_id).await.unwrap();

    assert_eq!(h.stock(product.product_id).await, 40);
}

#[tokio::test]
async fn test_edit_equals_direct_create() {
    let edited = Harness::new();
    let product = edited.seed_product(60).await;
    let ctx = edited.company_ctx();
    let m = edited
        .engine
        .create_movement(&ctx, order(&edited, product.product_id, 12))
        .await
        .unwrap();
    edited.engine.update_movement(&ctx, m.inventory_id, -7).await.unwrap();

    let direct = Harness::new();
    let other = direct.seed_product(60).await;
    direct
        .engine
        .create_movement(&direct.company_ctx(), order(&direct, other.product_id, -7))
        .await
        .unwrap();

    assert_eq!(
        edited.stock(product.product_id).await,
        direct.stock(other.product_id).await
    );
}

// =============================================================================
// Scope and Authorization
// =============================================================================

#[tokio::test]
async fn test_company_caller_must_name_a_branch() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    let err = h
        .engine
        .create_movement(&h.company_ctx(), NewMovement::new(product.product_id, 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_branch_caller_inherits_branch_and_stamps_audit_fields() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.branch_ctx();

    // a branch id in the request is ignored in favour of the token's
    let request = NewMovement::new(product.product_id, 5)
        .with_branch(Uuid::new_v4())
        .with_store(h.store);
    let created = h.engine.create_movement(&ctx, request).await.unwrap();

    assert_eq!(created.branch_id, Some(h.branch));
    assert_eq!(created.store_id, Some(h.store));
    assert_eq!(created.company_id, h.company);
    assert_eq!(created.created_by, ctx.claims.user_id);
    assert_eq!(created.updated_by, ctx.claims.user_id);
    assert!(!created.inventory_id.is_nil());
}

#[tokio::test]
async fn test_branch_caller_needs_a_store() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    let err = h
        .engine
        .create_movement(&h.branch_ctx(), NewMovement::new(product.product_id, 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_store_role_cannot_mutate() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let sale = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -1))
        .await
        .unwrap();
    let ctx = h.store_ctx();

    let create = h
        .engine
        .create_movement(&ctx, NewMovement::new(product.product_id, 5))
        .await
        .unwrap_err();
    let update = h
        .engine
        .update_movement(&ctx, sale.inventory_id, -2)
        .await
        .unwrap_err();
    let delete = h
        .engine
        .delete_movement(&ctx, sale.inventory_id)
        .await
        .unwrap_err();

    for err in [create, update, delete] {
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
    assert_eq!(h.stock(product.product_id).await, 9);
}

#[tokio::test]
async fn test_store_role_reads_only_its_store() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.company_ctx();

    let mine = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 1))
        .await
        .unwrap();
    let elsewhere = h
        .engine
        .create_movement(
            &ctx,
            NewMovement::new(product.product_id, 1)
                .with_branch(h.branch)
                .with_store(Uuid::new_v4()),
        )
        .await
        .unwrap();

    let store = h.store_ctx();
    assert_eq!(
        h.engine.read_movement(&store, mine.inventory_id).await.unwrap(),
        mine
    );
    let err = h
        .engine
        .read_movement(&store, elsewhere.inventory_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let page = h
        .engine
        .list_movements(&store, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total_records, 1);
    assert_eq!(page.records[0].inventory_id, mine.inventory_id);
}

#[tokio::test]
async fn test_other_branch_gets_permission_denied_not_not_found() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let sale = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -1))
        .await
        .unwrap();

    let outsider = h.ctx(
        common::BRANCH_ROLE,
        TenantIds::company(h.company).with_branch(Uuid::new_v4()),
    );

    let update = h
        .engine
        .update_movement(&outsider, sale.inventory_id, -2)
        .await
        .unwrap_err();
    let delete = h
        .engine
        .delete_movement(&outsider, sale.inventory_id)
        .await
        .unwrap_err();
    let read = h
        .engine
        .read_movement(&outsider, sale.inventory_id)
        .await
        .unwrap_err();

    for err in [update, delete, read] {
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
    assert_eq!(h.stock(product.product_id).await, 9);

    let missing = h
        .engine
        .update_movement(&outsider, Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_product_of_another_company_is_out_of_scope() {
    let h = Harness::new();
    let foreign = h
        .seed_product_in(
            TenantIds::company(Uuid::new_v4()).with_branch(h.branch),
            10,
        )
        .await;

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, foreign.product_id, 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(h.live_movements(foreign.product_id), 0);

    let err = h
        .engine
        .read_product_stock(&h.company_ctx(), foreign.product_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let h = Harness::new();

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, Uuid::new_v4(), 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_unrecognized_role_is_denied() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    for role in [CASHIER_ROLE, "role-that-does-not-exist"] {
        let ctx = h.ctx(role, h.home());
        let err = h
            .engine
            .create_movement(&ctx, order(&h, product.product_id, 1))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::PermissionDenied("invalid role".to_string()));

        let err = h
            .engine
            .list_movements(&ctx, Pagination::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_list_pages_within_scope() {
    let h = Harness::new();
    let product = h.seed_product(0).await;
    let ctx = h.company_ctx();

    for _ in 0..5 {
        h.engine
            .create_movement(&ctx, order(&h, product.product_id, 1))
            .await
            .unwrap();
    }

    let page = h
        .engine
        .list_movements(&h.branch_ctx(), Pagination::new(2, 3))
        .await
        .unwrap();
    assert_eq!(page.total_records, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.current_page, 3);
    assert_eq!(page.records.len(), 1);

    let elsewhere = h.ctx(
        common::BRANCH_ROLE,
        TenantIds::company(h.company).with_branch(Uuid::new_v4()),
    );
    let page = h
        .engine
        .list_movements(&elsewhere, Pagination::new(2, 1))
        .await
        .unwrap();
    assert_eq!(page.total_records, 0);
    assert_eq!(page.total_pages, 0);
}

#[tokio::test]
async fn test_read_product_stock_follows_writes() {
    let h = Harness::new();
    let product = h.seed_product(30).await;

    let before = h
        .engine
        .read_product_stock(&h.store_ctx(), product.product_id)
        .await
        .unwrap();
    assert_eq!(before.stock_quantity, 30);

    h.engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -4))
        .await
        .unwrap();

    let after = h
        .engine
        .read_product_stock(&h.store_ctx(), product.product_id)
        .await
        .unwrap();
    assert_eq!(after.stock_quantity, 26);
}

#[tokio::test]
async fn test_sale_down_to_reorder_level_flags_the_product() {
    let h = Harness::new();
    // seeded with a reorder level of 10
    let product = h.seed_product(15).await;
    let ctx = h.company_ctx();
    assert!(!product.needs_reorder());

    h.engine
        .create_movement(&ctx, order(&h, product.product_id, -5))
        .await
        .unwrap();

    let after = h
        .engine
        .read_product_stock(&ctx, product.product_id)
        .await
        .unwrap();
    assert_eq!(after.stock_quantity, 10);
    assert!(after.needs_reorder());
}

// =============================================================================
// Cache Coherence
// =============================================================================

fn cached<T: serde::de::DeserializeOwned>(h: &Harness, namespace: &str, id: Uuid) -> Option<T> {
    h.cache
        .peek(&format!("{namespace}:{id}"))
        .filter(|raw| raw != TOMBSTONE)
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

#[tokio::test]
async fn test_cache_matches_store_after_every_write() {
    let h = Harness::new();
    let product = h.seed_product(100).await;
    let ctx = h.company_ctx();

    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -30))
        .await
        .unwrap();
    let entry: InventoryMovement = cached(&h, MOVEMENT_NAMESPACE, m.inventory_id).unwrap();
    assert_eq!(entry.quantity, -30);
    let entry: Product = cached(&h, PRODUCT_NAMESPACE, product.product_id).unwrap();
    assert_eq!(entry.stock_quantity, 70);

    h.engine.update_movement(&ctx, m.inventory_id, -50).await.unwrap();
    let entry: InventoryMovement = cached(&h, MOVEMENT_NAMESPACE, m.inventory_id).unwrap();
    assert_eq!(entry.quantity, -50);
    let entry: Product = cached(&h, PRODUCT_NAMESPACE, product.product_id).unwrap();
    assert_eq!(entry.stock_quantity, 50);

    h.engine.delete_movement(&ctx, m.inventory_id).await.unwrap();
    assert!(cached::<InventoryMovement>(&h, MOVEMENT_NAMESPACE, m.inventory_id).is_none());
    let entry: Product = cached(&h, PRODUCT_NAMESPACE, product.product_id).unwrap();
    assert_eq!(entry.stock_quantity, 100);
}

#[tokio::test]
async fn test_cached_entries_equal_stored_rows() {
    let h = Harness::new();
    let product = h.seed_product(40).await;
    let ctx = h.company_ctx();

    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 7))
        .await
        .unwrap();
    let edited = h.engine.update_movement(&ctx, m.inventory_id, 9).await.unwrap();

    for at in [m.date, m.created_at, edited.updated_at] {
        assert_eq!(at.nanosecond() % 1_000, 0);
    }
    let stored = h.movements.inner.get(m.inventory_id).await.unwrap().unwrap();
    assert_eq!(stored, edited);
    let entry: InventoryMovement = cached(&h, MOVEMENT_NAMESPACE, m.inventory_id).unwrap();
    assert_eq!(entry, stored);

    let entry: Product = cached(&h, PRODUCT_NAMESPACE, product.product_id).unwrap();
    assert_eq!(entry.updated_at.nanosecond() % 1_000, 0);
    assert_eq!(entry, h.products.inner.get(product.product_id).await.unwrap().unwrap());
}

#[tokio::test]
async fn test_miss_racing_a_delete_does_not_resurrect_the_row() {
    let h = Harness::new();
    let product = h.seed_product(30).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 5))
        .await
        .unwrap();
    h.cache
        .del(&format!("{MOVEMENT_NAMESPACE}:{}", m.inventory_id))
        .await
        .unwrap();

    // the miss loads the row, then the delete commits before the fill
    let engine = h.engine.clone();
    let deleter = ctx.clone();
    let id = m.inventory_id;
    h.movements.after_next_get(move || async move {
        engine.delete_movement(&deleter, id).await.unwrap();
    });
    let _ = h.engine.read_movement(&ctx, m.inventory_id).await;

    assert!(cached::<InventoryMovement>(&h, MOVEMENT_NAMESPACE, m.inventory_id).is_none());
    let err = h.engine.read_movement(&ctx, m.inventory_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.stock(product.product_id).await, 30);
}

#[tokio::test]
async fn test_stale_product_cache_never_feeds_arithmetic() {
    let h = Harness::new();
    let product = h.seed_product(100).await;

    let stale = Product {
        stock_quantity: 5,
        ..product.clone()
    };
    h.cache
        .set(
            &format!("{PRODUCT_NAMESPACE}:{}", product.product_id),
            &serde_json::to_string(&stale).unwrap(),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    // the cache claims 5 on hand; the store has 100
    h.engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -50))
        .await
        .unwrap();
    assert_eq!(h.stock(product.product_id).await, 50);
}

#[tokio::test]
async fn test_cache_outage_never_fails_a_write() {
    let h = Harness::new();
    let product = h.seed_product(20).await;
    let ctx = h.company_ctx();
    h.cache.fail_reads(true);
    h.cache.fail_writes(true);

    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -5))
        .await
        .unwrap();
    h.engine.update_movement(&ctx, m.inventory_id, -8).await.unwrap();

    assert_eq!(h.stock(product.product_id).await, 12);
    assert_eq!(
        h.engine.read_movement(&ctx, m.inventory_id).await.unwrap().quantity,
        -8
    );
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn test_failed_stock_write_rolls_back_created_row() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.products.update.fail_always();

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 3))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.stock(product.product_id).await, 10);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_failed_ledger_rollback_is_inconsistent() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.products.update.fail_always();
    h.movements.delete.fail_always();

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 3))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Inconsistent);
    assert_eq!(h.live_movements(product.product_id), 1);
}

#[tokio::test]
async fn test_failed_stock_write_restores_edited_row() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -2))
        .await
        .unwrap();
    h.products.update.fail_always();

    let err = h
        .engine
        .update_movement(&ctx, m.inventory_id, -6)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.stock(product.product_id).await, 8);
    let row = h.movements.inner.get(m.inventory_id).await.unwrap().unwrap();
    assert_eq!(row.quantity, m.quantity);
    assert_eq!(row.updated_at, m.updated_at);
    assert_eq!(row.updated_by, m.updated_by);
    assert_eq!(
        h.engine.read_movement(&ctx, m.inventory_id).await.unwrap().quantity,
        -2
    );
}

#[tokio::test]
async fn test_failed_edit_restore_is_inconsistent() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, -2))
        .await
        .unwrap();
    h.products.update.fail_always();
    // the edit goes through, the restore does not
    h.movements.update.fail_after(1);

    let err = h
        .engine
        .update_movement(&ctx, m.inventory_id, -6)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
}

#[tokio::test]
async fn test_failed_row_delete_restores_stock() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 4))
        .await
        .unwrap();
    h.movements.delete.fail_always();

    let err = h.engine.delete_movement(&ctx, m.inventory_id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.stock(product.product_id).await, 14);
    assert_eq!(h.live_movements(product.product_id), 1);
}

#[tokio::test]
async fn test_failed_stock_restore_after_delete_is_inconsistent() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 4))
        .await
        .unwrap();
    h.movements.delete.fail_always();
    // the reversal goes through, the restore does not
    h.products.update.fail_after(1);

    let err = h.engine.delete_movement(&ctx, m.inventory_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
}

#[tokio::test]
async fn test_failed_ledger_insert_changes_nothing() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.movements.insert.fail_always();

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.stock(product.product_id).await, 10);
}

// =============================================================================
// Outside Writers
// =============================================================================

#[tokio::test]
async fn test_conflicting_outside_write_is_retried() {
    let h = Harness::new();
    let product = h.seed_product(100).await;
    h.products.race_outside_writer(-5);

    h.engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 10))
        .await
        .unwrap();
    assert_eq!(h.stock(product.product_id).await, 105);
}

#[tokio::test]
async fn test_outside_write_that_breaks_the_guard_rolls_back() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.products.race_outside_writer(-8);

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, -5))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::InsufficientStock {
            available: 2,
            requested: 5
        }
    );
    assert_eq!(h.stock(product.product_id).await, 2);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_endless_conflicts_give_up() {
    let h = Harness::with_settings(EngineSettings {
        max_stock_retries: 2,
        ..EngineSettings::default()
    });
    let product = h.seed_product(10).await;
    h.products.always_conflict.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.live_movements(product.product_id), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_edit_racing_another_instance_keeps_stock_in_step() {
    let h = Harness::new();
    let other = h.second_engine();
    let product = h.seed_product(100).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 10))
        .await
        .unwrap();

    // the other instance edits the row between our read and our write
    let racer = ctx.clone();
    let id = m.inventory_id;
    h.movements.before_next_update(move || async move {
        other.update_movement(&racer, id, 30).await.unwrap();
    });

    let err = h
        .engine
        .update_movement(&ctx, m.inventory_id, 20)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.stock(product.product_id).await, 130);
    assert_eq!(h.stock(product.product_id).await, 100 + h.ledger_sum(product.product_id));
    assert_eq!(
        h.engine.read_movement(&ctx, m.inventory_id).await.unwrap().quantity,
        30
    );
}

#[tokio::test]
async fn test_edit_racing_a_delete_on_another_instance() {
    let h = Harness::new();
    let other = h.second_engine();
    let product = h.seed_product(100).await;
    let ctx = h.company_ctx();
    let m = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 10))
        .await
        .unwrap();

    let racer = ctx.clone();
    let id = m.inventory_id;
    h.movements.before_next_update(move || async move {
        other.delete_movement(&racer, id).await.unwrap();
    });

    let err = h
        .engine
        .update_movement(&ctx, m.inventory_id, 20)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.stock(product.product_id).await, 100);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_movements_all_land() {
    let h = Harness::new();
    let product = h.seed_product(1_000).await;

    let quantities: Vec<i64> = (0..40).map(|i| if i % 3 == 0 { -7 } else { 5 }).collect();
    let expected = 1_000 + quantities.iter().sum::<i64>();

    let tasks: Vec<_> = quantities
        .iter()
        .map(|&q| {
            let engine = h.engine.clone();
            let ctx = h.company_ctx();
            let request = order(&h, product.product_id, q);
            tokio::spawn(async move { engine.create_movement(&ctx, request).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.stock(product.product_id).await, expected);
    assert_eq!(h.ledger_sum(product.product_id), expected - 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decreases_never_oversell() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let engine = h.engine.clone();
            let ctx = h.company_ctx();
            let request = order(&h, product.product_id, -1);
            tokio::spawn(async move { engine.create_movement(&ctx, request).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::InsufficientStock),
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(h.stock(product.product_id).await, 0);
    assert_eq!(h.live_movements(product.product_id), 10);
}

// =============================================================================
// Role Service and Deadlines
// =============================================================================

#[tokio::test]
async fn test_role_service_down_is_unavailable_without_writes() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.directory.set_offline(true);

    let err = h
        .engine
        .create_movement(&h.company_ctx(), order(&h, product.product_id, 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.live_movements(product.product_id), 0);
    assert_eq!(h.stock(product.product_id).await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_slow_role_service_hits_the_deadline() {
    let h = Harness::new();
    let product = h.seed_product(10).await;
    h.directory.set_latency(Some(Duration::from_secs(30)));

    let ctx = CallerContext::with_timeout(h.company_ctx().claims, Duration::from_secs(1));
    let err = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.live_movements(product.product_id), 0);
}

#[tokio::test]
async fn test_expired_deadline_writes_nothing() {
    let h = Harness::new();
    let product = h.seed_product(10).await;

    let ctx = CallerContext::new(h.ctx(COMPANY_ROLE, h.home()).claims, Instant::now());
    let err = h
        .engine
        .create_movement(&ctx, order(&h, product.product_id, 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalUnavailable);
    assert_eq!(h.live_movements(product.product_id), 0);
    assert_eq!(h.directory.lookups(), 1);
}
