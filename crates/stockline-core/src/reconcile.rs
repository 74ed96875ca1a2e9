//! # Stock Reconciliation Arithmetic
//!
//! Pure functions computing a product's next stock level when a movement is
//! created, edited or deleted.
//!
//! ## Undo-Then-Redo
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Editing a movement from -30 to -50                      │
//! │                                                                         │
//! │  stock = 70 (already includes the -30)                                 │
//! │       │                                                                 │
//! │       ▼  undo: prior decrease, add back |-30|                          │
//! │  undone = 100                                                          │
//! │       │                                                                 │
//! │       ▼  redo: apply -50                                               │
//! │  repaired = 50                                                         │
//! │                                                                         │
//! │  ❌ WRONG: 70 + (-50) = 20   (old effect counted twice)                │
//! │  ✅ RIGHT: 70 - (-30) + (-50) = 50                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function refuses to produce a negative committed stock level.

use crate::error::{CoreError, CoreResult};

/// Adds a signed delta, failing on overflow.
pub fn apply_delta(stock: i64, delta: i64) -> CoreResult<i64> {
    stock
        .checked_add(delta)
        .ok_or(CoreError::StockOverflow { stock, delta })
}

fn magnitude(stock: i64, quantity: i64) -> CoreResult<i64> {
    quantity.checked_abs().ok_or(CoreError::StockOverflow {
        stock,
        delta: quantity,
    })
}

/// Stock after booking a new movement.
///
/// ## Errors
/// `InsufficientStock` when the result would be negative.
pub fn stock_after_create(stock: i64, quantity: i64) -> CoreResult<i64> {
    let next = apply_delta(stock, quantity)?;

    if next < 0 {
        return Err(CoreError::InsufficientStock {
            available: stock,
            requested: magnitude(stock, quantity)?,
        });
    }

    Ok(next)
}

/// Removes a movement's historical effect from the current stock.
///
/// A positive movement was a prior increase and is subtracted; a negative one
/// was a prior decrease and its magnitude is added back. The result is an
/// intermediate value and may be negative.
pub fn undo_movement(stock: i64, prior_quantity: i64) -> CoreResult<i64> {
    if prior_quantity > 0 {
        stock
            .checked_sub(prior_quantity)
            .ok_or(CoreError::StockOverflow {
                stock,
                delta: -prior_quantity,
            })
    } else if prior_quantity < 0 {
        apply_delta(stock, magnitude(stock, prior_quantity)?)
    } else {
        Ok(stock)
    }
}

/// Stock after editing a movement from `prior_quantity` to `new_quantity`.
///
/// ## Errors
/// `CannotReverse` when the repaired stock would be negative.
pub fn stock_after_update(stock: i64, prior_quantity: i64, new_quantity: i64) -> CoreResult<i64> {
    let undone = undo_movement(stock, prior_quantity)?;
    let repaired = apply_delta(undone, new_quantity)?;

    if repaired < 0 {
        return Err(CoreError::CannotReverse {
            stock,
            would_be: repaired,
        });
    }

    Ok(repaired)
}

/// Stock after deleting a movement, i.e. fully reversing it.
///
/// ## Errors
/// `CannotReverse` when a positive movement is larger than the stock left.
pub fn stock_after_delete(stock: i64, prior_quantity: i64) -> CoreResult<i64> {
    let repaired = undo_movement(stock, prior_quantity)?;

    if repaired < 0 {
        return Err(CoreError::CannotReverse {
            stock,
            would_be: repaired,
        });
    }

    Ok(repaired)
}

// =============================================================================
// Unit Tests
// =============================================================================
