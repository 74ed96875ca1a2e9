//! # stockline-core: Pure Domain Logic for Stockline
//!
//! This crate holds the rules of the inventory ledger as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockline-engine (orchestration)                │   │
//! │  │   resolve role ──► lock product ──► reconcile ──► persist       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockline-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  policy   │  │ reconcile │  │   error   │  │   │
//! │  │   │ Movement  │  │ RoleScope │  │ undo/redo │  │ CoreError │  │   │
//! │  │   │ Product   │  │ scope chk │  │  guards   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockline-db (storage layer)                    │   │
//! │  │          PostgreSQL store of record + Redis cache-aside         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (InventoryMovement, Product, TenantIds, Page)
//! - [`policy`] - Role policy predicates and movement scope resolution
//! - [`reconcile`] - Stock arithmetic for create / update / delete
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::reconcile::{stock_after_create, stock_after_delete, stock_after_update};
//!
//! let stock = stock_after_create(100, -30).unwrap();
//! assert_eq!(stock, 70);
//!
//! // Edit the movement from -30 to -50: undo -30, apply -50
//! let stock = stock_after_update(stock, -30, -50).unwrap();
//! assert_eq!(stock, 50);
//!
//! // Delete it: reverse -50 entirely
//! let stock = stock_after_delete(stock, -50).unwrap();
//! assert_eq!(stock, 100);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod policy;
pub mod reconcile;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use policy::{RolePolicy, RoleScope};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Reference time-to-live for cached movement and product rows (7 days).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
