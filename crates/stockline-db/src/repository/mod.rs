//! # Repository Module
//!
//! PostgreSQL implementations of the store-of-record traits.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where Each Call Lands                                │
//! │                                                                         │
//! │  StockLedger / ProductProjector  (cache-aside, crate::ledger/projector)│
//! │       │                                                                 │
//! │       │  store.get(id) / store.update(row)                             │
//! │       ▼                                                                 │
//! │  MovementStore / ProductStore     (traits, crate::store)               │
//! │       │                                                                 │
//! │       ├── PgMovementStore / PgProductStore  (this module)              │
//! │       └── InMemory*Store                     (crate::memory, tests)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PgMovementStore`] - Inventory movement rows
//! - [`PgProductStore`] - Product rows with version compare-and-swap

pub mod movement;
pub mod product;

pub use movement::PgMovementStore;
pub use product::PgProductStore;
