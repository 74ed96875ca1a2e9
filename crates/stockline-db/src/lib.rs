//! # stockline-db: Storage Layer for Stockline
//!
//! Store of record (PostgreSQL via sqlx) and the cache-aside layer (Redis) in
//! front of it, for inventory movements and products.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Data Flow                              │
//! │                                                                         │
//! │  ReconciliationEngine (stockline-engine)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockline-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  StockLedger  │    │   Product     │    │  CacheAside  │  │   │
//! │  │   │  (ledger.rs)  │    │   Projector   │───►│  Redis /     │  │   │
//! │  │   │               │───►│ (projector.rs)│    │  in-memory   │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │ MovementStore      │ ProductStore                  │   │
//! │  │           ▼                    ▼                               │   │
//! │  │   PgMovementStore      PgProductStore      (InMemory* in tests)│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL  (schema: migrations/postgres)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`store`] - Store-of-record traits and tenant scope filters
//! - [`repository`] - PostgreSQL implementations of the store traits
//! - [`memory`] - In-memory implementations of the store traits
//! - [`cache`] - Cache trait, Redis and in-memory caches, cache-aside helper
//! - [`ledger`] - Cached Stock Ledger Store
//! - [`projector`] - Cached Product Stock Projector
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockline_db::{CacheSettings, Database, DbConfig, RedisCache, StockLedger};
//!
//! let db = Database::new(DbConfig::new(database_url)).await?;
//! let cache = Arc::new(RedisCache::connect(&redis_url).await?);
//! let ledger = StockLedger::new(Arc::new(db.movements()), cache, CacheSettings::default());
//! let movement = ledger.read_by_id(inventory_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod projector;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{
    Cache, CacheAside, CacheError, CacheResult, CacheSettings, InMemoryCache, RedisCache, TOMBSTONE,
};
pub use error::{DbError, DbResult};
pub use ledger::{StockLedger, MOVEMENT_NAMESPACE};
pub use memory::{InMemoryMovementStore, InMemoryProductStore};
pub use pool::{Database, DbConfig};
pub use projector::{ProductProjector, PRODUCT_NAMESPACE};
pub use repository::{PgMovementStore, PgProductStore};
pub use store::{MovementStore, ProductStore, ScopeFilter};
