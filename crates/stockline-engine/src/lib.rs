//! # stockline-engine: Inventory Reconciliation Service Layer
//!
//! Authorizes callers through the role service and keeps the inventory
//! movement ledger and product stock consistent with each other.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Request Path                                       │
//! │                                                                         │
//! │  RPC handler (CallerClaims + deadline)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                stockline-engine (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   AuthorizationResolver ──► RoleDirectory (gRPC / in-memory)   │   │
//! │  │          │                                                      │   │
//! │  │          ▼                                                      │   │
//! │  │   ReconciliationEngine ──► ProductLocks (per product)           │   │
//! │  │          │                                                      │   │
//! │  └──────────┼──────────────────────────────────────────────────────┘   │
//! │             ▼                                                           │
//! │  StockLedger + ProductProjector (stockline-db)                         │
//! │             │                                                           │
//! │             ▼                                                           │
//! │  EngineError ──► tonic::Status                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Engine error kinds and status mapping
//! - [`proto`] - Role service gRPC messages and client
//! - [`roles`] - Role directories and caller authorization
//! - [`locks`] - Per-product serialization
//! - [`engine`] - The reconciliation engine

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod proto;
pub mod roles;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, ServiceConfig};
pub use engine::{CallerContext, EngineSettings, ReconciliationEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use roles::{
    AuthorizationResolver, GrpcRoleDirectory, InMemoryRoleDirectory, ResolvedCaller, RoleDirectory,
    RoleLookupError,
};

use std::sync::Arc;

use stockline_db::{CacheError, Database, DbError, ProductProjector, RedisCache, StockLedger};
use tracing::info;

// =============================================================================
// Bootstrap
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Role service error: {0}")]
    Roles(#[from] RoleLookupError),
}

/// A wired engine plus the pool it runs on.
pub struct Service {
    pub engine: ReconciliationEngine,
    pub database: Database,
}

/// Connects PostgreSQL (running migrations), Redis and the role service, and
/// wires the engine.
///
/// ## Usage
/// ```rust,ignore
/// stockline_engine::telemetry::init_tracing();
/// let config = ServiceConfig::load()?;
/// let service = stockline_engine::connect(&config).await?;
/// let ctx = CallerContext::with_timeout(claims, config.request_timeout());
/// service.engine.create_movement(&ctx, request).await?;
/// ```
pub async fn connect(config: &ServiceConfig) -> Result<Service, BootstrapError> {
    let database = Database::new(config.db_config()).await?;
    let cache = Arc::new(RedisCache::connect(&config.redis_url).await?);
    let directory = GrpcRoleDirectory::connect_lazy(&config.role_service_url, config.request_timeout())?;

    let settings = config.cache_settings();
    let ledger = StockLedger::new(Arc::new(database.movements()), cache.clone(), settings.clone());
    let projector = ProductProjector::new(Arc::new(database.products()), cache, settings);
    let auth = AuthorizationResolver::new(Arc::new(directory), config.role_policy());

    info!(
        cache_ttl_secs = config.cache_ttl_secs,
        max_stock_retries = config.max_stock_retries,
        "Reconciliation engine ready"
    );

    Ok(Service {
        engine: ReconciliationEngine::new(ledger, projector, auth, config.engine_settings()),
        database,
    })
}
