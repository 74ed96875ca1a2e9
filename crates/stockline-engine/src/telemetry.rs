//! Tracing subscriber setup.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show store and cache calls
//! - `RUST_LOG=stockline_engine=trace` - Trace the engine only
//! - Default: `info,sqlx=warn`

use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    // a subscriber may already be installed by an embedding binary or test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
