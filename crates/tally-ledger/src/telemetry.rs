//! # Tracing Bootstrap
//!
//! Installs the fmt subscriber used by binaries embedding the ledger.

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - overrides `default_filter`
/// - `RUST_LOG=tally_ledger=trace` - trace for the engine only
///
/// Returns `false` if a global subscriber was already installed, so
/// calling it twice (or from tests) is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
