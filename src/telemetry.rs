//! Tracing initialisation helpers.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber with `RUST_LOG`-style filtering.
///
/// Defaults to `info` for this crate when no filter is configured. Calling
/// it twice is harmless; the second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("papersmith=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
