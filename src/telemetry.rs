//! Optional tracing bootstrap (SPEC_FULL.md §10.1). The library never
//! installs a global subscriber on its own — only a binary composing it
//! should decide that — but offers the same env-filter setup the sibling
//! report crates use so callers don't have to hand-roll it.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber driven by `RUST_LOG`,
/// falling back to `info` when unset. Call once, from `main`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
