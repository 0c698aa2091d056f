//! Tracing initialization.
//!
//! Events go to stderr so piped command output stays clean. `RUST_LOG`
//! controls the filter; the default shows `info` and up.

use tracing_subscriber::EnvFilter;

/// Install the global stderr subscriber. Call once, at the top of `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
