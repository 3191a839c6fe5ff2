//! Logging setup
//!
//! The library only emits `tracing` events: each tool invocation at debug
//! (`$ security …`, payloads redacted) and the captured output at trace
//! (`--> ` stdout, `--! ` stderr). Binaries and tests opt in to seeing them
//! with [`init`] or [`try_init`].

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive, e.g. `mellon_core=trace`
pub const LOG_ENV: &str = "MELLON_LOG";

/// Filter used when `MELLON_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr subscriber filtered by `MELLON_LOG`
///
/// Panics if a global subscriber is already set; use [`try_init`] where
/// that may happen.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Like [`init`], returning `false` instead of panicking when a subscriber exists
pub fn try_init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
