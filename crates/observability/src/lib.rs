//! Process-wide logging setup for the event pipeline.
//!
//! Projection and sync emit structured `tracing` events (event ids, view
//! names, batch counts); this crate turns them into JSON log lines. Hosts
//! call [`init`] once at startup; `RUST_LOG` overrides the defaults.

use tracing_subscriber::EnvFilter;

/// Default directives: quiet dependencies, verbose pipeline.
///
/// Projection skips and sync retries are logged at debug level; without
/// these directives an operator chasing a stuck queue entry or an
/// unexpectedly idempotent projection would see nothing.
const DEFAULT_DIRECTIVES: &str =
    "info,retain_projector=debug,retain_ingest=debug,retain_client=debug";

/// Install the JSON log subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVES);
}

/// Install with explicit fallback directives (tests, one-off tools).
/// `RUST_LOG` still wins when set.
pub fn init_with_default(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_target(true)
        .try_init();
}
