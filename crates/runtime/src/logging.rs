//! Logging setup
//!
//! The runtime reports through `tracing`; nothing is printed unless the host
//! installs a subscriber. `init` installs the usual one: fmt output on
//! stderr, filtered by `UAL_LOG` (default `warn`).

use crate::config::{DEFAULT_LOG_FILTER, RuntimeConfig};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOG_INIT: Once = Once::new();

/// Install a stderr subscriber filtered by `UAL_LOG`. Idempotent.
pub fn init() {
    init_with_filter(&RuntimeConfig::from_env().log_filter);
}

/// Install a stderr subscriber with explicit filter directives.
///
/// Invalid directives fall back to the default filter. If the host already
/// installed a global subscriber, that one is kept.
pub fn init_with_filter(directives: &str) {
    LOG_INIT.call_once(|| {
        let filter =
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
