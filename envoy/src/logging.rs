//! Diagnostic tracing setup

use tracing_subscriber::EnvFilter;

/// Filter variable for the front end's trace output
pub const LOG_ENV: &str = "ENVOY_LOG";

/// Install a stderr subscriber filtered by [`LOG_ENV`]
///
/// Falls back to `default_level` when the variable is unset or invalid.
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Install the front end's subscriber if diagnostic tracing is compiled in
pub fn init_front_end() {
    if cfg!(feature = "debug-trace") {
        init("debug");
    }
}
