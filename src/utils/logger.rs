use std::env;
use tracing_subscriber::EnvFilter;

/// Environment switch that turns on debug output without touching RUST_LOG.
pub const DEBUG_ENV: &str = "BRIDGE_PLUGIN_DEBUG";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` always wins. Otherwise we log at `info`, or `debug` when
/// `verbose` is set or [`DEBUG_ENV`] is present.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (tests) is harmless, keep the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose || env::var(DEBUG_ENV).is_ok() {
        "debug"
    } else {
        "info"
    }
}
