//! Logging setup for the binary
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! application's call.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `"info"`,
/// `"astrosense_sync=debug"`) is used as the filter.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // Keeps the first subscriber if one is already installed
    let _ = subscriber.try_init();
}
