//! Logging setup for the editor binary.
//!
//! Log output goes to stderr so command output on stdout stays scriptable.

use tracing_subscriber::prelude::*;

/// Initialize the tracing subscriber
///
/// If RUST_LOG is not set, debug builds default to `debug` and release builds to `info`.
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let defaulted = std::env::var("RUST_LOG").is_err();
    if defaulted {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    if defaulted {
        tracing::info!(
            "RUST_LOG set to default: {}",
            std::env::var("RUST_LOG").unwrap_or_default()
        );
    }
    tracing::info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}
