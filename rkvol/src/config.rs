//! RKVOL logging configuration.
//!
//! Environment variables:
//! - `RKVOL_LOG_FORMAT`: set to `json` to emit one JSON object per event,
//!   anything else for human-readable output. Defaults to human-readable.
//! - `RUST_LOG`: standard `tracing` filter directives. Defaults to `info`.

use std::sync::LazyLock;

use tracing_subscriber::EnvFilter;

/// Global logging configuration for RKVOL.
pub struct LogConfig {
    /// Output format: `true` = JSON lines, `false` = human-readable.
    pub json: bool,
}

/// Globally initialized logging configuration, read from environment variables at first access.
pub static LOG_CONFIG: LazyLock<LogConfig> = LazyLock::new(|| LogConfig {
    json: std::env::var("RKVOL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false),
});

/// Install the global `tracing` subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if LOG_CONFIG.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
