//! Process logging setup
//!
//! Everything logs through the `log` facade (core modules use `tracing`, whose
//! events are forwarded as `log` records). Output goes to stderr so that stdout
//! stays reserved for stdio framing.

use env_logger::{ Builder, Env, Target };

/// Environment variable holding the filter, e.g. `MCP_LITE_LOG=debug`
pub const LOG_ENV: &str = "MCP_LITE_LOG";

/// Install the stderr logger with the filter from `MCP_LITE_LOG`, defaulting to `info`.
/// Repeated calls are no-ops.
pub fn init() {
    init_with_level("info");
}

/// Like [`init`], with an explicit default filter
pub fn init_with_level(default_filter: &str) {
    let _ = Builder::from_env(Env::default().filter_or(LOG_ENV, default_filter))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .try_init();
}
