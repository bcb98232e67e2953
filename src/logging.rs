//! `tracing` subscriber setup for the `convostate` binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Honors `RUST_LOG`, falling back to `info`. With `json = true` events are
/// emitted as one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // try_init: a second call (e.g. from tests) is a no-op rather than a panic.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
