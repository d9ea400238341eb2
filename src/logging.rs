//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_directive` (e.g. `"polly_adapter=debug"`) when
/// `RUST_LOG` is unset or invalid. Calling this more than once is harmless.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
