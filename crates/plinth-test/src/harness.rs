//! Test harness helpers.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test writer.
///
/// Honors `RUST_LOG`, defaulting to `debug` for the plinth crates. Safe to
/// call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,plinth_installer=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
