//! Shared helpers for integration tests.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a test. Later calls do nothing.
///
/// `RUST_LOG` overrides the default `agent_link=debug` filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_link=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
