//! Logging setup.

use tracing_subscriber::EnvFilter;

/// The filter used when `RUST_LOG` isn’t set.
///
/// This shows the check headers of the case log and every change sent to a
/// primary but not the detail bodies.
pub const DEFAULT_FILTER: &str = "zonestress=info";

/// Sets up logging of scenario events.
///
/// Use the RUST_LOG environment variable to override [`DEFAULT_FILTER`].
///
/// E.g. to include the detail bodies of the case log and the commands run
/// against the servers:
///   RUST_LOG=zonestress=DEBUG
///
/// Or to see every decision of the random update generator:
///   RUST_LOG=zonestress::mutate=TRACE
///
/// Only the first call has any effect.
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER)
}

/// Sets up logging with a different default filter.
///
/// The filter is given in the same syntax as RUST_LOG, which still takes
/// precedence.
pub fn init_logging_with(default: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .without_time()
        .with_test_writer()
        .try_init()
        .ok();
}
