//! Tracing and diagnostic-report initialization for binaries and tests.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber: env-filtered fmt output plus span
/// capture for miette reports.
///
/// Filter defaults to `info` for this crate and `warn` elsewhere; override
/// with `RUST_LOG`. Calling twice is an error from the subscriber registry,
/// so binaries call this exactly once at startup.
pub fn init() {
    let fmt_layer = fmt::layer().with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,stageloop=info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Same as [`init`] but safe to call from multiple tests; the first caller
/// wins.
pub fn init_for_tests() {
    let fmt_layer = fmt::layer().with_target(false).with_test_writer();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,stageloop=debug"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();
}
