//! Structured logging setup for hosts embedding the engine.

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for structured logging.
///
/// `log_level` is the configured base level (see
/// [`EngineConfig::log_level`](crate::config::EngineConfig)); sqlx query
/// noise is suppressed to `warn` regardless.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Overrides the configured level
/// - `RUST_LOG=fabrica=trace` - Show trace for fabrica crates only
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},sqlx=warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
