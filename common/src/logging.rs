//! Structured logging initialization
//!
//! Provides consistent logging initialization across the bootstrap binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Initialize structured logging for a component.
///
/// `RUST_LOG` overrides the default `info` level.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("pg-bootstrap");
/// info!("Starting up...");
/// ```
pub fn init_logging(component: &str) -> LogGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let format = fmt::layer().with_target(false);

    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init();

    tracing::debug!(component, "Logging initialized");

    LogGuard
}
