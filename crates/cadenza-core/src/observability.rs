//! Observability infrastructure: structured logging with consistent spans.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `cadenza_pipeline=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for a pipeline step with standard fields.
///
/// # Example
///
/// ```rust
/// use cadenza_core::observability::step_span;
///
/// let span = step_span("build_dimensions", "run_abc123");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn step_span(step: &str, run_id: &str) -> Span {
    tracing::info_span!("pipeline", step = step, run_id = run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn step_span_creates_span() {
        let span = step_span("build_facts", "run_123");
        let _guard = span.enter();
        tracing::info!("message in span");
    }
}
