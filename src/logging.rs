//! Diagnostic logging.
//!
//! Logs go to **stderr** so stdout stays parseable. Environment:
//!   LENS_LOG    - env filter directives (default: "warn")
//!   LOG_FORMAT  - "text" (default) or "json"
//!   LOG_ANSI    - "true"/"false" override ANSI colors

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "LENS_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let registry = tracing_subscriber::registry().with(env_filter());

    let result = if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).try_init()
    };
    // Already installed (tests, embedding hosts).
    let _ = result;
}
