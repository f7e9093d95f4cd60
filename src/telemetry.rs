//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

const BOOTSTRAP_LEVEL: &str = "info";

fn env_filter_or(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Run `f` under a temporary stderr text subscriber, for work that happens
/// before the configuration (and so the real subscriber) is known.
pub fn bootstrap<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter_or(BOOTSTRAP_LEVEL))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

/// Install the global subscriber, writing to stderr. `RUST_LOG` takes
/// precedence over the configured level.
pub fn init(config: &LoggingConfig) {
    let filter = env_filter_or(&config.level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    // A subscriber may already be installed (tests, embedding).
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already set");
    }
}
