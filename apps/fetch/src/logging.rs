//! Tracing subscriber setup.

use crate::config::{LogConfig, LogFormat};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Subscriber for events emitted while the configuration is resolved.
///
/// Active on the current thread until the guard drops. Filters with
/// `RUST_LOG`, or `info` when unset.
pub fn bootstrap() -> DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing::subscriber::set_default(tracing_subscriber::fmt().with_env_filter(filter).finish())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
