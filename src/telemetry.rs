// Tracing subscriber setup, installed once by the binary

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is not provided.
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for command output.
pub fn init_tracing(format: LogFormat) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| TelemetryError(e.to_string()))
}
