//! Tracing subscriber setup.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Filter directives, overrides `logging.level` | unset |
//! | `NOTIFY_LOGGING__LEVEL` | Default filter directive | `info` |
//! | `NOTIFY_LOGGING__FORMAT` | `pretty` or `json` | `pretty` |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry-specific error type
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Build the filter: `RUST_LOG` when set, otherwise the configured level
pub fn build_filter(config: &LoggingConfig) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::InvalidFilter {
        directive: config.level.clone(),
        message: e.to_string(),
    })
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_telemetry(config: &LoggingConfig) -> TelemetryResult<()> {
    let env_filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(format = ?config.format, "Tracing initialized");
    Ok(())
}
