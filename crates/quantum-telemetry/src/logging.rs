//! Structured logging.
//!
//! Logs go through a `tracing-subscriber` registry with an `EnvFilter`.
//! Output is either human readable (development) or JSON with consistent
//! fields that Loki can parse:
//! - `timestamp`: ISO 8601 timestamp
//! - `level`: Log level (trace, debug, info, warn, error)
//! - `target`: Module path of the emitting code
//! - `fields`: Structured context (`peer`, `height`, `mode`, ...)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle
#[derive(Debug)]
pub struct StructuredLogger {
    service_name: String,
    json: bool,
}

impl StructuredLogger {
    /// Service name the logger was initialised for.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Whether log lines are emitted as JSON.
    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// Install the global tracing subscriber.
///
/// Fails with [`TelemetryError::Config`] if `log_level` is not a valid
/// filter directive and with [`TelemetryError::LoggingInit`] if a global
/// subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let env_filter = build_filter(config)?;

    let output = if !config.console_output {
        None
    } else if config.json_logs {
        // JSON output for containers/production
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        // Pretty output for development
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(output)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.full_service_name(),
        network = %config.network,
        json_logs = config.json_logs,
        "Structured logging initialized"
    );

    Ok(StructuredLogger {
        service_name: config.full_service_name(),
        json: config.json_logs,
    })
}

/// Filter from `log_level`, which [`TelemetryConfig::from_env`] fills from `RUST_LOG`.
fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level {:?}: {e}", config.log_level)))
}

/// Install a test-friendly subscriber that writes through the libtest capture.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Log a peer-related event with standard fields.
#[macro_export]
macro_rules! log_peer_event {
    ($level:ident, $subsystem:expr, $msg:expr, $peer_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            peer = %$peer_id,
            $($($field)*,)?
            $msg
        )
    };
}
