//! # Header Exchange Configuration
//!
//! Tunables for the exchange client and server. Loaded from the
//! `[header_exchange]` table of the node TOML file, falling back to
//! [`ExchangeConfig::default`] for missing keys.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Protocol identifier negotiated on every exchange stream.
pub const DEFAULT_PROTOCOL_ID: &str = "/header-ex/v0.0.1";

/// Upper bound on `max_concurrent_streams`.
pub const MAX_CONCURRENT_STREAMS_LIMIT: usize = 65_536;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Header exchange configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Protocol identifier used for stream negotiation.
    pub protocol_id: String,

    /// Client deadline for a whole request (open, write, read all responses).
    pub request_timeout_ms: u64,

    /// Server deadline for reading the request off an inbound stream.
    pub read_timeout_ms: u64,

    /// Maximum inbound streams served at once. Extra streams are closed.
    pub max_concurrent_streams: usize,

    /// Upper bound on `amount` in a ranged request.
    pub max_headers_per_request: u64,

    /// Largest frame the codec accepts, in bytes.
    pub max_message_size: usize,

    /// How long `stop` waits for in-flight streams to drain.
    pub shutdown_grace_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            request_timeout_ms: 10_000,
            read_timeout_ms: 5_000,
            max_concurrent_streams: 64,
            max_headers_per_request: 512,
            max_message_size: 4 * 1024 * 1024,
            shutdown_grace_ms: 5_000,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    header_exchange: ExchangeConfig,
}

impl ExchangeConfig {
    /// Create a config for testing (short timeouts, small limits).
    pub fn for_testing() -> Self {
        Self {
            request_timeout_ms: 2_000,
            read_timeout_ms: 1_000,
            max_concurrent_streams: 8,
            max_headers_per_request: 64,
            max_message_size: 1024 * 1024,
            shutdown_grace_ms: 500,
            ..Self::default()
        }
    }

    /// Parse the `[header_exchange]` table of a TOML document and validate it.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.header_exchange.validate()?;
        Ok(file.header_exchange)
    }

    /// Reject values that would make the exchange unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_id.is_empty() {
            return Err(ConfigError::Invalid("protocol_id must not be empty".into()));
        }
        if self.request_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_streams must be non-zero".into(),
            ));
        }
        if self.max_concurrent_streams > MAX_CONCURRENT_STREAMS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_concurrent_streams {} exceeds {}",
                self.max_concurrent_streams, MAX_CONCURRENT_STREAMS_LIMIT
            )));
        }
        if self.max_headers_per_request == 0 {
            return Err(ConfigError::Invalid(
                "max_headers_per_request must be non-zero".into(),
            ));
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid(format!(
                "max_message_size {} is below the 1024 byte minimum",
                self.max_message_size
            )));
        }
        Ok(())
    }

    /// Client request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Server request read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Server drain deadline on stop.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExchangeConfig::default();
        assert_eq!(config.protocol_id, "/header-ex/v0.0.1");
        assert_eq!(config.max_concurrent_streams, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = ExchangeConfig::for_testing();
        assert!(config.validate().is_ok());
        assert!(config.request_timeout() < ExchangeConfig::default().request_timeout());
    }

    #[test]
    fn test_from_toml_partial_table() {
        let config = ExchangeConfig::from_toml_str(
            r#"
            [header_exchange]
            max_concurrent_streams = 4
            request_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_streams, 4);
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.protocol_id, DEFAULT_PROTOCOL_ID);
    }

    #[test]
    fn test_from_toml_missing_table_uses_defaults() {
        let config = ExchangeConfig::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(config, ExchangeConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_zero_limit() {
        let err = ExchangeConfig::from_toml_str(
            "[header_exchange]\nmax_headers_per_request = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_toml_rejects_oversized_stream_limit() {
        let err = ExchangeConfig::from_toml_str(
            "[header_exchange]\nmax_concurrent_streams = 9223372036854775807\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let at_limit = ExchangeConfig {
            max_concurrent_streams: MAX_CONCURRENT_STREAMS_LIMIT,
            ..ExchangeConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_from_toml_parse_error() {
        let err = ExchangeConfig::from_toml_str("[header_exchange\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
