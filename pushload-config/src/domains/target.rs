//! Target server configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_url_scheme, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Push server under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// WebSocket URL of the push server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Upper bound on the WebSocket handshake
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_connect_timeout"
    )]
    pub connect_timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Validatable for TargetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url_scheme(
            &self.server_url,
            &["ws", "wss"],
            "server_url",
            self.domain_name(),
        )?;
        validate_positive(
            self.connect_timeout.as_secs(),
            "connect_timeout",
            self.domain_name(),
        )
    }

    fn domain_name(&self) -> &'static str {
        "target"
    }
}

fn default_server_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_validation() {
        let mut config = TargetConfig::default();
        assert!(config.validate().is_ok());

        config.server_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_err());

        config = TargetConfig::default();
        config.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
