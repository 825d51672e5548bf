//! Per-connection limits for virtual clients

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest absolute or idle deadline a run accepts
pub const MAX_CLIENT_TIMEOUT: Duration = Duration::from_secs(30 * 86_400);

/// Limits applied to every virtual client of a run.
///
/// Constructed once and shared read-only with every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound (exclusive) of the think-time delay drawn per connection
    #[serde(
        rename = "max_sleep_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_max_sleep"
    )]
    pub max_sleep: Duration,

    /// A connection closes once its processed-message count exceeds this
    #[serde(default = "default_max_updates")]
    pub max_updates: u32,

    /// Absolute deadline measured from connection open
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_timeout"
    )]
    pub timeout: Duration,

    /// Idle deadline measured from the last inbound message
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_idle_timeout"
    )]
    pub idle_timeout: Duration,

    /// When set, every registering client uses this uaid instead of a fresh one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_uaid: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_sleep: default_max_sleep(),
            max_updates: default_max_updates(),
            timeout: default_timeout(),
            idle_timeout: default_idle_timeout(),
            shared_uaid: None,
        }
    }
}

impl Validatable for ClientConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_positive(
            self.idle_timeout.as_secs(),
            "idle_timeout",
            self.domain_name(),
        )?;

        for (name, value) in [("timeout", self.timeout), ("idle_timeout", self.idle_timeout)] {
            if value > MAX_CLIENT_TIMEOUT {
                return Err(self.validation_error(format!(
                    "{} must be at most {}s, got {}s",
                    name,
                    MAX_CLIENT_TIMEOUT.as_secs(),
                    value.as_secs()
                )));
            }
        }

        if let Some(ref uaid) = self.shared_uaid {
            validate_required_string(uaid, "shared_uaid", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "client"
    }
}

// Default value functions
fn default_max_sleep() -> Duration {
    Duration::from_secs(1)
}

fn default_max_updates() -> u32 {
    10
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30)
}
