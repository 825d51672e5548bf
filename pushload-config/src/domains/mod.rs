//! Domain-specific configuration modules

pub mod client;
pub mod http;
pub mod load;
pub mod logging;
pub mod scenario;
pub mod target;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main pushload configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PushloadConfig {
    /// Target push server
    #[serde(default)]
    pub target: target::TargetConfig,

    /// Run size and pacing
    #[serde(default)]
    pub load: load::LoadConfig,

    /// Per-connection limits shared by every virtual client
    #[serde(default)]
    pub client: client::ClientConfig,

    /// Behavior mix
    #[serde(default)]
    pub scenario: scenario::ScenarioConfig,

    /// HTTP trigger configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl PushloadConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.target.validate()?;
        self.load.validate()?;
        self.client.validate()?;
        self.scenario.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = PushloadConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
