//! Configuration loading and environment variable handling

use crate::domains::PushloadConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "PUSHLOAD".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<PushloadConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: PushloadConfig = serde_yaml::from_str(&content)?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<PushloadConfig> {
        let mut config = PushloadConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<PushloadConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut PushloadConfig) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("SERVER_URL") {
            config.target.server_url = url;
        }

        self.apply_load_overrides(&mut config.load)?;
        self.apply_client_overrides(&mut config.client)?;

        if let Ok(scenario) = self.get_env_var("SCENARIO") {
            config.scenario.selected = scenario;
        }

        if let Ok(timeout) = self.get_env_var("HTTP_TIMEOUT") {
            config.http.timeout = Duration::from_secs(self.parse_env("HTTP_TIMEOUT", &timeout)?);
        }

        self.apply_logging_overrides(&mut config.logging)?;

        Ok(())
    }

    /// Apply load config overrides
    fn apply_load_overrides(
        &self,
        config: &mut crate::domains::load::LoadConfig,
    ) -> ConfigResult<()> {
        if let Ok(clients) = self.get_env_var("CLIENTS") {
            config.clients = self.parse_env("CLIENTS", &clients)?;
        }

        if let Ok(seed) = self.get_env_var("SEED") {
            config.seed = Some(self.parse_env("SEED", &seed)?);
        }

        Ok(())
    }

    /// Apply per-connection limit overrides
    fn apply_client_overrides(
        &self,
        config: &mut crate::domains::client::ClientConfig,
    ) -> ConfigResult<()> {
        if let Ok(max_updates) = self.get_env_var("MAX_UPDATES") {
            config.max_updates = self.parse_env("MAX_UPDATES", &max_updates)?;
        }

        if let Ok(max_sleep) = self.get_env_var("MAX_SLEEP_MS") {
            config.max_sleep = Duration::from_millis(self.parse_env("MAX_SLEEP_MS", &max_sleep)?);
        }

        if let Ok(timeout) = self.get_env_var("TIMEOUT") {
            config.timeout = Duration::from_secs(self.parse_env("TIMEOUT", &timeout)?);
        }

        if let Ok(idle) = self.get_env_var("IDLE_TIMEOUT") {
            config.idle_timeout = Duration::from_secs(self.parse_env("IDLE_TIMEOUT", &idle)?);
        }

        if let Ok(uaid) = self.get_env_var("SHARED_UAID") {
            config.shared_uaid = Some(uaid);
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Parse a numeric environment value, naming the variable on failure
    fn parse_env<T>(&self, name: &str, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
