//! Domain-driven configuration management for pushload
//!
//! This crate provides modular configuration split by functional domains,
//! with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    client::ClientConfig, http::HttpConfig, load::LoadConfig, logging::LoggingConfig,
    scenario::ScenarioConfig, target::TargetConfig, PushloadConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
