//! Run size and pacing configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many virtual clients a run starts and how fast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of virtual clients to start
    #[serde(default = "default_clients")]
    pub clients: usize,

    /// Delay between two client spawns (0 starts them all at once)
    #[serde(
        rename = "ramp_up_interval_ms",
        with = "crate::domains::utils::serde_duration_millis",
        default
    )]
    pub ramp_up_interval: Duration,

    /// Seed for the run's random source; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            clients: default_clients(),
            ramp_up_interval: Duration::ZERO,
            seed: None,
        }
    }
}

impl Validatable for LoadConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.clients, "clients", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "load"
    }
}

fn default_clients() -> usize {
    10
}
