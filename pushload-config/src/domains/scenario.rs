//! Behavior mix configuration

use crate::error::ConfigResult;
use crate::validation::{validate_enum_choice, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scenario name that selects the weighted mix instead of a single variant
pub const ALL_SCENARIOS: &str = "all";

/// Names of the behavior variants the engine knows about
pub const BEHAVIOR_NAMES: &[&str] = &[
    "conn_close",
    "conn_noack",
    "one_chan",
    "new_chan",
    "multi_chan",
    "ping_loop",
    "ping_only",
    "handshake_only",
    "fuzz",
];

/// Which behavior variants a run uses and how often
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// `all` for the weighted mix, or a single variant name
    #[serde(default = "default_selected")]
    pub selected: String,

    /// Selection weight per variant name
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, u32>,
}

impl ScenarioConfig {
    /// Whether the weighted mix is in use
    pub fn is_weighted_mix(&self) -> bool {
        self.selected.eq_ignore_ascii_case(ALL_SCENARIOS)
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            selected: default_selected(),
            weights: default_weights(),
        }
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.is_weighted_mix() {
            validate_enum_choice(&self.selected, BEHAVIOR_NAMES, "selected", self.domain_name())?;
            return Ok(());
        }

        for name in self.weights.keys() {
            validate_enum_choice(name, BEHAVIOR_NAMES, "weights", self.domain_name())?;
        }

        let total: u64 = self.weights.values().map(|w| u64::from(*w)).sum();
        if total == 0 {
            return Err(self.validation_error("weights must sum to more than 0"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenario"
    }
}

fn default_selected() -> String {
    ALL_SCENARIOS.to_string()
}

fn default_weights() -> BTreeMap<String, u32> {
    [
        ("conn_close", 30),
        ("conn_noack", 5),
        ("one_chan", 30),
        ("new_chan", 15),
        ("multi_chan", 15),
        ("ping_loop", 5),
    ]
    .into_iter()
    .map(|(name, weight)| (name.to_string(), weight))
    .collect()
}
