//! Behavior variants and weighted selection

use pushload_config::domains::scenario::ScenarioConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BehaviorError;

/// The script a virtual client follows after each server response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// ack, unregister, close
    ConnClose,
    /// unregister and close without acknowledging
    ConnNoack,
    /// ack and re-trigger the same channel with the next version
    OneChan,
    /// ack, unregister, then register a fresh channel
    NewChan,
    /// ack, unregister, then register two fresh channels
    MultiChan,
    /// ack once, then ping on every message
    PingLoop,
    /// answer hello/ping with ping, never register
    PingOnly,
    /// hello, then close on the first response
    HandshakeOnly,
    /// keep sending malformed bursts
    Fuzz,
}

impl Behavior {
    pub const ALL: [Behavior; 9] = [
        Behavior::ConnClose,
        Behavior::ConnNoack,
        Behavior::OneChan,
        Behavior::NewChan,
        Behavior::MultiChan,
        Behavior::PingLoop,
        Behavior::PingOnly,
        Behavior::HandshakeOnly,
        Behavior::Fuzz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::ConnClose => "conn_close",
            Behavior::ConnNoack => "conn_noack",
            Behavior::OneChan => "one_chan",
            Behavior::NewChan => "new_chan",
            Behavior::MultiChan => "multi_chan",
            Behavior::PingLoop => "ping_loop",
            Behavior::PingOnly => "ping_only",
            Behavior::HandshakeOnly => "handshake_only",
            Behavior::Fuzz => "fuzz",
        }
    }

    /// Whether the variant ever registers a channel
    pub fn registers(&self) -> bool {
        !matches!(
            self,
            Behavior::PingOnly | Behavior::HandshakeOnly | Behavior::Fuzz
        )
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Behavior {
    type Err = BehaviorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Behavior::ALL
            .into_iter()
            .find(|b| b.as_str() == name)
            .ok_or_else(|| BehaviorError::UnknownBehavior(s.to_string()))
    }
}

/// Weighted behavior mix.
///
/// Stores cumulative weights so selection is one uniform draw plus a binary
/// search, independent of how large the weights are.
#[derive(Debug, Clone)]
pub struct BehaviorTable {
    entries: Vec<(Behavior, u64)>,
    total: u64,
}

impl BehaviorTable {
    /// Create a table from `(behavior, weight)` pairs, in order
    pub fn new(weights: impl IntoIterator<Item = (Behavior, u32)>) -> Result<Self, BehaviorError> {
        let mut entries = Vec::new();
        let mut total = 0u64;
        for (behavior, weight) in weights {
            total += u64::from(weight);
            entries.push((behavior, total));
        }

        if entries.is_empty() {
            return Err(BehaviorError::EmptyTable);
        }
        if total == 0 {
            return Err(BehaviorError::ZeroWeight);
        }

        Ok(Self { entries, total })
    }

    /// A table that always selects `behavior`
    pub fn single(behavior: Behavior) -> Self {
        Self {
            entries: vec![(behavior, 1)],
            total: 1,
        }
    }

    /// Build the table for a scenario: the weighted mix for `all`, a single
    /// variant otherwise
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, BehaviorError> {
        if !config.is_weighted_mix() {
            return Ok(Self::single(config.selected.parse()?));
        }

        let weights = config
            .weights
            .iter()
            .map(|(name, weight)| Ok((name.parse::<Behavior>()?, *weight)))
            .collect::<Result<Vec<_>, BehaviorError>>()?;
        Self::new(weights)
    }

    /// Draw one behavior
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Behavior {
        let draw = rng.random_range(0..self.total);
        let idx = self.entries.partition_point(|&(_, cumulative)| cumulative <= draw);
        // draw < total, so some cumulative weight is strictly greater
        self.entries[idx].0
    }

    /// Configured selection probability of `behavior`
    pub fn probability(&self, behavior: Behavior) -> f64 {
        self.weights()
            .filter(|(b, _)| *b == behavior)
            .map(|(_, w)| w as f64)
            .sum::<f64>()
            / self.total as f64
    }

    /// `(behavior, weight)` pairs in table order
    pub fn weights(&self) -> impl Iterator<Item = (Behavior, u64)> + '_ {
        let mut previous = 0;
        self.entries.iter().map(move |&(behavior, cumulative)| {
            let weight = cumulative - previous;
            previous = cumulative;
            (behavior, weight)
        })
    }
}
