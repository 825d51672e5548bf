//! Spawning and collecting virtual clients

use pushload_config::{ClientConfig, PushloadConfig};
use pushload_core::{run_virtual_client, Behavior, BehaviorTable};
use pushload_interfaces::{Connector, PushTrigger};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::aggregate::{AggregateResult, ResultCollector};
use crate::error::RuntimeResult;

/// What one run executes
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub clients: usize,
    pub table: BehaviorTable,
    pub per_client_timeout: Duration,
}

impl RunPlan {
    /// Derive the plan from a validated configuration
    pub fn from_config(config: &PushloadConfig) -> RuntimeResult<Self> {
        config.validate_all()?;
        Ok(Self {
            clients: config.load.clients,
            table: BehaviorTable::from_config(&config.scenario)?,
            per_client_timeout: config.client.timeout,
        })
    }
}

/// Runs many virtual clients against one server
pub struct LoadOrchestrator<C, P> {
    connector: Arc<C>,
    trigger: Arc<P>,
    server_url: String,
    client_config: ClientConfig,
    ramp_up_interval: Duration,
    seed: Option<u64>,
}

impl<C, P> LoadOrchestrator<C, P>
where
    C: Connector + 'static,
    P: PushTrigger + 'static,
{
    /// Create a new orchestrator with default client limits
    pub fn new(connector: C, trigger: P, server_url: impl Into<String>) -> Self {
        Self {
            connector: Arc::new(connector),
            trigger: Arc::new(trigger),
            server_url: server_url.into(),
            client_config: ClientConfig::default(),
            ramp_up_interval: Duration::ZERO,
            seed: None,
        }
    }

    /// Create a new orchestrator from configuration
    pub fn from_config(connector: C, trigger: P, config: &PushloadConfig) -> Self {
        Self::new(connector, trigger, config.target.server_url.clone())
            .with_client_config(config.client.clone())
            .with_ramp_up_interval(config.load.ramp_up_interval)
            .with_seed(config.load.seed)
    }

    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    pub fn with_ramp_up_interval(mut self, interval: Duration) -> Self {
        self.ramp_up_interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Execute a [`RunPlan`]
    pub async fn run_plan(&self, plan: &RunPlan) -> AggregateResult {
        self.run(plan.clients, &plan.table, plan.per_client_timeout)
            .await
    }

    /// Run `count` clients, each with its absolute deadline set to
    /// `per_client_timeout`, and wait for all of them.
    ///
    /// A failing or panicking client only affects its own outcome.
    pub async fn run(
        &self,
        count: usize,
        table: &BehaviorTable,
        per_client_timeout: Duration,
    ) -> AggregateResult {
        let started = Instant::now();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let config = Arc::new(ClientConfig {
            timeout: per_client_timeout,
            ..self.client_config.clone()
        });
        let url: Arc<str> = Arc::from(self.server_url.as_str());

        info!(
            clients = count,
            server = %self.server_url,
            seed = ?self.seed,
            "Starting load run"
        );
        for (behavior, weight) in table.weights() {
            if weight > 0 {
                info!(
                    %behavior,
                    share = format!("{:.1}%", table.probability(behavior) * 100.0),
                    "Behavior mix"
                );
            }
        }

        let mut tasks = JoinSet::new();
        let mut behaviors: HashMap<tokio::task::Id, Behavior> = HashMap::with_capacity(count);

        for index in 0..count {
            let behavior = table.select(&mut rng);
            let client_rng = StdRng::seed_from_u64(rng.random());
            let connector = Arc::clone(&self.connector);
            let trigger = Arc::clone(&self.trigger);
            let config = Arc::clone(&config);
            let url = Arc::clone(&url);

            let handle = tasks.spawn(async move {
                run_virtual_client(connector.as_ref(), trigger, &url, behavior, config, client_rng)
                    .await
            });
            behaviors.insert(handle.id(), behavior);

            if !self.ramp_up_interval.is_zero() && index + 1 < count {
                tokio::time::sleep(self.ramp_up_interval).await;
            }
        }

        let mut collector = ResultCollector::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    behaviors.remove(&id);
                    collector.record(&result);
                }
                Err(join_error) => {
                    let behavior = behaviors.remove(&join_error.id());
                    error!(?behavior, error = %join_error, "Client task failed");
                    collector.record_failed_task(behavior);
                }
            }
        }

        let aggregate = collector.finish(started.elapsed());
        info!(
            clients = aggregate.total_clients,
            completed = aggregate.outcomes.completed,
            timed_out = aggregate.outcomes.timed_out,
            protocol_errors = aggregate.outcomes.protocol_error,
            transport_errors = aggregate.outcomes.transport_error,
            elapsed_ms = aggregate.elapsed_ms,
            "Load run finished"
        );
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_config() {
        let mut config = PushloadConfig::default();
        config.load.clients = 25;
        config.client.timeout = Duration::from_secs(15);
        config.scenario.selected = "new_chan".to_string();

        let plan = RunPlan::from_config(&config).unwrap();
        assert_eq!(plan.clients, 25);
        assert_eq!(plan.per_client_timeout, Duration::from_secs(15));
        assert_eq!(plan.table.probability(Behavior::NewChan), 1.0);
    }

    #[test]
    fn test_plan_rejects_invalid_config() {
        let mut config = PushloadConfig::default();
        config.scenario.selected = "teleport".to_string();
        assert!(RunPlan::from_config(&config).is_err());
    }
}
